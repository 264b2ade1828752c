macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {
        $crate::logging::Logger::log(&mut $logger, &format!($($arg)*))
    };
}

pub trait Logger {
    fn log(&mut self, msg: &str);
}

impl<'a, T> Logger for &'a mut T
where
    T: Logger,
{
    fn log(&mut self, msg: &str) {
        T::log(self, msg);
    }
}

#[derive(Debug)]
pub struct PrintLogger {
    name: String,
}

impl PrintLogger {
    #[must_use]
    pub const fn new(name: String) -> PrintLogger {
        PrintLogger { name }
    }
}

impl Logger for PrintLogger {
    fn log(&mut self, msg: &str) {
        println!("[{}] {}", self.name, msg);
    }
}

#[derive(Debug, Default)]
pub struct NothingLogger;

impl Logger for NothingLogger {
    fn log(&mut self, _msg: &str) {}
}

/// Keeps every line in memory, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    pub lines: Vec<String>,
}

impl Logger for MemoryLogger {
    fn log(&mut self, msg: &str) {
        self.lines.push(msg.to_owned());
    }
}
