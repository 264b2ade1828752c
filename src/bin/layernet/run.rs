use std::path::Path;

use anyhow::{anyhow, Result};
use layernet::{
    config::TopologyConfig,
    logging::{Logger, NothingLogger, PrintLogger},
    outcome::{LoggingObserver, Outcome, Tee, TraceRecorder},
    quantities::Float,
    scheduler::{Clock, PacedClock, RunSummary, VirtualClock},
    Config,
};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct Row {
    time: String,
    device: String,
    outcome: String,
}

fn simulate<C, L>(
    config: &TopologyConfig,
    clock: C,
    logger: L,
) -> Result<(RunSummary, Vec<Outcome>)>
where
    C: Clock,
    L: Logger,
{
    let observer = Tee(
        TraceRecorder::new(),
        LoggingObserver::new(logger, config.names()),
    );
    let mut simulation = config.build(clock, observer, NothingLogger)?;
    let summary = match config.end() {
        Some(end) => simulation.run_until(end)?,
        None => simulation.run()?,
    };
    let Tee(recorder, _) = simulation.into_observer();
    Ok((summary, recorder.into_outcomes()))
}

pub(super) fn run(topology: &Path, json: bool, paced: Option<Float>, verbose: bool) -> Result<()> {
    let config = TopologyConfig::load(topology)?;
    let logger = || PrintLogger::new("layernet".to_owned());
    let (summary, outcomes) = match (paced, verbose) {
        (Some(speed), _) if !(speed > 0.) => {
            return Err(anyhow!("--paced must be positive, got {speed}"))
        }
        (None, false) => simulate(&config, VirtualClock::new(), NothingLogger),
        (None, true) => simulate(&config, VirtualClock::new(), logger()),
        (Some(speed), false) => simulate(&config, PacedClock::new(speed), NothingLogger),
        (Some(speed), true) => simulate(&config, PacedClock::new(speed), logger()),
    }?;

    let names = config.names();
    if json {
        for outcome in &outcomes {
            println!("{}", serde_json::to_string(outcome)?);
        }
    } else {
        let rows = outcomes.iter().map(|outcome| Row {
            time: format!("{:.3}ms", outcome.time.since_sim_start().milliseconds()),
            device: names
                .get(outcome.device.index())
                .map_or_else(|| outcome.device.to_string(), Clone::clone),
            outcome: outcome.describe(&names).to_string(),
        });
        println!("{}", Table::new(rows));
        println!(
            "{} events fired, {} failed",
            summary.fired, summary.failed
        );
    }
    Ok(())
}
