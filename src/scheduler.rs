use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    thread,
    time::Instant,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::quantities::{Float, Time, TimeSpan};

/// Source of virtual time. The scheduler only ever waits inside `advance_to`.
pub trait Clock {
    fn now(&self) -> Time;
    fn advance_to(&mut self, time: Time);
}

/// Jumps straight to the next event.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    now: Time,
}

impl VirtualClock {
    #[must_use]
    pub const fn new() -> VirtualClock {
        VirtualClock {
            now: Time::SIM_START,
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Time {
        self.now
    }

    fn advance_to(&mut self, time: Time) {
        self.now = self.now.max(time);
    }
}

/// Sleeps so that virtual time tracks wall-clock time, `speed` virtual
/// seconds per real second.
#[derive(Debug, Clone)]
pub struct PacedClock {
    now: Time,
    started: Instant,
    speed: Float,
}

impl PacedClock {
    #[must_use]
    pub fn new(speed: Float) -> PacedClock {
        assert!(speed > 0., "clock speed must be positive, got {speed}");
        PacedClock {
            now: Time::SIM_START,
            started: Instant::now(),
            speed,
        }
    }
}

impl Clock for PacedClock {
    fn now(&self) -> Time {
        self.now
    }

    fn advance_to(&mut self, time: Time) {
        if time <= self.now {
            return;
        }
        let target = self.started + (time.since_sim_start() / self.speed).to_duration();
        let wall = Instant::now();
        if target > wall {
            thread::sleep(target - wall);
        }
        self.now = time;
    }
}

#[derive(Debug)]
struct Scheduled<E> {
    time: Time,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Events ordered by fire time, then by insertion order.
#[derive(Debug)]
pub struct EventQueue<E> {
    current_time: Time,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Scheduled<E>>>,
}

impl<E> EventQueue<E> {
    #[must_use]
    pub fn new() -> EventQueue<E> {
        EventQueue {
            current_time: Time::SIM_START,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Time of the most recently popped event.
    #[must_use]
    pub const fn current_time(&self) -> Time {
        self.current_time
    }

    pub fn push(&mut self, time: Time, event: E) {
        assert!(
            time >= self.current_time,
            "scheduled an event at {time} before the current time {}",
            self.current_time
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { time, seq, event }));
    }

    #[must_use]
    pub fn next_time(&self) -> Option<Time> {
        self.queue.peek().map(|Reverse(scheduled)| scheduled.time)
    }

    pub fn pop_next(&mut self) -> Option<(Time, E)> {
        let Reverse(Scheduled { time, event, .. }) = self.queue.pop()?;
        self.current_time = time;
        Some((time, event))
    }

    /// Drops every pending event without running it.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.queue.len();
        self.queue.clear();
        cancelled
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failed event and keep going.
    #[default]
    Isolate,
    /// Stop at the first failed event and return its error.
    FailFast,
}

pub trait EventHandler<E> {
    fn handle(&mut self, time: Time, event: E, queue: &mut EventQueue<E>) -> Result<()>;

    fn failed(&mut self, _time: Time, _error: &anyhow::Error) {}
}

impl<E, F> EventHandler<E> for F
where
    F: FnMut(Time, E, &mut EventQueue<E>) -> Result<()>,
{
    fn handle(&mut self, time: Time, event: E, queue: &mut EventQueue<E>) -> Result<()> {
        self(time, event, queue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub fired: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Scheduler<E, C> {
    queue: EventQueue<E>,
    clock: C,
    policy: FailurePolicy,
}

impl<E, C> Scheduler<E, C>
where
    C: Clock,
{
    #[must_use]
    pub fn new(clock: C, policy: FailurePolicy) -> Scheduler<E, C> {
        Scheduler {
            queue: EventQueue::new(),
            clock,
            policy,
        }
    }

    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    pub fn schedule(&mut self, delay: TimeSpan, event: E) {
        let time = self.clock.now() + delay;
        self.queue.push(time, event);
    }

    pub fn schedule_at(&mut self, time: Time, event: E) {
        self.queue.push(time, event);
    }

    /// Pops the earliest event and moves the clock up to its fire time.
    pub fn pop_next(&mut self) -> Option<(Time, E)> {
        let (time, event) = self.queue.pop_next()?;
        self.clock.advance_to(time);
        Some((time, event))
    }

    #[must_use]
    pub fn next_time(&self) -> Option<Time> {
        self.queue.next_time()
    }

    /// Moves the clock forward without firing anything. Never moves it past
    /// a pending event.
    pub fn advance_to(&mut self, time: Time) {
        let time = self.queue.next_time().map_or(time, |next| next.min(time));
        self.clock.advance_to(time);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        self.queue.cancel_all()
    }

    /// Fires events until the queue is empty.
    pub fn run(&mut self, handler: impl EventHandler<E>) -> Result<RunSummary> {
        self.run_while(|_| true, handler)
    }

    /// Fires events while `keep_going` accepts the next fire time. The first
    /// rejected event stays queued.
    pub fn run_while(
        &mut self,
        mut keep_going: impl FnMut(Time) -> bool,
        mut handler: impl EventHandler<E>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        while let Some(time) = self.queue.next_time() {
            if !keep_going(time) {
                break;
            }
            let Some((time, event)) = self.pop_next() else {
                break;
            };
            summary.fired += 1;
            if let Err(error) = handler.handle(time, event, &mut self.queue) {
                summary.failed += 1;
                handler.failed(time, &error);
                if self.policy == FailurePolicy::FailFast {
                    return Err(error.context(format!("event at {time} failed")));
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use pretty_assertions::assert_eq;

    use crate::quantities::{milliseconds, seconds, Time};

    use super::{
        Clock, EventQueue, FailurePolicy, PacedClock, RunSummary, Scheduler, VirtualClock,
    };

    fn at(ms: f64) -> Time {
        Time::from_sim_start(milliseconds(ms))
    }

    #[test]
    fn pops_in_time_order() {
        let mut queue = EventQueue::new();
        queue.push(at(30.), 'c');
        queue.push(at(10.), 'a');
        queue.push(at(20.), 'b');
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next()).collect();
        assert_eq!(order, vec![(at(10.), 'a'), (at(20.), 'b'), (at(30.), 'c')]);
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut queue = EventQueue::new();
        for i in 0..100 {
            queue.push(at(5.), i);
        }
        queue.push(at(1.), -1);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|(_, i)| i)
            .collect();
        assert_eq!(order, (-1..100).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic = "before the current time"]
    fn rejects_the_past() {
        let mut queue = EventQueue::new();
        queue.push(at(10.), ());
        queue.pop_next();
        queue.push(at(5.), ());
    }

    #[test]
    fn cancel_all_discards_without_running() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::Isolate);
        scheduler.schedule(seconds(1.), 1);
        scheduler.schedule(seconds(2.), 2);
        assert_eq!(scheduler.cancel_all(), 2);
        let mut fired = 0;
        let summary = scheduler
            .run(|_: Time, _: i32, _: &mut EventQueue<i32>| -> Result<()> {
                fired += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(fired, 0);
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn handlers_can_schedule_more() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::Isolate);
        scheduler.schedule(milliseconds(10.), 3_u32);
        let mut seen = Vec::new();
        scheduler
            .run(|time: Time, n: u32, queue: &mut EventQueue<u32>| -> Result<()> {
                seen.push((time, n));
                if n > 0 {
                    queue.push(time + milliseconds(10.), n - 1);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(scheduler.now(), seen[3].0);
    }

    #[test]
    fn failures_are_isolated() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::Isolate);
        for i in 0..4 {
            scheduler.schedule(milliseconds(f64::from(i)), i);
        }
        let mut ok = Vec::new();
        let summary = scheduler
            .run(|_: Time, i: i32, _: &mut EventQueue<i32>| -> Result<()> {
                if i % 2 == 1 {
                    return Err(anyhow!("odd event {i}"));
                }
                ok.push(i);
                Ok(())
            })
            .unwrap();
        assert_eq!(ok, vec![0, 2]);
        assert_eq!(summary, RunSummary { fired: 4, failed: 2 });
    }

    #[test]
    fn fail_fast_stops() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::FailFast);
        for i in 0..4 {
            scheduler.schedule(milliseconds(f64::from(i)), i);
        }
        let result = scheduler.run(|_: Time, i: i32, _: &mut EventQueue<i32>| -> Result<()> {
            if i == 1 {
                Err(anyhow!("boom"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn run_while_leaves_later_events() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::Isolate);
        scheduler.schedule(milliseconds(10.), ());
        scheduler.schedule(milliseconds(30.), ());
        let summary = scheduler
            .run_while(
                |t| t < at(20.),
                |_: Time, (): (), _: &mut EventQueue<()>| -> Result<()> { Ok(()) },
            )
            .unwrap();
        assert_eq!(summary.fired, 1);
        assert_eq!(scheduler.next_time(), Some(at(30.)));
    }

    #[test]
    fn virtual_clock_never_goes_back() {
        let mut clock = VirtualClock::new();
        clock.advance_to(at(20.));
        clock.advance_to(at(10.));
        assert_eq!(clock.now(), at(20.));
    }

    #[test]
    fn paced_clock_tracks_advances_and_never_goes_back() {
        let mut clock = PacedClock::new(1e9);
        assert_eq!(clock.now(), Time::SIM_START);
        clock.advance_to(at(50.));
        assert_eq!(clock.now(), at(50.));
        clock.advance_to(at(10.));
        assert_eq!(clock.now(), at(50.));
        clock.advance_to(at(80.));
        assert_eq!(clock.now(), at(80.));
    }

    #[test]
    #[should_panic(expected = "clock speed must be positive")]
    fn paced_clock_rejects_zero_speed() {
        let _ = PacedClock::new(0.);
    }

    #[test]
    fn schedule_at_uses_absolute_times() {
        let mut scheduler = Scheduler::new(VirtualClock::new(), FailurePolicy::Isolate);
        scheduler.schedule_at(at(30.), 'b');
        scheduler.schedule(milliseconds(10.), 'a');
        assert_eq!(scheduler.pop_next(), Some((at(10.), 'a')));
        assert_eq!(scheduler.pop_next(), Some((at(30.), 'b')));
        assert_eq!(scheduler.now(), at(30.));
    }
}
