use std::{
    fmt::{Debug, Display},
    ops::{Add, Div, Mul, Sub},
    time::Duration,
};

use format_num::format_num;
use serde::{Deserialize, Serialize};

pub type Float = f64;

#[derive(PartialEq, Clone, Copy, Serialize, Deserialize, Debug)]
pub struct TimeSpan(Float);

impl Eq for TimeSpan {}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan(0.);

    #[must_use]
    pub const fn seconds(self) -> Float {
        self.0
    }

    #[must_use]
    pub fn milliseconds(self) -> Float {
        self.0 * 1000.
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0 < 0.
    }

    /// A span usable as a link delay: finite and not negative.
    #[must_use]
    pub fn is_valid_delay(&self) -> bool {
        self.0.is_finite() && !self.is_negative()
    }

    #[must_use]
    pub fn to_duration(self) -> Duration {
        Duration::from_secs_f64(self.0.max(0.))
    }
}

impl Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", format_num!(".3s", self.0))
    }
}

#[must_use]
pub const fn seconds(value: Float) -> TimeSpan {
    TimeSpan(value)
}

#[must_use]
pub fn milliseconds(value: Float) -> TimeSpan {
    seconds(value / 1000.)
}

impl Add for TimeSpan {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        TimeSpan(self.0 + rhs.0)
    }
}

impl Sub for TimeSpan {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        TimeSpan(self.0 - rhs.0)
    }
}

impl Mul<TimeSpan> for Float {
    type Output = TimeSpan;

    fn mul(self, rhs: TimeSpan) -> Self::Output {
        TimeSpan(self * rhs.0)
    }
}

impl Div<Float> for TimeSpan {
    type Output = TimeSpan;

    fn div(self, rhs: Float) -> Self::Output {
        TimeSpan(self.0 / rhs)
    }
}

/// A point in virtual time, measured from the start of the simulation.
#[derive(PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Time(Float);

impl Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self, f)
    }
}

impl Time {
    pub const SIM_START: Time = Time(0.);

    #[must_use]
    pub const fn from_sim_start(TimeSpan(ts): TimeSpan) -> Time {
        Time(ts)
    }

    #[must_use]
    pub fn since_sim_start(self) -> TimeSpan {
        self - Time::SIM_START
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Sub<Time> for Time {
    type Output = TimeSpan;

    fn sub(self, Time(t): Time) -> Self::Output {
        TimeSpan(self.0 - t)
    }
}

impl Add<TimeSpan> for Time {
    type Output = Time;

    fn add(self, TimeSpan(ts): TimeSpan) -> Self::Output {
        Time(self.0 + ts)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}t", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{milliseconds, seconds, Time, TimeSpan};

    #[test]
    fn ordering_is_total() {
        let mut times = vec![
            Time::from_sim_start(seconds(2.)),
            Time::SIM_START,
            Time::from_sim_start(milliseconds(50.)),
        ];
        times.sort();
        assert_eq!(
            times,
            vec![
                Time::SIM_START,
                Time::from_sim_start(milliseconds(50.)),
                Time::from_sim_start(seconds(2.)),
            ]
        );
    }

    #[test]
    fn arithmetic() {
        let t = Time::SIM_START + milliseconds(50.) + milliseconds(50.);
        assert_eq!(t.since_sim_start(), milliseconds(100.));
        let t = Time::SIM_START + seconds(0.25) + seconds(0.25);
        assert_eq!(t - Time::from_sim_start(seconds(0.125)), seconds(0.375));
    }

    #[test]
    fn delay_validity() {
        assert!(TimeSpan::ZERO.is_valid_delay());
        assert!(milliseconds(10.).is_valid_delay());
        assert!(!milliseconds(-1.).is_valid_delay());
        assert!(!seconds(f64::NAN).is_valid_delay());
        assert!(!seconds(f64::INFINITY).is_valid_delay());
    }
}
