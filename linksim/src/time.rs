//! Simulated time.

use std::{
    fmt,
    ops::{Add, AddAssign},
    time::Duration,
};

/// An instant on the simulated timeline, in nanoseconds since the simulation started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of the simulation.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Rounds to the nearest nanosecond. Negative values map to [`SimTime::ZERO`].
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1e9).round().min(u64::MAX as f64) as u64)
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Shifts this instant by a signed offset, saturating at [`SimTime::ZERO`].
    pub fn offset_by(self, delay: SignedDelay) -> Self {
        let nanos = self.0 as i128 + delay.as_nanos() as i128;
        Self(nanos.clamp(0, u64::MAX as i128) as u64)
    }
}

impl Add<Duration> for SimTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl From<Duration> for SimTime {
    fn from(value: Duration) -> Self {
        Self::ZERO + value
    }
}

/// Prints the instant in seconds, shortest form: `10s`, `15.5s`.
impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs_f64())
    }
}

/// A delay offset that may be negative, as drawn by a jitter distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedDelay(i64);

impl SignedDelay {
    /// No offset.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Rounds a millisecond sample to the nearest nanosecond.
    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_nan() {
            return Self::ZERO;
        }
        Self((millis * 1e6).round().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
    }

    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl From<Duration> for SignedDelay {
    fn from(value: Duration) -> Self {
        Self(i64::try_from(value.as_nanos()).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_in_seconds() {
        assert_eq!(SimTime::from_secs(10).to_string(), "10s");
        assert_eq!(SimTime::from_millis(15_500).to_string(), "15.5s");
        assert_eq!(SimTime::ZERO.to_string(), "0s");
    }

    #[test]
    fn offset_saturates_at_zero() {
        let t = SimTime::from_millis(5);
        assert_eq!(t.offset_by(SignedDelay::from_millis_f64(-2.0)), SimTime::from_millis(3));
        assert_eq!(t.offset_by(SignedDelay::from_millis_f64(-20.0)), SimTime::ZERO);
        assert_eq!(t.offset_by(SignedDelay::from_millis_f64(1.5)), SimTime::from_nanos(6_500_000));
    }

    #[test]
    fn secs_round_trip() {
        assert_eq!(SimTime::from_secs_f64(0.022), SimTime::from_millis(22));
        assert_eq!(SimTime::from_millis(22).as_secs_f64(), 0.022);
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
    }
}
