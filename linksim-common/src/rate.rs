use std::{fmt, str::FromStr, time::Duration};

use crate::{constants, split_number, ParseError};

/// A link bit rate, in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(u64);

impl DataRate {
    /// No capacity. Never handed to a transmission.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    /// Rounds to the nearest bit per second. Negative and NaN values map to zero.
    #[inline]
    pub fn from_bps_f64(bps: f64) -> Self {
        if bps.is_nan() || bps <= 0.0 {
            return Self::ZERO;
        }
        Self(bps.round().min(u64::MAX as f64) as u64)
    }

    #[inline]
    pub const fn bps(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Time, in seconds, needed to serialize `bytes` at this rate.
    ///
    /// A zero rate never finishes and yields [`f64::INFINITY`].
    pub fn transmission_secs(self, bytes: usize) -> f64 {
        if self.0 == 0 {
            return f64::INFINITY;
        }
        bytes as f64 * 8.0 / self.0 as f64
    }

    /// [`Self::transmission_secs`] rounded to the nearest nanosecond, in integer arithmetic.
    ///
    /// A zero rate yields [`Duration::MAX`].
    pub fn transmission_time(self, bytes: usize) -> Duration {
        if self.0 == 0 {
            return Duration::MAX;
        }
        let bits = bytes as u128 * 8;
        let rate = self.0 as u128;
        let nanos = (bits * 1_000_000_000 + rate / 2) / rate;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    #[inline]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    #[inline]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl FromStr for DataRate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_number(s)?;

        let scale = match unit {
            "bps" | "b/s" => 1,
            "Kbps" | "kbps" | "Kb/s" | "kb/s" => constants::Kbps,
            "Mbps" | "Mb/s" => constants::Mbps,
            "Gbps" | "Gb/s" => constants::Gbps,
            _ => return Err(ParseError::UnknownUnit(s.trim().to_string())),
        };

        let bps = (value * scale as f64).round();
        if bps <= 0.0 {
            return Err(ParseError::NonPositive(s.trim().to_string()));
        }

        Ok(Self::from_bps_f64(bps))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.0;
        if bps != 0 && bps % constants::Gbps == 0 {
            write!(f, "{}Gbps", bps / constants::Gbps)
        } else if bps != 0 && bps % constants::Mbps == 0 {
            write!(f, "{}Mbps", bps / constants::Mbps)
        } else if bps != 0 && bps % constants::Kbps == 0 {
            write!(f, "{}Kbps", bps / constants::Kbps)
        } else {
            write!(f, "{bps}bps")
        }
    }
}
