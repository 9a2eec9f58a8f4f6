//! Unit types shared by the linksim crates.
//!
//! Rates are kept as integer bits per second and simulated durations as [`std::time::Duration`],
//! both parsed from the suffixed strings used on the command line (`"10Mbps"`, `"5ms"`).

mod duration;
mod rate;

pub use duration::parse_duration;
pub use rate::DataRate;

/// Errors returned when parsing rate or duration strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty value")]
    Empty,
    #[error("invalid number in {0:?}")]
    InvalidNumber(String),
    #[error("unknown unit in {0:?}")]
    UnknownUnit(String),
    #[error("value must be positive: {0:?}")]
    NonPositive(String),
}

/// Splits `"12.5Mbps"` into `(12.5, "Mbps")`.
fn split_number(input: &str) -> Result<(f64, &str), ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 =
        number.parse().map_err(|_| ParseError::InvalidNumber(input.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::InvalidNumber(input.to_string()));
    }

    Ok((value, unit.trim()))
}

/// Rates in bits per second.
#[allow(non_upper_case_globals)]
pub mod constants {
    /// One kilobit per second.
    pub const Kbps: u64 = 1_000;
    pub const Mbps: u64 = 1_000 * Kbps;
    pub const Gbps: u64 = 1_000 * Mbps;
}
