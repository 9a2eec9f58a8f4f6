use std::time::Duration;

use crate::{split_number, ParseError};

/// Parses a simulated duration such as `"10s"`, `"5ms"` or `"1.5min"`.
///
/// Recognized units are `ns`, `us`, `ms`, `s`, `min` and `h`. A bare number is read as seconds.
/// Negative values are rejected; zero is allowed and left to the caller to judge.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let (value, unit) = split_number(input)?;

    let nanos_per_unit: f64 = match unit {
        "ns" => 1.0,
        "us" => 1e3,
        "ms" => 1e6,
        "" | "s" => 1e9,
        "min" => 60.0 * 1e9,
        "h" => 3_600.0 * 1e9,
        _ => return Err(ParseError::UnknownUnit(input.trim().to_string())),
    };

    if value < 0.0 {
        return Err(ParseError::NonPositive(input.trim().to_string()));
    }

    let nanos = (value * nanos_per_unit).round();
    if nanos > u64::MAX as f64 {
        return Err(ParseError::InvalidNumber(input.trim().to_string()));
    }

    Ok(Duration::from_nanos(nanos as u64))
}
