//! Duration strings as written in `config.json`
//!
//! The format is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit: `300ms`, `1.5s`, `5m`, `1h30m`.
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0`
//! is accepted as zero. Negative durations are rejected.

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Error returned by [`parse_duration`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration {0:?}")]
    Negative(String),

    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

/// Parse a duration string such as `5m`, `300s` or `1h30m`
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let (negative, mut rest) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..num_end];
        rest = &rest[num_end..];

        if number.is_empty() || number == "." {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }

        let unit_nanos = unit_to_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let value = component_nanos(number, unit_nanos)
            .ok_or_else(|| component_error(number, input))?;

        total = total
            .checked_add(value)
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
    }

    if negative && total > 0 {
        return Err(DurationError::Negative(input.to_string()));
    }
    // Same ceiling as a signed 64-bit nanosecond count
    if total > i64::MAX as u128 {
        return Err(DurationError::Overflow(input.to_string()));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| DurationError::Overflow(input.to_string()))?;
    let nanos = (total % NANOS_PER_SEC) as u32;

    Ok(Duration::new(secs, nanos))
}

/// Format a duration back into the config syntax (`1h30m`, `3s`, `250ms`)
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    if duration.subsec_nanos() != 0 {
        if duration.as_secs() == 0 && duration.subsec_nanos() % 1_000_000 == 0 {
            return format!("{}ms", duration.subsec_millis());
        }
        return format!("{}s", duration.as_secs_f64());
    }

    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

fn unit_to_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Value of one `<number><unit>` component in nanoseconds
///
/// Fraction digits finer than one nanosecond are truncated.
fn component_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if frac_part.contains('.') {
        return None;
    }

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut value = int.checked_mul(unit_nanos)?;

    let mut scale = unit_nanos;
    for digit in frac_part.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        value = value.checked_add(u128::from(digit - b'0') * scale)?;
    }

    Some(value)
}

fn component_error(number: &str, input: &str) -> DurationError {
    if number.matches('.').count() > 1 {
        DurationError::Invalid(input.to_string())
    } else {
        DurationError::Overflow(input.to_string())
    }
}
