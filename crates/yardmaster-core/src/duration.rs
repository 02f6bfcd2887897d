//! Go-style duration strings (`5m0s`, `1h30m`, `90s`, `250ms`).

use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound on accepted durations (roughly 31 years).
const MAX_SECONDS: f64 = 1_000_000_000.0;

/// Parses a duration string made of `<number><unit>` segments.
///
/// Supported units are `h`, `m`, `s` and `ms`. Fractional values are allowed
/// (`1.5h`). The bare string `0` is accepted as zero.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] if the input is empty, has a segment
/// without a unit, uses an unknown unit or is out of range.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use yardmaster_core::parse_duration;
///
/// assert_eq!(parse_duration("5m0s").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: String| Error::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty string".to_string()));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let mut seconds = 0.0_f64;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid(format!("expected a number at '{rest}'")));
        }
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: f64 = number
            .parse()
            .map_err(|_| invalid(format!("'{number}' is not a number")))?;
        let scale = match unit {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            "" => return Err(invalid(format!("missing unit after '{number}'"))),
            other => return Err(invalid(format!("unknown unit '{other}'"))),
        };
        seconds += value * scale;
        rest = next;
    }

    if !seconds.is_finite() || seconds > MAX_SECONDS {
        return Err(invalid("duration out of range".to_string()));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Formats a duration the way [`parse_duration`] reads it, e.g. `1h5m0s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else if total == 0 && duration.subsec_millis() > 0 {
        format!("{}ms", duration.subsec_millis())
    } else {
        format!("{seconds}s")
    }
}
