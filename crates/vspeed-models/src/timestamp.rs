//! Timestamp parsing and formatting.
//!
//! Accepts `HH:MM:SS(.mmm)`, `MM:SS(.mmm)` and plain seconds, which is what the
//! `--target-duration` flag takes. Audit tables format line times as
//! `HH:MM:SS.mmm`.

use thiserror::Error;

/// Upper bound for any duration we accept (24 hours).
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp cannot be empty")]
    Empty,

    #[error("timestamp cannot be negative")]
    Negative,

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid timestamp format '{0}', expected HH:MM:SS(.mmm), MM:SS(.mmm) or seconds")]
    InvalidFormat(String),

    #[error("duration {0:.1}s exceeds the 24 hour limit")]
    TooLong(f64),
}

fn component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::InvalidValue(name, raw.to_string()));
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Parse a timestamp string to total seconds.
///
/// ```
/// use vspeed_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [s] => component("seconds", s)?,
        [m, s] => component("minutes", m)? * 60.0 + component("seconds", s)?,
        [h, m, s] => {
            component("hours", h)? * 3600.0
                + component("minutes", m)? * 60.0
                + component("seconds", s)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_DURATION_SECS {
        return Err(TimestampError::TooLong(total));
    }
    Ok(total)
}

/// Format milliseconds as `HH:MM:SS.mmm`.
pub fn format_ms(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let mins = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
}

/// Convert seconds to whole milliseconds; negative and non-finite input map to 0.
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}
