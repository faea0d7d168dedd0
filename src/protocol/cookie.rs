//! Cookie attribute normalization.

use crate::protocol::message::{CookieOptions, MaxAge};

/// Replace a duration-string `max_age` by its second count.
///
/// An unparseable duration drops the attribute.
pub fn normalize_options(mut options: CookieOptions) -> CookieOptions {
    if let Some(MaxAge::Duration(raw)) = &options.max_age {
        options.max_age = match parse_duration_secs(raw) {
            Some(secs) => Some(MaxAge::Seconds(secs)),
            None => {
                tracing::warn!(max_age = %raw, "Ignoring unparseable cookie max-age");
                None
            }
        };
    }
    options
}

/// Parse `"500ms"`, `"10s"`, `"5 minutes"`, `"7d"`, `"1y"`... into whole seconds.
///
/// A bare number is a millisecond count.
pub fn parse_duration_secs(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;

    let ms_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
        _ => return None,
    };

    Some((value * ms_per_unit / 1_000.0).floor() as i64)
}
