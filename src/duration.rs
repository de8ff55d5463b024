//! Duration strings such as `10m`, `2h` or `1d`

use crate::error::{BotError, BotResult};
use std::time::Duration;

pub const DURATION_HINT: &str = "Invalid duration. Example: 10m, 2h, 1d.";

/// Parse `<number><s|m|h|d>`, case-insensitive. Zero is rejected.
pub fn parse_duration(raw: &str) -> BotResult<Duration> {
    let raw = raw.trim();
    let split = raw
        .char_indices()
        .last()
        .map(|(index, _)| index)
        .ok_or_else(|| BotError::invalid(DURATION_HINT))?;
    let (number, unit) = raw.split_at(split);

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(BotError::invalid(DURATION_HINT));
    }
    let value: u64 = number.parse().map_err(|_| BotError::invalid(DURATION_HINT))?;
    let unit_secs = match unit.to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(BotError::invalid(DURATION_HINT)),
    };
    if value == 0 {
        return Err(BotError::invalid("Duration must be greater than zero."));
    }
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| BotError::invalid(DURATION_HINT))
}

/// Human-readable duration, largest unit first (`1h 5m`, `45s`)
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Shortest string [`parse_duration`] reads back exactly (`90m` stays `90m`,
/// `7200s` becomes `2h`)
#[must_use]
pub fn compact_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

/// Countdown clock `HH:MM:SS`; hours are not wrapped at 24
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "m", "10", "10w", "-5m", "1.5h", "ten m", "0m"] {
            assert!(
                matches!(parse_duration(raw), Err(BotError::InvalidInput(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(3_900)), "1h 5m");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn test_compact_duration_reads_back() {
        assert_eq!(compact_duration(Duration::from_secs(7_200)), "2h");
        assert_eq!(compact_duration(Duration::from_secs(5_400)), "90m");
        for raw in ["2d", "45s", "90m", "61s"] {
            assert_eq!(compact_duration(parse_duration(raw).unwrap()), raw);
        }
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(43_200), "12:00:00");
        assert_eq!(format_clock(61), "00:01:01");
    }
}
