use crate::error::{LockerError, Result};
use std::time::Duration;

/// Parse a duration string like "250ms", "30s", "5m", "2h", "1d"
/// Defaults to seconds if no unit specified
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(LockerError::invalid_duration(s, "empty string"));
    }

    // "ms" must be checked before "s" and "m"
    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, "d")
    } else {
        (s, "s")
    };

    let value: u64 = num_str.trim().parse().map_err(|_| {
        LockerError::invalid_duration(
            s,
            "expected format: NUMBER[ms|s|m|h|d] (e.g., '250ms', '30s', '5m')",
        )
    })?;

    let multiplier = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        _ => unreachable!(),
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| LockerError::invalid_duration(s, "value is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1s").unwrap().as_secs(), 1);
        assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
        assert_eq!(parse_duration("1h").unwrap().as_secs(), 3600);
        assert_eq!(parse_duration("1d").unwrap().as_secs(), 86400);
    }

    #[test]
    fn test_bare_number_is_seconds() {
        assert_eq!(parse_duration(" 42 ").unwrap().as_secs(), 42);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn test_overflow() {
        let err = parse_duration(&format!("{}d", u64::MAX)).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
