use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Parses a duration string such as `1d1h1m1s` into milliseconds.
///
/// Each component is a run of digits followed by one of `s`, `m`, `h` or `d`. Returns `None`
/// for empty, malformed or overflowing input.
///
/// # Examples
///
/// ```
/// use depot_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("1h30m"), Some(90 * 60 * 1000));
/// ```
pub fn parse_duration(input: &str) -> Option<u128> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number_str.push(chars.next()?);
            } else {
                break;
            }
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u128 = number_str.parse().ok()?;
        let multiplier = match chars.next()? {
            's' => 1000,
            'm' => 60 * 1000,
            'h' => 60 * 60 * 1000,
            'd' => 24 * 60 * 60 * 1000,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(total)
}

/// Same as [`parse_duration`] but returns a [`Duration`].
pub fn parse_std_duration(input: &str) -> Option<Duration> {
    let millis = parse_duration(input)?;
    Some(Duration::from_millis(u64::try_from(millis).ok()?))
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s"), Some(1000));
        assert_eq!(parse_duration("1m"), Some(60 * 1000));
        assert_eq!(parse_duration("1h"), Some(60 * 60 * 1000));
        assert_eq!(parse_duration("1d"), Some(24 * 60 * 60 * 1000));
        assert_eq!(
            parse_duration("1d1h1m1s"),
            Some(24 * 60 * 60 * 1000 + 60 * 60 * 1000 + 60 * 1000 + 1000)
        );
        assert_eq!(parse_duration("1d1h1m1s1"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("fail"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_std_duration() {
        assert_eq!(parse_std_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_std_duration("soon"), None);
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
