use std::{str::FromStr, time::Duration};

/// Parse a duration given in milliseconds. Returns `None` if the value is missing, malformed or zero.
pub fn parse_millis(value: Option<String>) -> Option<Duration> {
    let millis = u64::from_str(value?.trim()).ok()?;
    (millis > 0).then(|| Duration::from_millis(millis))
}
