use std::time::Duration;

use super::ConfigError;

/// Parse a duration written the way Go's `time.ParseDuration` users write
/// them: `500ms`, `15s`, `1m30s`, `2h`. A bare `0` means zero.
pub fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    humantime::parse_duration(trimmed).map_err(|source| ConfigError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}
