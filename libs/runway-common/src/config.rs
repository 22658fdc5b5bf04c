//! Environment helpers shared by every service's `Config::from_env`.
//!
//! Unset or empty variables fall back to the default. A set but unparseable
//! value is a startup error rather than a silent default.

use crate::error::RunwayError;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Load `.env` from the working directory if present
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }
}

pub fn env_string(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Required variable; missing is a configuration error
pub fn env_required(name: &str) -> Result<String, RunwayError> {
    env_opt(name).ok_or_else(|| RunwayError::Validation(format!("{} must be set", name)))
}

pub fn env_parse<T>(name: &str, default: T) -> Result<T, RunwayError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => parse_value(name, &raw),
    }
}

/// Like `env_parse`, but an unset variable stays `None`
pub fn env_parse_opt<T>(name: &str) -> Result<Option<T>, RunwayError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(name).map(|raw| parse_value(name, &raw)).transpose()
}

pub fn env_millis(name: &str, default_ms: u64) -> Result<Duration, RunwayError> {
    env_parse(name, default_ms).map(Duration::from_millis)
}

pub fn env_bool(name: &str, default: bool) -> Result<bool, RunwayError> {
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => parse_bool(name, &raw),
    }
}

/// Comma separated list, blanks dropped
pub fn env_list(name: &str) -> Vec<String> {
    env_opt(name).map(|raw| split_list(&raw)).unwrap_or_default()
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, RunwayError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| RunwayError::Validation(format!("invalid {}={:?}: {}", name, raw, e)))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, RunwayError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RunwayError::Validation(format!(
            "invalid {}={:?}: expected a boolean",
            name, raw
        ))),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u64>("X", "42").unwrap(), 42);
        let err = parse_value::<u64>("EXECUTOR_TIMEOUT_MS", "ten").unwrap_err();
        assert!(err.to_string().contains("EXECUTOR_TIMEOUT_MS"));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" http://a:8081, ,http://b:8081 "),
            vec!["http://a:8081", "http://b:8081"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_unset_falls_back() {
        let name = "RUNWAY_TEST_SURELY_UNSET_VAR";
        assert_eq!(env_string(name, "dflt"), "dflt");
        assert_eq!(env_parse(name, 7u32).unwrap(), 7);
        assert_eq!(env_millis(name, 250).unwrap(), Duration::from_millis(250));
        assert!(env_required(name).is_err());
        assert!(env_list(name).is_empty());
    }
}
