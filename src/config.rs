use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "demographics.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Runtime settings shared by the CLI and the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub fetch_timeout: Duration,
    pub bind_addr: String,
    pub rust_log: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            rust_log: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary key → value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let database_path = lookup("DEMOGRAPHICS_DB")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let fetch_timeout = match lookup("DEMOGRAPHICS_FETCH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_timeout(&raw)?),
            None => defaults.fetch_timeout,
        };

        let bind_addr = lookup("DEMOGRAPHICS_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let rust_log = lookup("RUST_LOG").unwrap_or(defaults.rust_log);

        Ok(AppConfig {
            database_path,
            fetch_timeout,
            bind_addr,
            rust_log,
        })
    }
}

pub fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue(format!(
            "DEMOGRAPHICS_FETCH_TIMEOUT_SECS must be a positive number of seconds, got '{}'",
            raw
        ))),
    }
}

/// Initialise env_logger with the configured filter, logging to stderr
pub fn init_logging(filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .target(env_logger::Target::Stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DEMOGRAPHICS_DB", "/tmp/pop.db"),
            ("DEMOGRAPHICS_FETCH_TIMEOUT_SECS", "5"),
            ("DEMOGRAPHICS_BIND_ADDR", "127.0.0.1:8080"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/pop.db"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.rust_log, "debug");
    }

    #[test]
    fn test_invalid_timeout() {
        for bad in ["soon", "0", "-3"] {
            let err = AppConfig::from_lookup(lookup(&[("DEMOGRAPHICS_FETCH_TIMEOUT_SECS", bad)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(_)), "{}", bad);
        }
    }
}
