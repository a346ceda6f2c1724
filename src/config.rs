//! Runtime configuration.
//!
//! Values come from the environment (after loading an optional `.env`),
//! with CLI flags layered on top by the binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Backend the handler app has always talked to.
pub const DEFAULT_API_URL: &str = "https://deserving-action-5569f72002.strapiapp.com";

/// Default timeout for backend requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const APP_DIR_NAME: &str = "delivery-board";

pub const ENV_API_URL: &str = "DELIVERY_BOARD_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "DELIVERY_BOARD_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "DELIVERY_BOARD_DATA_DIR";
pub const ENV_LOG_DIR: &str = "DELIVERY_BOARD_LOG_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = get(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let timeout = match get(ENV_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    Error::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"))
                })?;
                if secs == 0 {
                    return Err(Error::Config(format!("{ENV_TIMEOUT_SECS} must be positive")));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        let data_dir = get(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&lookup));
        let log_dir = get(ENV_LOG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        Ok(Self {
            api_url,
            timeout,
            data_dir,
            log_dir,
        })
    }
}

/// Platform data directory: `%LOCALAPPDATA%`, `$XDG_DATA_HOME` or
/// `~/.local/share`, plus the app folder.
fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let base = lookup("LOCALAPPDATA")
        .or_else(|| lookup("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(lookup("USERPROFILE").unwrap_or_else(|| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(lookup("HOME").unwrap_or_else(|| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config =
            Config::from_lookup(lookup_from(&[("XDG_DATA_HOME", "/srv/data")])).expect("config");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.data_dir, PathBuf::from("/srv/data/delivery-board"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/data/delivery-board/logs"));
    }

    #[test]
    fn explicit_values_win() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_URL, "localhost:1337"),
            (ENV_TIMEOUT_SECS, "5"),
            (ENV_DATA_DIR, "/tmp/board"),
            (ENV_LOG_DIR, "/var/log/board"),
        ]))
        .expect("config");
        assert_eq!(config.api_url, "localhost:1337");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/board"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/board"));
    }

    #[test]
    fn bad_timeouts_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[(ENV_TIMEOUT_SECS, "soon")])),
            Err(Error::Config(_))
        ));
        assert!(Config::from_lookup(lookup_from(&[(ENV_TIMEOUT_SECS, "0")])).is_err());
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        std::env::set_var(ENV_API_URL, "https://orders.example.com");
        std::env::set_var(ENV_TIMEOUT_SECS, "12");
        let config = Config::from_env();
        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_TIMEOUT_SECS);

        let config = config.expect("config");
        assert_eq!(config.api_url, "https://orders.example.com");
        assert_eq!(config.timeout, Duration::from_secs(12));
    }
}
