//! Configuration loading.
//!
//! Reads the client configuration from a JSON file, then applies
//! environment variable overrides. Passwords can be kept out of the file
//! and supplied via `CYTUBE_CHANNEL_PASSWORD` / `CYTUBE_USER_PASSWORD`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

/// Configuration for the client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Server domain (e.g. `cytu.be` or a full `https://` URL).
    pub domain: String,
    /// Channel name to join.
    pub channel: String,
    /// Channel password, if the channel requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_password: Option<String>,
    /// User name (`None` — anonymous, name without password — guest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password for a registered user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_password: Option<String>,
    /// Extra handshake attempts after the first failure.
    #[serde(default)]
    pub retry: u32,
    /// Delay between handshake attempts in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// How long to wait for an action's rejection event in seconds.
    #[serde(default = "default_response_timeout")]
    pub response_timeout: f64,
    /// Delay before reconnecting after a connection error in seconds.
    /// `None` or negative — do not reconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<f64>,
    /// SOCKS5 proxy (`host:port`) for the HTTP side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Log level filter (`error`/`warn`/`info`/`debug`/`trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_response_timeout() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a JSON file, with environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `CYTUBE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(domain) = env::var("CYTUBE_DOMAIN") {
            self.domain = domain;
        }
        if let Ok(channel) = env::var("CYTUBE_CHANNEL") {
            self.channel = channel;
        }
        if let Ok(password) = env::var("CYTUBE_CHANNEL_PASSWORD") {
            self.channel_password = Some(password);
        }
        if let Ok(user) = env::var("CYTUBE_USER") {
            self.user = Some(user);
        }
        if let Ok(password) = env::var("CYTUBE_USER_PASSWORD") {
            self.user_password = Some(password);
        }
        if let Ok(proxy) = env::var("CYTUBE_PROXY") {
            self.proxy = Some(proxy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Prevent env var pollution between tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        env::remove_var("CYTUBE_DOMAIN");
        env::remove_var("CYTUBE_USER");
        let file = write_config(r#"{"domain": "cytu.be", "channel": "lounge"}"#);

        let config = Config::load(file.path()).expect("load");
        assert_eq!(config.domain, "cytu.be");
        assert_eq!(config.channel, "lounge");
        assert_eq!(config.retry, 0);
        assert_eq!(config.retry_delay, 1.0);
        assert_eq!(config.response_timeout, 0.1);
        assert!(config.restart_delay.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_env_overrides_beat_file_values() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let file = write_config(r#"{"domain": "cytu.be", "channel": "lounge"}"#);
        env::set_var("CYTUBE_DOMAIN", "other.example");
        env::set_var("CYTUBE_USER", "envbot");

        let config = Config::load(file.path()).expect("load");
        env::remove_var("CYTUBE_DOMAIN");
        env::remove_var("CYTUBE_USER");

        assert_eq!(config.domain, "other.example");
        assert_eq!(config.user.as_deref(), Some("envbot"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/config.json")).is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let file = write_config("not json");
        assert!(Config::load(file.path()).is_err());
    }
}
