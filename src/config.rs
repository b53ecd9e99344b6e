use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::PayloadFormat;

pub const DEFAULT_REMOTE_URL: &str = "https://jsonplaceholder.typicode.com/posts";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub remote_url: String,
    pub remote_format: PayloadFormat,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub bind_address: String,
    pub server_db_path: PathBuf,
}

impl Config {
    /// Read settings from the environment (call `dotenv::dotenv()` first
    /// to pick up a `.env` file).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let remote_format = match lookup("QUOTE_SYNC_REMOTE_FORMAT") {
            Some(value) => PayloadFormat::parse(&value)
                .ok_or_else(|| anyhow!("QUOTE_SYNC_REMOTE_FORMAT must be 'posts' or 'quotes', got {:?}", value))?,
            None => PayloadFormat::Posts,
        };

        Ok(Self {
            db_path: lookup("QUOTE_SYNC_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("quotes.db")),
            remote_url: lookup("QUOTE_SYNC_REMOTE_URL")
                .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string()),
            remote_format,
            // Poll once a minute by default
            sync_interval: millis(&lookup, "QUOTE_SYNC_INTERVAL_MS", 60_000)?,
            request_timeout: millis(&lookup, "QUOTE_SYNC_TIMEOUT_MS", 10_000)?,
            bind_address: lookup("QUOTE_SERVER_BIND")
                .unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            server_db_path: lookup("QUOTE_SERVER_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("server-quotes.db")),
        })
    }
}

fn millis<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u64) -> Result<Duration> {
    match lookup(key) {
        Some(value) => {
            let ms: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", key))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.db_path, PathBuf::from("quotes.db"));
        assert_eq!(config.remote_url, DEFAULT_REMOTE_URL);
        assert_eq!(config.remote_format, PayloadFormat::Posts);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.server_db_path, PathBuf::from("server-quotes.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("QUOTE_SYNC_DB", "/tmp/q.db"),
            ("QUOTE_SYNC_REMOTE_URL", "http://localhost:3000/api/quotes"),
            ("QUOTE_SYNC_REMOTE_FORMAT", "quotes"),
            ("QUOTE_SYNC_INTERVAL_MS", "1500"),
        ])
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/q.db"));
        assert_eq!(config.remote_format, PayloadFormat::Quotes);
        assert_eq!(config.sync_interval, Duration::from_millis(1500));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("QUOTE_SYNC_INTERVAL_MS", "soon")]).is_err());
        assert!(config_from(&[("QUOTE_SYNC_REMOTE_FORMAT", "xml")]).is_err());
    }
}
