//! Server configuration.
//!
//! Everything is sourced from environment variables at startup (the binary
//! loads an optional `.env` file into the environment first).
//!
//! - `HOST` - bind address (default `0.0.0.0`)
//! - `PORT` - listen port (default `3001`)
//! - `N8N_WEBHOOK_URL` - relay destination; checked per request, not here
//! - `UPLOAD_DIR` - directory for stored attachments (default `uploads`)
//! - `MAX_UPLOAD_BYTES` - attachment size limit (default 10 MiB)

use std::path::PathBuf;

use thiserror::Error;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default attachment size limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Destination of relayed task records. `None` means every submission
    /// fails at relay time until it is configured.
    pub webhook_url: Option<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            webhook_url: None,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                name: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        name: "MAX_UPLOAD_BYTES",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        name: "MAX_UPLOAD_BYTES",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })
                }
            },
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            webhook_url: get("N8N_WEBHOOK_URL"),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes,
        })
    }
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
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn test_reads_port_and_webhook() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("N8N_WEBHOOK_URL", "http://n8n.local/webhook/tasks"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("http://n8n.local/webhook/tasks")
        );
    }

    #[test]
    fn test_blank_webhook_is_unset() {
        let config = Config::from_lookup(lookup(&[("N8N_WEBHOOK_URL", "   ")])).unwrap();
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_upload_limit_is_rejected() {
        assert!(Config::from_lookup(lookup(&[("MAX_UPLOAD_BYTES", "0")])).is_err());
    }
}
