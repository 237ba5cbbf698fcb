//! Configuration for Outpost

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Entity store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Fallback SMTP submission settings, used when a sending account
    /// does not carry its own
    #[serde(default)]
    pub smtp: SmtpDefaults,

    /// Open-tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

/// Entity store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

/// Fallback SMTP submission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpDefaults {
    /// Submission host used when an account has none configured
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Submission port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

impl Default for SmtpDefaults {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Open-tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL the tracking pixel points back at
    #[serde(default = "default_tracking_base_url")]
    pub base_url: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: default_tracking_base_url(),
        }
    }
}

fn default_tracking_base_url() -> String {
    "http://localhost:8000".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive, overridable via RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info,outpost=debug".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations, falling back to defaults
    /// when no file is present (every section has a workable default).
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/outpost/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.store.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.tracking.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9000

[store]
redis_url = "redis://cache:6379/1"

[tracking]
base_url = "https://track.example.com"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.store.redis_url, "redis://cache:6379/1");
        assert_eq!(config.tracking.base_url, "https://track.example.com");
    }
}
