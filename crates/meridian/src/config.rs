//! Application configuration loaded from a TOML file.

use meridian_server::ServerConfig;
use meridian_sessions::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Application configuration: server plus logging sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address.
    pub bind_address: String,
    /// Connection limit.
    pub max_connections: usize,
    /// Per-connection read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Session sweeper interval in seconds.
    pub session_cleanup_interval_secs: u64,
    /// Default per-session expiry in seconds.
    pub session_duration_secs: u64,
    /// Absolute session lifetime in seconds.
    pub session_lifetime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter.
    pub level: String,
    /// JSON formatting.
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let server_defaults = ServerConfig::default();
        let session_defaults = SessionConfig::default();
        Self {
            server: ServerSettings {
                bind_address: server_defaults.bind_address.to_string(),
                max_connections: server_defaults.max_connections,
                read_buffer_size: server_defaults.read_buffer_size,
                session_cleanup_interval_secs: session_defaults.cleanup_interval.as_secs(),
                session_duration_secs: session_defaults.session_duration.as_secs(),
                session_lifetime_secs: session_defaults.session_lifetime.as_secs(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing the defaults out when
    /// the file does not exist yet.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the file settings into the server's config struct.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            read_buffer_size: self.server.read_buffer_size,
            sessions: SessionConfig {
                cleanup_interval: Duration::from_secs(self.server.session_cleanup_interval_secs),
                session_duration: Duration::from_secs(self.server.session_duration_secs),
                session_lifetime: Duration::from_secs(self.server.session_lifetime_secs),
            },
        })
    }
}
