//! Server configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable overriding `database_url`.
pub const DATABASE_URL_ENV: &str = "LIFEQUEST_DATABASE_URL";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// Lifetime of a login token.
    pub token_ttl_hours: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            database_url: persistence::default_sqlite_url().to_string(),
            token_ttl_hours: 24,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load from `path` (defaults when missing or invalid), then apply the
    /// environment override.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let cfg = match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text).unwrap_or_else(|e| {
                warn!("Failed to parse server config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => {
                info!("Server config {} not found, using defaults", path.display());
                Self::default()
            }
        };
        cfg.with_env_override(std::env::var(DATABASE_URL_ENV).ok())
    }

    pub fn with_env_override(mut self, database_url: Option<String>) -> Self {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database_url = url;
        }
        self
    }

    pub fn token_ttl_millis(&self) -> i64 {
        i64::from(self.token_ttl_hours) * 3_600_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let cfg = ServerConfig::from_toml_str("database_url = \"sqlite://a.db\"\ntoken_ttl_hours = 2").unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.token_ttl_millis(), 7_200_000);
        let cfg = cfg.with_env_override(Some("sqlite::memory:".into()));
        assert_eq!(cfg.database_url, "sqlite::memory:");
        let cfg = cfg.with_env_override(Some("  ".into()));
        assert_eq!(cfg.database_url, "sqlite::memory:");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::load_from(dir.path().join("server.toml"));
        assert_eq!(cfg.token_ttl_hours, 24);
    }
}
