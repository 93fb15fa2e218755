//! Server configuration
//!
//! Read from `$BICANH_CONFIG` or `config.toml` in the platform config
//! directory. A missing file means all defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use bicanh_core::lifecycle::DEFAULT_MEETING_CREDIT;
use bicanh_net::DEFAULT_PORT;

use crate::error::{Error, Result};

/// Environment variable overriding the config file path
pub const CONFIG_ENV: &str = "BICANH_CONFIG";

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub discord: DiscordConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: bicanh_net::server::MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `bicanh.db` in the data directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Argon2 PHC string of the shared API key
    pub api_key_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    pub webhook_url: Option<String>,
    /// Link appended to announcements
    pub app_url: Option<String>,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            webhook_url: None,
            app_url: None,
            api_base: DISCORD_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points credited to each participant on confirmation
    pub meeting_credit: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            meeting_credit: DEFAULT_MEETING_CREDIT,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "bicanh", "bicanh").ok_or(Error::NoDataDir)
}

impl Config {
    /// Load from the configured location
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => project_dirs()?.config_dir().join("config.toml"),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scoring.meeting_credit <= 0 {
            return Err(Error::ConfigInvalid(
                "scoring.meeting_credit must be positive".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(Error::ConfigInvalid(
                "server.max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Database file, creating its parent directory
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => project_dirs()?.data_dir().join("bicanh.db"),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind.port(), DEFAULT_PORT);
        assert!(config.server.bind.ip().is_loopback());
        assert_eq!(config.scoring.meeting_credit, 1);
        assert_eq!(config.discord.api_base, DISCORD_API_BASE);
        assert!(config.auth.api_key_hash.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [discord]
            webhook_url = "https://discord.test/hook"

            [scoring]
            meeting_credit = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.max_connections, bicanh_net::server::MAX_CONNECTIONS);
        assert_eq!(config.discord.webhook_url.as_deref(), Some("https://discord.test/hook"));
        assert!(config.discord.bot_token.is_none());
        assert_eq!(config.scoring.meeting_credit, 2);
    }

    #[test]
    fn test_rejects_nonpositive_credit() {
        let result = Config::from_toml("[scoring]\nmeeting_credit = 0\n");
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_bad_toml() {
        let result = Config::from_toml("[server\nbind = 1");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.scoring.meeting_credit, DEFAULT_MEETING_CREDIT);
    }

    #[test]
    fn test_database_path_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bicanh.db");
        let mut config = Config::default();
        config.database.path = Some(path.clone());

        assert_eq!(config.database_path().unwrap(), path);
        assert!(dir.path().join("nested").is_dir());
    }
}
