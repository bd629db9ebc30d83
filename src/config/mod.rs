//! # Configuration
//!
//! TOML configuration loaded at startup. Every section has defaults so a
//! minimal file (or `agora init`) is enough to run a server.
//!
//! ```toml
//! owner = "admin"
//!
//! [server]
//! bind = "0.0.0.0:7420"
//! max_frame_size = 512
//! max_media_frame_size = 65536
//! max_connections = 256
//!
//! [session]
//! away_after_secs = 300
//! activity_refresh_secs = 30
//! account_retention_days = 180
//! tick_interval_ms = 1000
//!
//! [storage]
//! data_dir = "./data"
//! backend = "sled"
//!
//! [logging]
//! level = "info"
//!
//! [bot]
//! enabled = true
//! name = "Concierge"
//!
//! [[worlds]]
//! name = "Harbor"
//! map = "PublicPlaza"
//! ```

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::context::ContextMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Ceiling for every control frame; batch packets are paginated below it.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Ceiling for voice and audio frames.
    #[serde(default = "default_max_media_frame_size")]
    pub max_media_frame_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_frame_size() -> usize {
    512
}

fn default_max_media_frame_size() -> usize {
    64 * 1024
}

fn default_max_connections() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7420".to_string(),
            max_frame_size: default_max_frame_size(),
            max_media_frame_size: default_max_media_frame_size(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which an online user is marked away.
    pub away_after_secs: u64,
    /// Minimum gap between two activity re-evaluations.
    pub activity_refresh_secs: u64,
    /// Accounts not logged in for this long are deleted.
    pub account_retention_days: u64,
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            away_after_secs: 300,
            activity_refresh_secs: 30,
            account_retention_days: 180,
            tick_interval_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn away_after(&self) -> Duration {
        Duration::seconds(self.away_after_secs as i64)
    }

    pub fn activity_refresh(&self) -> Duration {
        Duration::seconds(self.activity_refresh_secs as i64)
    }

    pub fn account_retention(&self) -> Duration {
        Duration::days(self.account_retention_days as i64)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(10))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            backend: StorageBackend::Sled,
        }
    }
}

impl StorageConfig {
    pub fn sled_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("agora")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub enabled: bool,
    pub name: String,
    /// World the bot settles in; the first world when unset.
    #[serde(default)]
    pub world: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "Concierge".to_string(),
            world: None,
        }
    }
}

/// World created at startup when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub name: String,
    pub map: ContextMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account that receives the Owner role at the global root on registration.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub worlds: Vec<WorldSeed>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.max_frame_size < 64 {
            return Err(anyhow!(
                "server.max_frame_size must be at least 64 (got {})",
                self.server.max_frame_size
            ));
        }
        if self.session.activity_refresh_secs > self.session.away_after_secs {
            return Err(anyhow!(
                "session.activity_refresh_secs must not exceed session.away_after_secs"
            ));
        }
        for seed in &self.worlds {
            crate::validation::validate_context_name(&seed.name)
                .map_err(|e| anyhow!("Invalid world name '{}': {}", seed.name, e))?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            owner: Some("admin".to_string()),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            security: Some(SecurityConfig::default()),
            bot: BotConfig::default(),
            worlds: vec![WorldSeed {
                name: "Harbor".to_string(),
                map: ContextMap::PublicPlaza,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.max_frame_size, 512);
        assert_eq!(parsed.session.activity_refresh_secs, 30);
        assert_eq!(parsed.storage.backend, StorageBackend::Sled);
        assert_eq!(parsed.worlds, config.worlds);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let parsed: Config = toml::from_str("owner = \"root\"\n").unwrap();
        assert_eq!(parsed.owner.as_deref(), Some("root"));
        assert_eq!(parsed.server.bind, "0.0.0.0:7420");
        assert!(parsed.bot.enabled);
        assert!(parsed.worlds.is_empty());
    }

    #[test]
    fn test_tiny_frame_ceiling_is_rejected() {
        let mut config = Config::default();
        config.server.max_frame_size = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_world_seed_is_rejected() {
        let mut config = Config::default();
        config.worlds.push(WorldSeed {
            name: "bad.name".into(),
            map: ContextMap::PublicPlaza,
        });
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agora.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.owner.as_deref(), Some("admin"));
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let path = path.to_str().unwrap();
        let err = tokio_test::block_on(Config::load(path)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"), "{err}");
    }
}
