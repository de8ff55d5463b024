//! Bot configuration
//!
//! Settings come from an optional YAML file (`config/bot.yaml` unless
//! `BOT_CONFIG` points elsewhere) and are then overridden by environment
//! variables, which `main` may have populated from a `.env` file.

use poise::serenity_prelude::{ChannelId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "config/bot.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} is not a valid id: {value}")]
    InvalidId { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub prefix: String,
    pub data_dir: PathBuf,
    pub staff_role_id: u64,
    pub muted_role_id: u64,
    pub owner_id: u64,
    /// Channel receiving the structured action log
    pub action_log_channel_id: Option<u64>,
    /// Channel receiving moderation actions; falls back to the action log
    pub mod_log_channel_id: Option<u64>,
    /// Channels where links are allowed
    pub link_whitelist_channels: Vec<u64>,
    /// How often expired interactive panels are swept, in seconds
    pub panel_sweep_secs: u64,
    /// Lifetime of the winner ping message, in seconds
    pub congrats_ttl_secs: u64,
    /// Role given to every member who joins
    pub auto_role_id: Option<u64>,
    /// How often the server stats channels are refreshed, in seconds.
    /// Discord allows two renames per channel every ten minutes.
    pub stats_refresh_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: ".".to_string(),
            data_dir: PathBuf::from("data"),
            staff_role_id: 0,
            muted_role_id: 0,
            owner_id: 0,
            action_log_channel_id: None,
            mod_log_channel_id: None,
            link_whitelist_channels: Vec::new(),
            panel_sweep_secs: 30,
            congrats_ttl_secs: 120,
            auto_role_id: None,
            stats_refresh_secs: 600,
        }
    }
}

impl BotConfig {
    /// Load the YAML file named by `BOT_CONFIG` (or the default path) and
    /// apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, if
    /// an override is not a number, or if a required id is still unset.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file, falling back to defaults when it does not exist
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let id = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| {
                    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidId {
                        name,
                        value: value.clone(),
                    })
                })
                .transpose()
        };

        if let Some(value) = id("STAFF_ROLE_ID")? {
            self.staff_role_id = value;
        }
        if let Some(value) = id("MUTED_ROLE_ID")? {
            self.muted_role_id = value;
        }
        if let Some(value) = id("OWNER_ID")? {
            self.owner_id = value;
        }
        if let Some(value) = id("ACTION_LOG_CHANNEL_ID")? {
            self.action_log_channel_id = Some(value);
        }
        if let Some(value) = id("MOD_LOG_CHANNEL_ID")? {
            self.mod_log_channel_id = Some(value);
        }
        if let Some(value) = id("AUTO_ROLE_ID")? {
            self.auto_role_id = Some(value);
        }
        if let Some(prefix) = lookup("BOT_PREFIX").filter(|p| !p.is_empty()) {
            self.prefix = prefix;
        }
        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staff_role_id == 0 {
            return Err(ConfigError::Missing("STAFF_ROLE_ID"));
        }
        if self.muted_role_id == 0 {
            return Err(ConfigError::Missing("MUTED_ROLE_ID"));
        }
        if self.owner_id == 0 {
            return Err(ConfigError::Missing("OWNER_ID"));
        }
        Ok(())
    }

    #[must_use]
    pub fn staff_role(&self) -> RoleId {
        RoleId::new(self.staff_role_id)
    }

    #[must_use]
    pub fn muted_role(&self) -> RoleId {
        RoleId::new(self.muted_role_id)
    }

    /// Staff are the owner and every holder of the staff role
    #[must_use]
    pub fn is_staff(&self, user: UserId, roles: &[RoleId]) -> bool {
        user.get() == self.owner_id || roles.iter().any(|role| role.get() == self.staff_role_id)
    }

    #[must_use]
    pub fn action_log_channel(&self) -> Option<ChannelId> {
        self.action_log_channel_id.map(ChannelId::new)
    }

    #[must_use]
    pub fn mod_log_channel(&self) -> Option<ChannelId> {
        self.mod_log_channel_id
            .or(self.action_log_channel_id)
            .map(ChannelId::new)
    }

    #[must_use]
    pub fn panel_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.panel_sweep_secs.max(1))
    }

    #[must_use]
    pub fn congrats_ttl(&self) -> Duration {
        Duration::from_secs(self.congrats_ttl_secs)
    }

    #[must_use]
    pub fn auto_role(&self) -> Option<RoleId> {
        self.auto_role_id.filter(|id| *id != 0).map(RoleId::new)
    }

    #[must_use]
    pub fn stats_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.stats_refresh_secs.max(60))
    }
}

/// Bot token from `DISCORD_TOKEN`
pub fn discord_token() -> Result<String, ConfigError> {
    std::env::var("DISCORD_TOKEN")
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or(ConfigError::Missing("DISCORD_TOKEN"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let config: BotConfig = serde_yaml::from_str(
            "staff_role_id: 11\nmuted_role_id: 22\nowner_id: 33\nlink_whitelist_channels: [5, 6]\n",
        )
        .expect("Failed to parse");
        assert_eq!(config.prefix, ".");
        assert_eq!(config.link_whitelist_channels, vec![5, 6]);
        assert_eq!(config.congrats_ttl(), Duration::from_secs(120));
        assert_eq!(config.stats_refresh_interval(), Duration::from_secs(600));
        assert!(config.auto_role().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = BotConfig::from_file(Path::new("does/not/exist.yaml")).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("STAFF_ROLE_ID"))
        ));
    }

    #[test]
    fn test_env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STAFF_ROLE_ID", "100"),
            ("MUTED_ROLE_ID", "200"),
            ("OWNER_ID", "300"),
            ("ACTION_LOG_CHANNEL_ID", "400"),
            ("BOT_PREFIX", "!"),
            ("AUTO_ROLE_ID", "500"),
        ]);
        let mut config = BotConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.staff_role(), RoleId::new(100));
        assert_eq!(config.prefix, "!");
        assert_eq!(config.mod_log_channel(), Some(ChannelId::new(400)));
        assert_eq!(config.auto_role(), Some(RoleId::new(500)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_id_override_is_rejected() {
        let mut config = BotConfig::default();
        let result = config.apply_overrides(|key| (key == "OWNER_ID").then(|| "abc".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidId { name: "OWNER_ID", .. })
        ));
    }

    #[test]
    fn test_staff_is_owner_or_role_holder() {
        let config = BotConfig {
            staff_role_id: 11,
            owner_id: 33,
            ..BotConfig::default()
        };
        assert!(config.is_staff(UserId::new(33), &[]));
        assert!(config.is_staff(UserId::new(5), &[RoleId::new(7), RoleId::new(11)]));
        assert!(!config.is_staff(UserId::new(5), &[RoleId::new(7)]));
    }
}
