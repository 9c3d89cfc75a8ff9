//! updraft.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::FLATCAR_APP_ID;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdraftConfig {
    pub server: ServerConfig,
    pub rollout: RolloutConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("/var/lib/updraft"),
        }
    }
}

/// Rollout policy knobs consumed by the event pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Halt a group's rollout when the first instance to attempt the
    /// update reports a failure.
    pub disable_updates_on_failed_rollout: bool,
    /// Applications whose instances must report `SuccessReboot` to be
    /// counted complete, on top of each application's own flag.
    pub reboot_completion_apps: Vec<String>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            disable_updates_on_failed_rollout: false,
            reboot_completion_apps: vec![FLATCAR_APP_ID.to_string()],
        }
    }
}

impl RolloutConfig {
    pub fn requires_reboot_completion(&self, application_id: &str) -> bool {
        self.reboot_completion_apps
            .iter()
            .any(|id| id == application_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl UpdraftConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UpdraftConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if self.server.data_dir.as_os_str().is_empty() {
            anyhow::bail!("server.data_dir must be set");
        }
        if let Some(bad) = self
            .rollout
            .reboot_completion_apps
            .iter()
            .find(|id| id.trim().is_empty())
        {
            anyhow::bail!("rollout.reboot_completion_apps contains an empty id: {bad:?}");
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS,
                self.logging.level
            );
        }
        Ok(())
    }
}
