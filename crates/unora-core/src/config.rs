//! Configuration resolution for Unora.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/unora/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tier::{Tier, TierLimits, TierPolicy};

/// Complete Unora configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub streak: StreakConfig,
    #[serde(default)]
    pub reveal: RevealConfig,
    /// Per-tier overrides on top of the built-in tier table.
    #[serde(default)]
    pub tiers: HashMap<Tier, TierLimits>,
}

impl Config {
    /// The tier table with this config's overrides applied.
    pub fn tier_policy(&self) -> TierPolicy {
        TierPolicy::with_overrides(self.tiers.clone())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Streak lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakConfig {
    /// How long a broken streak stays recoverable once the payment window opens (seconds).
    pub recovery_window_secs: i64,
    /// Fixed part of the recovery price in credits.
    pub recovery_base_cost: i64,
    /// Additional credits per completed streak day.
    pub recovery_cost_per_day: i64,
    /// How often the decay sweep runs (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            recovery_window_secs: 24 * 60 * 60,
            recovery_base_cost: 20,
            recovery_cost_per_day: 5,
            sweep_interval_secs: 15 * 60,
        }
    }
}

impl StreakConfig {
    /// Credits needed to recover a streak at `current_day`.
    pub const fn recovery_cost(&self, current_day: i64) -> i64 {
        self.recovery_base_cost + current_day * self.recovery_cost_per_day
    }
}

/// Reveal content configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    /// How often unlocked reveals without content are retried (seconds).
    pub content_retry_interval_secs: u64,
    /// Generation attempts before a reveal is left without content.
    pub max_content_attempts: i64,
    /// AI content service endpoint. The template generator is used when unset.
    pub generator_url: Option<String>,
    /// Request timeout for the AI content service (seconds).
    pub generator_timeout_secs: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            content_retry_interval_secs: 5 * 60,
            max_content_attempts: 5,
            generator_url: None,
            generator_timeout_secs: 20,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load explicit config
    if let Some(path) = explicit_path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        let explicit = load_config_file(path)?;
        merge_config(&mut config, explicit);
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("unora").join("settings.json"))
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.server.database_path.is_some() {
        base.server.database_path = overlay.server.database_path;
    }
    base.server.addr = overlay.server.addr;
    base.server.log_level = overlay.server.log_level;

    base.streak = overlay.streak;
    base.reveal = overlay.reveal;

    base.tiers.extend(overlay.tiers);
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("UNORA_ADDR") {
        config.server.addr = val;
    }
    if let Ok(val) = std::env::var("UNORA_DB_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("UNORA_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Ok(val) = std::env::var("UNORA_RECOVERY_WINDOW_SECS") {
        if let Ok(n) = val.parse() {
            config.streak.recovery_window_secs = n;
        }
    }
    if let Ok(val) = std::env::var("UNORA_CONTENT_GENERATOR_URL") {
        config.reveal.generator_url = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn recovery_cost_grows_with_day() {
        let config = StreakConfig::default();
        assert_eq!(config.recovery_cost(1), 25);
        assert_eq!(config.recovery_cost(10), 70);
        assert!(config.recovery_cost(11) > config.recovery_cost(10));
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let config: Config = serde_json::from_str(r#"{"server": {"addr": "127.0.0.1:9000",
            "database_path": null, "log_level": "debug"}}"#)
        .unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.streak.recovery_base_cost, 20);
        assert_eq!(config.reveal.max_content_attempts, 5);
    }

    #[test]
    fn explicit_file_overrides_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"tiers": {"free": {"connection_slots": 3, "refresh_cooldown_secs": 10,
                "nudges_per_day": 2, "free_recoveries": 1, "earned_reveals": 2,
                "purchasable_reveals": 3, "reveal_days": [5, 12]}}}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        let policy = config.tier_policy();
        assert_eq!(policy.limits(Tier::Free).connection_slots, 3);
        assert_eq!(policy.limits(Tier::Plus).connection_slots, 2);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/unora.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
