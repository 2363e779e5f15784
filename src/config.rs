use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::constants;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub brightness: BrightnessConfig,
    #[serde(default)]
    pub hud: HudConfig,
    #[serde(default = "default_debounce_threshold")]
    pub debounce_threshold: f32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VolumeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrightnessConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_key_step")]
    pub key_step: f32,
    #[serde(default = "default_initial_estimate")]
    pub initial_estimate: f32,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        BrightnessConfig {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            key_step: default_key_step(),
            initial_estimate: default_initial_estimate(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HudConfig {
    #[serde(default = "default_enabled")]
    pub show_tray: bool,
    #[serde(default = "default_hide_after")]
    pub hide_after_ms: u64,
}

impl Default for HudConfig {
    fn default() -> Self {
        HudConfig {
            show_tray: default_enabled(),
            hide_after_ms: default_hide_after(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    constants::brightness::POLL_INTERVAL_MS
}

fn default_key_step() -> f32 {
    constants::brightness::KEY_STEP
}

fn default_initial_estimate() -> f32 {
    constants::brightness::INITIAL_ESTIMATE
}

fn default_hide_after() -> u64 {
    constants::hud::HIDE_AFTER_MS
}

fn default_debounce_threshold() -> f32 {
    constants::level::DEBOUNCE_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            volume: VolumeConfig::default(),
            brightness: BrightnessConfig::default(),
            hud: HudConfig::default(),
            debounce_threshold: default_debounce_threshold(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".hud-watch"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.yaml"))
    }

    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config = Self::from_yaml(&contents)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            println!("Created default config at: {}", config_path.display());
            Ok(config)
        }
    }

    /// Parse and validate a settings document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.debounce_threshold) {
            bail!("debounce_threshold must be in [0.0, 1.0)");
        }

        if self.brightness.poll_interval_ms < 10 {
            bail!("brightness.poll_interval_ms must be >= 10");
        }
        if self.brightness.poll_interval_ms > 10_000 {
            bail!("brightness.poll_interval_ms must be <= 10000 (10 seconds)");
        }

        if !(self.brightness.key_step > 0.0 && self.brightness.key_step <= 1.0) {
            bail!("brightness.key_step must be in (0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.brightness.initial_estimate) {
            bail!("brightness.initial_estimate must be in [0.0, 1.0]");
        }

        if self.hud.hide_after_ms == 0 {
            bail!("hud.hide_after_ms must be greater than 0");
        }

        if self.log_level.is_empty() {
            bail!("log_level cannot be empty");
        }

        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        let config_path = Self::config_path()?;
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, yaml)
            .context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce_threshold, 0.01);
        assert_eq!(config.brightness.key_step, 0.0625);
        assert_eq!(config.brightness.poll_interval_ms, 200);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("brightness:\n  poll_interval_ms: 500\n").unwrap();
        assert_eq!(config.brightness.poll_interval_ms, 500);
        assert!(config.brightness.enabled);
        assert!(config.volume.enabled);
        assert_eq!(config.hud.hide_after_ms, 1500);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(Config::from_yaml("debounce_threshold: 1.5\n").is_err());
        assert!(Config::from_yaml("debounce_threshold: -0.1\n").is_err());
    }

    #[test]
    fn test_rejects_bad_brightness_values() {
        assert!(Config::from_yaml("brightness:\n  key_step: 0.0\n").is_err());
        assert!(Config::from_yaml("brightness:\n  poll_interval_ms: 1\n").is_err());
        assert!(Config::from_yaml("brightness:\n  initial_estimate: 2.0\n").is_err());
    }

    #[test]
    fn test_rejects_zero_hide_delay() {
        assert!(Config::from_yaml("hud:\n  hide_after_ms: 0\n").is_err());
    }
}
