//! Reader configuration management

use crate::usb::DiscoveryMode;
use anyhow::{Context, Result, anyhow};
use protocol::{BUZZER_PRODUCT_ID, BUZZER_VENDOR_ID, DEFAULT_READ_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub reader: ReaderSettings,
    /// Which devices count as buzzers and how long a read may block
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSettings {
    #[serde(default = "ReaderSettings::default_log_level")]
    pub log_level: String,
    /// Discovery strategy (auto, hotplug, poll)
    #[serde(default)]
    pub discovery: DiscoveryMode,
    #[serde(default = "ReaderSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            discovery: DiscoveryMode::default(),
            poll_interval_ms: Self::default_poll_interval(),
        }
    }
}

impl ReaderSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_poll_interval() -> u64 {
        500
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "DeviceSettings::default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "DeviceSettings::default_product_id")]
    pub product_id: u16,
    /// Interrupt read timeout; also bounds how long a stop request waits
    #[serde(default = "DeviceSettings::default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            read_timeout_ms: Self::default_read_timeout(),
        }
    }
}

impl DeviceSettings {
    fn default_vendor_id() -> u16 {
        BUZZER_VENDOR_ID
    }

    fn default_product_id() -> u16 {
        BUZZER_PRODUCT_ID
    }

    fn default_read_timeout() -> u64 {
        DEFAULT_READ_TIMEOUT.as_millis() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Same-id suppression window; 0 delivers every press
    #[serde(default = "DispatchSettings::default_debounce")]
    pub debounce_ms: u64,
    #[serde(default = "DispatchSettings::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce(),
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

impl DispatchSettings {
    fn default_debounce() -> u64 {
        500
    }

    fn default_channel_capacity() -> usize {
        common::DEFAULT_PRESS_CAPACITY
    }
}

impl ReaderConfig {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/buzzer-reader/reader.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ReaderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("buzzer-reader").join("reader.toml")
        } else {
            PathBuf::from(".config/buzzer-reader/reader.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.reader.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.reader.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.reader.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }
        if self.device.read_timeout_ms == 0 {
            return Err(anyhow!("read_timeout_ms must be greater than 0"));
        }
        if self.dispatch.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be greater than 0"));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reader.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.device.read_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.dispatch.debounce_ms)
    }
}

/// Load configuration from a user-supplied path (tilde expanded) or the
/// standard locations
pub fn load_config(path: Option<&str>) -> Result<ReaderConfig> {
    match path {
        Some(p) => {
            let expanded = shellexpand::tilde(p);
            ReaderConfig::load(Some(PathBuf::from(expanded.as_ref())))
        }
        None => Ok(ReaderConfig::load_or_default()),
    }
}
