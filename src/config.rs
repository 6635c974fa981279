//! Overlay configuration.
//!
//! Loaded from `~/.config/opensplit/overlay.toml`. A default file is
//! written on first run so there is always something to edit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::timer::SplitEntry;

const CONFIG_DIR: &str = ".config/opensplit";
const CONFIG_FILE: &str = "overlay.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub input: InputConfig,
    pub splits: SplitsConfig,
    pub remote_timer: Option<RemoteTimerConfig>,
    pub display: DisplayConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Whether the gamepad sampler runs at all.
    pub gamepad: bool,
    pub gamepad_poll_hz: u32,
    /// Named button of the device profile that drives the timer.
    pub trigger_button: Option<String>,
    /// Force a device profile instead of picking one per device.
    pub profile: Option<String>,
    /// Key-combination mask driving the timer, as decimal, `0x...` hex or
    /// `0b...` bits. Requires `key_stream`.
    pub key_mask: Option<String>,
    pub key_stream: Option<KeyStreamConfig>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            gamepad: true,
            gamepad_poll_hz: 30,
            trigger_button: Some("start".to_string()),
            profile: None,
            key_mask: None,
            key_stream: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStreamConfig {
    pub broker_url: String,
    pub topic: String,
    pub poll_hz: u32,
    pub reconnect_timeout_secs: u64,
}

impl Default for KeyStreamConfig {
    fn default() -> Self {
        Self {
            broker_url: "localhost:1883".to_string(),
            topic: "keys/state".to_string(),
            poll_hz: 20,
            reconnect_timeout_secs: 600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitsConfig {
    /// Endpoint serving the split list; results are stored back here.
    pub server_url: Option<String>,
    /// Inline split list, used when no server is configured.
    pub entries: Vec<SplitEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteTimerConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_hz: u32,
    pub show_millis: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 30,
            show_millis: true,
        }
    }
}

fn config_dir() -> PathBuf {
    let mut base = dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    });
    base.push(CONFIG_DIR);
    base
}

pub fn config_path() -> PathBuf {
    let mut path = config_dir();
    path.push(CONFIG_FILE);
    path
}

/// Write a default configuration file if none exists yet.
pub async fn ensure_default_config() -> Result<(), ConfigError> {
    let path = config_path();
    if tokio::fs::try_exists(&path).await? {
        return Ok(());
    }

    info!("Creating default configuration at {}", path.display());
    tokio::fs::create_dir_all(config_dir()).await?;
    let content = toml::to_string_pretty(&OverlayConfig::default())?;
    tokio::fs::write(&path, content).await?;
    Ok(())
}

/// Load the configuration, creating the default file first if needed.
pub async fn load() -> Result<OverlayConfig, ConfigError> {
    ensure_default_config().await?;
    let path = config_path();
    let content = tokio::fs::read_to_string(&path).await?;
    let config = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = OverlayConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: OverlayConfig = toml::from_str(&text).unwrap();
        assert!(parsed.input.gamepad);
        assert_eq!(parsed.input.gamepad_poll_hz, 30);
        assert_eq!(parsed.input.trigger_button.as_deref(), Some("start"));
        assert_eq!(parsed.display.refresh_hz, 30);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let parsed: OverlayConfig = toml::from_str(
            r#"
            [input]
            trigger_button = "a"

            [splits]
            server_url = "http://localhost:8088/splits"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.input.trigger_button.as_deref(), Some("a"));
        assert_eq!(parsed.input.gamepad_poll_hz, 30);
        assert_eq!(
            parsed.splits.server_url.as_deref(),
            Some("http://localhost:8088/splits")
        );
        assert!(parsed.splits.entries.is_empty());
        assert!(parsed.remote_timer.is_none());
    }

    #[test]
    fn inline_entries_parse_with_optional_targets() {
        let parsed: OverlayConfig = toml::from_str(
            r#"
            [[splits.entries]]
            label = "stage 1"
            time = 90000

            [[splits.entries]]
            label = "stage 2"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.splits.entries.len(), 2);
        assert_eq!(parsed.splits.entries[0].time, Some(90_000));
        assert_eq!(parsed.splits.entries[1].time, None);
    }

    #[test]
    fn key_stream_section_parses() {
        let parsed: OverlayConfig = toml::from_str(
            r#"
            [input]
            key_mask = "0x21"

            [input.key_stream]
            broker_url = "tracker:1883"
            topic = "keys/left-hand"
            "#,
        )
        .unwrap();
        let stream = parsed.input.key_stream.unwrap();
        assert_eq!(stream.broker_url, "tracker:1883");
        assert_eq!(stream.poll_hz, 20);
        assert_eq!(stream.reconnect_timeout_secs, 600);
    }
}
