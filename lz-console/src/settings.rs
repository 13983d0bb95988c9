//! Console settings

use std::path::{Path, PathBuf};

use anyhow::Context;
use lz_engine::{EngineOptions, RadioConfig, SerialSettings, TunerConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything the console needs to run a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleSettings {
    /// Transceiver link, if any
    #[serde(default)]
    pub radio: Option<RadioConfig>,
    /// Antenna tuner link, if any
    #[serde(default)]
    pub tuner: Option<TunerConfig>,
    /// How often the radio is polled for frequency and mode
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How often tuner telemetry is requested
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
    /// Talk to simulated devices instead of opening the ports
    #[serde(default)]
    pub simulate: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_telemetry_interval_ms() -> u64 {
    500
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            radio: Some(RadioConfig {
                serial: SerialSettings::new("/dev/ttyUSB0", 19200),
                rig: "Icom IC-7300".to_string(),
                engine: EngineOptions::radio(),
            }),
            tuner: Some(TunerConfig {
                serial: SerialSettings::tuner("/dev/ttyUSB1"),
                engine: EngineOptions::tuner(),
            }),
            poll_interval_ms: default_poll_interval_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            simulate: true,
        }
    }
}

/// `<config dir>/lzlog/settings.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lzlog").join("settings.json"))
}

impl ConsoleSettings {
    /// Load settings from `path`, or from the default location
    ///
    /// A missing file gives the defaults. An unreadable or invalid file is
    /// reported and also gives the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_path) else {
            warn!("No settings location on this system, using defaults");
            return Self::default();
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Cannot read {}: {}, using defaults", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Invalid settings in {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings as pretty JSON, creating the directory if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}
