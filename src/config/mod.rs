// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration for the capture daemon.
//!
//! Settings come from an optional YAML or TOML file with a `midi` section,
//! then command line flags override individual values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::recording::SerialiseSettings;
use crate::timing::{TickScale, DEFAULT_JITTER_WEIGHT};

/// Root of a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub midi: Settings,
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Input port to connect to on startup; prompt when unset
    pub device_port: Option<usize>,
    /// Seconds of silence that end a take
    pub idle_timeout_seconds: u64,
    /// Override the channel of every written note (0-15)
    pub channel: Option<u8>,
    /// Treat all input as percussion on channel 10
    pub drum_mode: bool,
    /// Directory for take files; empty means the current directory
    pub output_path: PathBuf,
    /// Allowed clock deviation from the window median, as a fraction of it
    pub clock_jitter_weight: f64,
    /// Tempo used until the clock estimator has settled
    pub default_tempo: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_port: None,
            idle_timeout_seconds: 5,
            channel: None,
            drum_mode: false,
            output_path: PathBuf::new(),
            clock_jitter_weight: DEFAULT_JITTER_WEIGHT,
            default_tempo: 120.0,
        }
    }
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub device_port: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub channel: Option<u8>,
    pub drum_mode: Option<bool>,
    pub output_path: Option<PathBuf>,
    pub clock_jitter_weight: Option<f64>,
    pub default_tempo: Option<f64>,
}

impl Settings {
    /// Load settings from a YAML or TOML file (chosen by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")?;
        Ok(file.midi)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).context("Failed to parse TOML configuration")?;
        Ok(file.midi)
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&ConfigFile { midi: self.clone() })
            .context("Failed to serialize configuration to YAML")
    }

    /// Apply command line values on top of these settings
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.device_port {
            self.device_port = Some(port);
        }
        if let Some(seconds) = overrides.idle_timeout_seconds {
            self.idle_timeout_seconds = seconds;
        }
        if let Some(channel) = overrides.channel {
            self.channel = Some(channel);
        }
        if let Some(drum_mode) = overrides.drum_mode {
            self.drum_mode = drum_mode;
        }
        if let Some(path) = overrides.output_path {
            self.output_path = path;
        }
        if let Some(weight) = overrides.clock_jitter_weight {
            self.clock_jitter_weight = weight;
        }
        if let Some(tempo) = overrides.default_tempo {
            self.default_tempo = tempo;
        }
    }

    /// Reject values the daemon cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_seconds == 0 {
            bail!("idle timeout must be at least one second");
        }
        if let Some(channel) = self.channel {
            if channel > 15 {
                bail!("channel {} out of range (0-15)", channel);
            }
        }
        if !(self.clock_jitter_weight.is_finite() && self.clock_jitter_weight > 0.0) {
            bail!(
                "clock jitter weight must be positive, got {}",
                self.clock_jitter_weight
            );
        }
        if !(self.default_tempo.is_finite() && self.default_tempo > 0.0) {
            bail!("default tempo must be positive, got {}", self.default_tempo);
        }
        if TickScale::new(self.default_tempo).is_none() {
            bail!(
                "default tempo {} BPM cannot be written to a MIDI file",
                self.default_tempo
            );
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn serialise_settings(&self) -> SerialiseSettings {
        SerialiseSettings {
            channel_override: self.channel,
            drum_mode: self.drum_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
midi:
  device_port: 2
  idle_timeout_seconds: 8
  channel: 3
  drum_mode: true
  output_path: "/tmp/takes"
"#;

        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.device_port, Some(2));
        assert_eq!(settings.idle_timeout_seconds, 8);
        assert_eq!(settings.channel, Some(3));
        assert!(settings.drum_mode);
        assert_eq!(settings.output_path, PathBuf::from("/tmp/takes"));
        assert_eq!(settings.clock_jitter_weight, DEFAULT_JITTER_WEIGHT);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
[midi]
idle_timeout_seconds = 3
clock_jitter_weight = 0.1
"#;

        let settings = Settings::from_toml(text).unwrap();
        assert_eq!(settings.idle_timeout_seconds, 3);
        assert_eq!(settings.clock_jitter_weight, 0.1);
        assert_eq!(settings.device_port, None);
        assert!(!settings.drum_mode);
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_yaml("midi: {}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.idle_timeout(), Duration::from_secs(5));
        assert_eq!(settings.default_tempo, 120.0);
        assert!(settings.output_path.as_os_str().is_empty());
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::from_yaml("midi:\n  channel: 1\n  idle_timeout_seconds: 9\n").unwrap();
        settings.apply(Overrides {
            channel: Some(4),
            drum_mode: Some(true),
            ..Default::default()
        });
        assert_eq!(settings.channel, Some(4));
        assert!(settings.drum_mode);
        assert_eq!(settings.idle_timeout_seconds, 9);

        let serialise = settings.serialise_settings();
        assert_eq!(serialise.channel_override, Some(4));
        assert!(serialise.drum_mode);
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_ok());

        let bad_channel = Settings {
            channel: Some(16),
            ..Default::default()
        };
        assert!(bad_channel.validate().is_err());

        let bad_timeout = Settings {
            idle_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(bad_timeout.validate().is_err());

        let bad_weight = Settings {
            clock_jitter_weight: 0.0,
            ..Default::default()
        };
        assert!(bad_weight.validate().is_err());

        let too_slow = Settings {
            default_tempo: 2.0,
            ..Default::default()
        };
        assert!(too_slow.validate().is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("miditake.toml");
        fs::write(&toml_path, "[midi]\ndevice_port = 1\n").unwrap();
        assert_eq!(Settings::load(&toml_path).unwrap().device_port, Some(1));

        let yaml_path = dir.path().join("miditake.yaml");
        fs::write(&yaml_path, "midi:\n  device_port: 4\n").unwrap();
        assert_eq!(Settings::load(&yaml_path).unwrap().device_port, Some(4));

        assert!(Settings::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let settings = Settings {
            device_port: Some(1),
            drum_mode: true,
            ..Default::default()
        };
        let yaml = settings.to_yaml().unwrap();
        assert_eq!(Settings::from_yaml(&yaml).unwrap(), settings);
    }
}
