//! Configuration for the azplay-ape playout engine
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--catalog`, `--playlist`, `--device`, ...)
//! 2. Environment variables (`AZPLAY_CONFIG`, `AZPLAY_CATALOG`, `AZPLAY_PLAYLIST`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Environment variables for individual settings are read by the CLI parser,
//! so they arrive here as overrides alongside the flags.

use crate::error::{Error, Result};
use crate::playback::buffer::DEFAULT_BUFFER_BLOCKS;
use crate::playback::session::{SessionConfig, DEFAULT_BLOCK_FRAMES};
use crate::playback::telemetry::{DEFAULT_ORIGIN, MIN_TELEMETRY_INTERVAL_MS};
use azplay_common::config::{read_toml, resolve_config_path};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration as read from the TOML file
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Catalog JSON document
    pub catalog_file: PathBuf,

    /// Playlist text file
    pub playlist_file: PathBuf,

    /// Where PAD JSON is written on every start (empty disables)
    pub pad_file: Option<PathBuf>,

    /// Origin id stamped on telemetry envelopes
    pub origin: String,

    /// Output device index (host default device if absent)
    pub output_device: Option<usize>,

    pub playback: PlaybackConfig,
    pub telemetry: TelemetryConfig,
    pub pad: PadConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            catalog_file: PathBuf::from("./data/cuts.json"),
            playlist_file: PathBuf::from("./data/playlist.txt"),
            pad_file: Some(PathBuf::from("./pad.json")),
            origin: DEFAULT_ORIGIN.to_string(),
            output_device: None,
            playback: PlaybackConfig::default(),
            telemetry: TelemetryConfig::default(),
            pad: PadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Streaming buffer depth in blocks
    pub buffer_blocks: usize,

    /// Frames per block and per device callback
    pub block_frames: usize,

    /// Minimum spacing of `stream.update` events per track
    pub min_telemetry_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_blocks: DEFAULT_BUFFER_BLOCKS,
            block_frames: DEFAULT_BLOCK_FRAMES,
            min_telemetry_interval_ms: MIN_TELEMETRY_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// SSE listen address; `None` logs telemetry instead of serving it
    pub bind: Option<String>,

    /// Messages buffered for a lagging subscriber
    pub capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind: Some("127.0.0.1:3420".to_string()),
            capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    /// HTTP endpoint receiving `?set=<artist> - <title>` (optional)
    pub http_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line (or through their env vars)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub catalog_file: Option<PathBuf>,
    pub playlist_file: Option<PathBuf>,
    pub output_device: Option<usize>,
    pub bind: Option<String>,
    pub buffer_blocks: Option<usize>,
    pub block_frames: Option<usize>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// File the settings came from, `None` when running on defaults
    pub source: Option<PathBuf>,
    pub toml: TomlConfig,
}

impl Config {
    /// Resolve the config file, apply overrides, validate.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let source = resolve_config_path(config_path);

        let mut toml: TomlConfig = match &source {
            Some(path) if path.exists() || config_path.is_some() => {
                info!("Loading configuration from {}", path.display());
                read_toml(path).map_err(|e| Error::Config(e.to_string()))?
            }
            Some(path) => {
                info!("Config file {} not found, using defaults", path.display());
                TomlConfig::default()
            }
            None => {
                info!("No config file found, using defaults");
                TomlConfig::default()
            }
        };

        if let Some(v) = overrides.catalog_file {
            toml.catalog_file = v;
        }
        if let Some(v) = overrides.playlist_file {
            toml.playlist_file = v;
        }
        if let Some(v) = overrides.output_device {
            toml.output_device = Some(v);
        }
        if let Some(v) = overrides.bind {
            toml.telemetry.bind = Some(v);
        }
        if let Some(v) = overrides.buffer_blocks {
            toml.playback.buffer_blocks = v;
        }
        if let Some(v) = overrides.block_frames {
            toml.playback.block_frames = v;
        }

        // TOML has no null; an empty string switches these outputs off
        if toml.pad_file.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            toml.pad_file = None;
        }
        if toml.pad.http_url.as_ref().is_some_and(|url| url.trim().is_empty()) {
            toml.pad.http_url = None;
        }

        let config = Self { source, toml };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.toml.playback.buffer_blocks == 0 {
            return Err(Error::Config("playback.buffer_blocks must be at least 1".to_string()));
        }
        if self.toml.playback.block_frames == 0 {
            return Err(Error::Config("playback.block_frames must be at least 1".to_string()));
        }
        if self.toml.origin.trim().is_empty() {
            return Err(Error::Config("origin must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            buffer_blocks: self.toml.playback.buffer_blocks,
            block_frames: self.toml.playback.block_frames,
            min_update_interval: Duration::from_millis(self.toml.playback.min_telemetry_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.playback.buffer_blocks, 20);
        assert_eq!(config.playback.block_frames, 1024);
        assert_eq!(config.playback.min_telemetry_interval_ms, 100);
        assert_eq!(config.origin, "azplay-ape");
        assert_eq!(config.telemetry.bind.as_deref(), Some("127.0.0.1:3420"));
        assert!(config.pad.http_url.is_none());
    }

    #[test]
    fn test_partial_file() {
        let config: TomlConfig = toml::from_str(
            r#"
            catalog_file = "/srv/azplay/cuts.json"
            output_device = 2

            [playback]
            buffer_blocks = 8

            [pad]
            http_url = "http://10.0.0.5:8282/parameter/hd3/strm/metadata_strm"
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog_file, PathBuf::from("/srv/azplay/cuts.json"));
        assert_eq!(config.output_device, Some(2));
        assert_eq!(config.playback.buffer_blocks, 8);
        assert_eq!(config.playback.block_frames, 1024);
        assert!(config.pad.http_url.is_some());
    }

    #[test]
    fn test_overrides_win_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "playlist_file = \"from-file.txt\"\n[playback]\nblock_frames = 512\n").unwrap();

        let config = Config::load(
            Some(&path),
            Overrides {
                playlist_file: Some(PathBuf::from("from-cli.txt")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.toml.playlist_file, PathBuf::from("from-cli.txt"));
        assert_eq!(config.session_config().block_frames, 512);

        let err = Config::load(
            Some(&path),
            Overrides {
                buffer_blocks: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("buffer_blocks"));
    }

    #[test]
    fn test_empty_pad_settings_disable_pad() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pad_file = \"\"\n[pad]\nhttp_url = \"\"\n").unwrap();

        let config = Config::load(Some(&path), Overrides::default()).unwrap();
        assert!(config.toml.pad_file.is_none());
        assert!(config.toml.pad.http_url.is_none());

        // Absent from the file keeps the default path
        std::fs::write(&path, "origin = \"studio-a\"\n").unwrap();
        let config = Config::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(config.toml.pad_file, Some(PathBuf::from("./pad.json")));
    }
}
