use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error_codes::{ErrorCode, StartupError};

pub const AUDIO_ENV_VAR: &str = "ASCII_REEL_AUDIO";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub frames: FrameStoreConfig,
    pub audio: AudioConfig,
    pub subtitles: SubtitleConfig,
    pub playback: PlaybackConfig,
    pub log: LogConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frames: FrameStoreConfig::default(),
            audio: AudioConfig::default(),
            subtitles: SubtitleConfig::default(),
            playback: PlaybackConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameStoreConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub digits: usize,
}

impl Default for FrameStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("frames"),
            prefix: "out".to_owned(),
            extension: "png".to_owned(),
            digits: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    pub path: PathBuf,
    pub enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bad_apple.mp3"),
            enabled: true,
        }
    }
}

/// Two caption tracks: `primary` is languageA, `secondary` is languageB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubtitleConfig {
    pub dir: PathBuf,
    pub primary: String,
    pub secondary: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            primary: "bad_apple_ja.srt".to_owned(),
            secondary: "bad_apple_en.srt".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackConfig {
    /// Frames loaded synchronously before playback starts.
    pub burst_frames: usize,
    /// Streamed frames allowed to wait in the queue.
    pub queue_capacity: usize,
    pub tick_ms: u64,
    /// Elapsed video time during which the control legend is shown.
    pub intro_ms: u64,
    /// Terminal rows kept free under the video for captions.
    pub caption_rows: u16,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            burst_frames: 30,
            queue_capacity: 100,
            tick_ms: 16,
            intro_ms: 14_600,
            caption_rows: 3,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn intro_window(&self) -> Duration {
        Duration::from_millis(self.intro_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.burst_frames == 0 {
            bail!("playback.burst_frames must be > 0");
        }
        if self.queue_capacity == 0 {
            bail!("playback.queue_capacity must be > 0");
        }
        if self.tick_ms == 0 {
            bail!("playback.tick_ms must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.frames.digits) {
            bail!(
                "frames.digits must be between 1 and 9 (got {})",
                self.frames.digits
            );
        }
        if self.frames.prefix.is_empty() {
            bail!("frames.prefix must not be empty");
        }
        if self.frames.extension.trim_start_matches('.').is_empty() {
            bail!("frames.extension must not be empty");
        }
        self.playback.validate()?;
        self.log
            .level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow!("log.level '{}' is not a tracing level", self.log.level))?;
        Ok(())
    }
}

/// Load a YAML config, or the defaults when `path` is `None`.
///
/// Only parse errors are reported here. Call [`PlayerConfig::validate`] once
/// overrides have been applied.
pub fn load_config(path: Option<&Path>) -> Result<PlayerConfig> {
    match path {
        Some(path) => parse_config_file(path),
        None => Ok(PlayerConfig::default()),
    }
}

fn parse_config_file(path: &Path) -> Result<PlayerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(PlayerConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        StartupError::new(
            ErrorCode::ConfigInvalid,
            format!(
                "failed to parse yaml in {} at {}: {}",
                path.display(),
                location,
                error
            ),
        )
        .into()
    })
}

/// Resolve a boolean override from CLI and env. CLI wins over env.
/// Returns None when neither is set.
pub fn resolve_bool_override(cli_arg: Option<bool>, env_var: Option<String>) -> Option<bool> {
    if cli_arg.is_some() {
        return cli_arg;
    }
    match env_var.as_deref().map(str::trim) {
        Some("1") | Some("on") | Some("true") => Some(true),
        Some("0") | Some("off") | Some("false") => Some(false),
        _ => None,
    }
}
