//! Host configuration: default room options, tick rate, view layout and team colors.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use crate::{
    services::{display::DisplayLayout, team_assignment::RetryPolicy},
    state::{MatchSettings, TeamId, room_config::RoomConfig},
};

/// Default location on disk of the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/match.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MATCH_LOOP_CONFIG_PATH";
/// Color used when the palette is empty.
const DEFAULT_COLOR: TeamColor = TeamColor {
    h: 0.0,
    s: 0.0,
    v: 1.0,
};

/// HSV color shown for a team.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamColor {
    /// Hue in degrees, `-180..=180`.
    pub h: f32,
    /// Saturation, `0..=1`.
    pub s: f32,
    /// Value, `0..=1`.
    pub v: f32,
}

/// Reasons a configuration file is rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not valid JSON for the expected shape.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Well-formed but out of range.
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable host configuration.
pub struct AppConfig {
    /// Options published by the lobby when a room is created.
    pub room_defaults: RoomConfig,
    /// Real-time length of one countdown tick.
    pub tick_interval: Duration,
    /// Views exposed by the host scene.
    pub layout: DisplayLayout,
    /// Backoff while waiting for replicated team data.
    pub team_retry: RetryPolicy,
    colors: Vec<TeamColor>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        tick_ms = config.tick_interval.as_millis() as u64,
                        colors = config.colors.len(),
                        "loaded match config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "rejected config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON document. Missing fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        raw.validate()?;
        Ok(raw.into())
    }

    /// Tuning handed to every match hosted by this process.
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            tick_interval: self.tick_interval,
            layout: self.layout,
            team_retry: self.team_retry,
        }
    }

    /// Team colors, in team order.
    pub fn palette(&self) -> &[TeamColor] {
        &self.colors
    }

    /// Color of `team`; the palette wraps around when there are more teams than colors.
    pub fn team_color(&self, team: TeamId) -> TeamColor {
        color_for(&self.colors, team)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

/// Pick the palette entry of `team`, wrapping around.
pub fn color_for(palette: &[TeamColor], team: TeamId) -> TeamColor {
    if palette.is_empty() {
        return DEFAULT_COLOR;
    }
    let index = usize::try_from(team).unwrap_or(usize::MAX) % palette.len();
    palette[index]
}

#[derive(Debug, Deserialize, Validate)]
#[serde(default)]
/// JSON representation of the configuration file.
struct RawConfig {
    #[validate(range(max = 3600))]
    warmup_seconds: u32,
    #[validate(range(max = 3600))]
    match_seconds: u32,
    #[validate(range(min = 1, max = 100))]
    points_per_score: u32,
    #[validate(range(min = 10, max = 1000))]
    tick_interval_ms: u64,
    #[validate(range(max = 16))]
    timer_views: usize,
    #[validate(range(max = 16))]
    scoreboards: usize,
    #[validate(range(min = 1, max = 32))]
    team_slots: usize,
    #[validate(nested)]
    team_retry: RawRetry,
    #[validate(nested)]
    colors: Vec<RawColor>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let room = RoomConfig::default();
        let layout = DisplayLayout::default();
        Self {
            warmup_seconds: room.warmup_seconds,
            match_seconds: room.match_seconds,
            points_per_score: room.points_per_score,
            tick_interval_ms: 100,
            timer_views: layout.timer_views,
            scoreboards: layout.scoreboards,
            team_slots: layout.team_slots,
            team_retry: RawRetry::default(),
            colors: default_colors(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            room_defaults: RoomConfig {
                warmup_seconds: value.warmup_seconds,
                match_seconds: value.match_seconds,
                points_per_score: value.points_per_score,
            },
            tick_interval: Duration::from_millis(value.tick_interval_ms),
            layout: DisplayLayout {
                timer_views: value.timer_views,
                scoreboards: value.scoreboards,
                team_slots: value.team_slots,
            },
            team_retry: value.team_retry.into(),
            colors: value.colors.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(default)]
/// Backoff settings as written in the configuration file.
struct RawRetry {
    #[validate(range(min = 1, max = 10_000))]
    initial_delay_ms: u64,
    #[validate(range(min = 1, max = 60_000))]
    max_delay_ms: u64,
    #[validate(range(min = 1, max = 20))]
    attempts: u32,
}

impl Default for RawRetry {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            attempts: retry.attempts,
        }
    }
}

impl From<RawRetry> for RetryPolicy {
    fn from(value: RawRetry) -> Self {
        Self {
            initial_delay: Duration::from_millis(value.initial_delay_ms),
            max_delay: Duration::from_millis(value.max_delay_ms.max(value.initial_delay_ms)),
            attempts: value.attempts,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
/// JSON representation of a single HSV entry.
struct RawColor {
    #[validate(range(min = -180.0, max = 180.0))]
    hue: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    saturation: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    value: f32,
}

impl From<RawColor> for TeamColor {
    fn from(value: RawColor) -> Self {
        Self {
            h: value.hue,
            s: value.saturation,
            v: value.value,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in palette, one entry per default team slot.
fn default_colors() -> Vec<RawColor> {
    [
        (-120.0, 1.0),
        (0.0, 1.0),
        (120.0, 1.0),
        (60.0, 1.0),
        (-60.0, 0.8),
        (180.0, 0.8),
    ]
    .into_iter()
    .map(|(hue, saturation)| RawColor {
        hue,
        saturation,
        value: 1.0,
    })
    .collect()
}
