//! Client configuration.

use crate::geometry::{HitboxParams, SmoothingParams};
use crate::history::MAX_UNDO_HISTORY;
use crate::page::{Background, BackgroundStyle, PageMeta, PageSize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Gates on which pointer samples are buffered while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Squared distance a move must exceed to be sampled.
    pub min_move_dist_sq: f64,
    /// Skipped moves after which a mouse sample is forced.
    pub mouse_min_samples: usize,
    /// Skipped moves after which a touch or stylus sample is forced.
    pub touch_min_samples: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_move_dist_sq: 100.0,
            mouse_min_samples: 8,
            touch_min_samples: 3,
        }
    }
}

/// Whiteboard client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the board API, with a trailing slash.
    pub api_url: String,
    pub request_timeout_ms: u64,
    /// How long to wait for the socket handshake.
    pub socket_timeout_ms: u64,
    pub sampling: SamplingConfig,
    pub smoothing: SmoothingParams,
    pub stroke_hitbox: HitboxParams,
    pub eraser_hitbox: HitboxParams,
    pub max_history: usize,
    /// Metadata for pages created without explicit metadata.
    pub default_page: PageMeta,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/".to_string(),
            request_timeout_ms: 3000,
            socket_timeout_ms: 3000,
            sampling: SamplingConfig::default(),
            smoothing: SmoothingParams::default(),
            stroke_hitbox: HitboxParams::STROKE,
            eraser_hitbox: HitboxParams::ERASER,
            max_history: MAX_UNDO_HISTORY,
            default_page: PageMeta {
                size: PageSize::A4_PORTRAIT,
                background: Background::pattern(BackgroundStyle::Blank),
            },
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Platform config location, e.g. `~/.config/boardsite/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("boardsite").join("config.json"))
    }
}
