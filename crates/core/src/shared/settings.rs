use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::*;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Tunable parameters shared by enrollment and recognition.
///
/// Persisted as JSON; missing fields take their defaults so older files
/// keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tolerance: f64,
    pub rejection_ceiling: f64,
    pub skip_interval: usize,
    pub downscale: f64,
    pub min_face_size: u32,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub margin_fraction: f64,
    pub texture_floor: f64,
    pub capture_count: usize,
    pub crop_size: u32,
    pub artifact_path: Option<PathBuf>,
    pub corpus_dir: Option<PathBuf>,
    /// TrueType/OpenType font for overlay labels; a system font is used
    /// when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            rejection_ceiling: DEFAULT_REJECTION_CEILING,
            skip_interval: DEFAULT_SKIP_INTERVAL,
            downscale: DEFAULT_DOWNSCALE,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            min_aspect_ratio: DEFAULT_MIN_ASPECT_RATIO,
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
            margin_fraction: DEFAULT_MARGIN_FRACTION,
            texture_floor: DEFAULT_TEXTURE_FLOOR,
            capture_count: DEFAULT_CAPTURE_COUNT,
            crop_size: DEFAULT_CROP_SIZE,
            artifact_path: None,
            corpus_dir: None,
            font_path: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Load from the platform config path, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: &str| Err(SettingsError::Invalid(msg.to_string()));
        if !(self.tolerance > 0.0) {
            return invalid("tolerance must be positive");
        }
        if self.rejection_ceiling < self.tolerance {
            return invalid("rejection_ceiling must not be below tolerance");
        }
        if self.skip_interval == 0 {
            return invalid("skip_interval must be at least 1");
        }
        if !(self.downscale > 0.0 && self.downscale <= 1.0) {
            return invalid("downscale must be in (0, 1]");
        }
        if self.min_face_size == 0 {
            return invalid("min_face_size must be positive");
        }
        if !(self.min_aspect_ratio > 0.0 && self.min_aspect_ratio <= self.max_aspect_ratio) {
            return invalid("aspect ratio bounds must satisfy 0 < min <= max");
        }
        if !(0.0..1.0).contains(&self.margin_fraction) {
            return invalid("margin_fraction must be in [0, 1)");
        }
        if self.texture_floor < 0.0 {
            return invalid("texture_floor must not be negative");
        }
        if self.crop_size == 0 {
            return invalid("crop_size must be positive");
        }
        Ok(())
    }

    /// Artifact location, defaulting to the platform data dir.
    pub fn resolved_artifact_path(&self) -> Option<PathBuf> {
        self.artifact_path
            .clone()
            .or_else(|| app_data_dir().map(|d| d.join(ARTIFACT_FILE_NAME)))
    }

    /// Enrollment corpus location, defaulting to the platform data dir.
    pub fn resolved_corpus_dir(&self) -> Option<PathBuf> {
        self.corpus_dir
            .clone()
            .or_else(|| app_data_dir().map(|d| d.join(CORPUS_DIR_NAME)))
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
}
