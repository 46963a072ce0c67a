//! Optimizer configuration.
//!
//! All recognized options live in [`OptSettings`], an explicit structure with
//! one field per option and the documented defaults. Settings can be built
//! programmatically, loaded from an INI file with an `[optimizer]` section,
//! or taken wholesale from [`OptSettings::default`].
//!
//! Unknown keys in a settings file are rejected at load time rather than
//! silently ignored, so a typo like `max_cylces = 50` fails immediately
//! instead of running with a default the user did not intend.
//!
//! # File format
//!
//! ```ini
//! [optimizer]
//! max_cycles = 50
//! max_force_thresh = 0.01
//! rms_force_thresh = 0.001
//! max_step = 0.04
//! force_backtrack_in = 3
//! epsilon = 0.001
//! alpha0 = -0.05
//! scale_factor = 0.5
//! ```

use configparser::ini::Ini;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating optimizer settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// INI parsing failed.
    #[error("settings file parse error: {0}")]
    Parse(String),
    /// The file contains a key this version does not recognize.
    #[error("unknown settings key: [optimizer] {0}")]
    UnknownKey(String),
    /// A value could not be converted to the expected type.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Raw value as found in the file.
        value: String,
    },
    /// A value is outside the range the optimizer can work with.
    #[error("out of range: {0}")]
    OutOfRange(String),
}

/// Configuration for the optimizer loop and its step control.
///
/// The defaults match the conservative values used throughout the test-suite;
/// real applications typically raise `max_cycles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptSettings {
    /// Maximum number of optimization cycles before giving up (default: 15).
    pub max_cycles: usize,
    /// Convergence ceiling on the largest absolute force component
    /// (default: 0.01).
    pub max_force_thresh: f64,
    /// Convergence ceiling on the root-mean-square force (default: 0.001).
    pub rms_force_thresh: f64,
    /// Largest allowed absolute component of a single step; larger steps are
    /// rescaled uniformly (default: 0.04).
    pub max_step: f64,
    /// Cool-down window of the backtracking controller: number of improving
    /// cycles before an acceleration or reset is attempted (default: 3).
    pub force_backtrack_in: i32,
    /// Relative RMS-force growth above which the step scale is shrunk
    /// (default: 1e-3).
    pub epsilon: f64,
    /// Reference step-scale value `alpha` is reset to (default: -0.05).
    pub alpha0: f64,
    /// Multiplier applied to `alpha` when shrinking; its inverse is applied
    /// when accelerating (default: 0.5).
    pub scale_factor: f64,
}

impl Default for OptSettings {
    fn default() -> Self {
        Self {
            max_cycles: 15,
            max_force_thresh: 0.01,
            rms_force_thresh: 0.001,
            max_step: 0.04,
            force_backtrack_in: 3,
            epsilon: 1e-3,
            alpha0: -0.05,
            scale_factor: 0.5,
        }
    }
}

impl OptSettings {
    /// Load settings from an INI file, applying file values on top of the
    /// defaults. Keys outside the recognized set are rejected.
    pub fn from_ini_file(path: &Path) -> Result<Self, SettingsError> {
        let mut ini = Ini::new();
        let map = ini
            .load(path)
            .map_err(SettingsError::Parse)?;

        let mut settings = Self::default();
        if let Some(section) = map.get("optimizer") {
            for (key, value) in section {
                let raw = value.clone().unwrap_or_default();
                settings.apply(key, &raw)?;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, key: &str, raw: &str) -> Result<(), SettingsError> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, SettingsError> {
            raw.parse().map_err(|_| SettingsError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
            })
        }

        match key {
            "max_cycles" => self.max_cycles = parse(key, raw)?,
            "max_force_thresh" => self.max_force_thresh = parse(key, raw)?,
            "rms_force_thresh" => self.rms_force_thresh = parse(key, raw)?,
            "max_step" => self.max_step = parse(key, raw)?,
            "force_backtrack_in" => self.force_backtrack_in = parse(key, raw)?,
            "epsilon" => self.epsilon = parse(key, raw)?,
            "alpha0" => self.alpha0 = parse(key, raw)?,
            "scale_factor" => self.scale_factor = parse(key, raw)?,
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Check that every option is in a range the optimizer can work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_cycles == 0 {
            return Err(SettingsError::OutOfRange(
                "max_cycles must be at least 1".to_string(),
            ));
        }
        if self.max_force_thresh <= 0.0 {
            return Err(SettingsError::OutOfRange(format!(
                "max_force_thresh must be positive, got {}",
                self.max_force_thresh
            )));
        }
        if self.rms_force_thresh <= 0.0 {
            return Err(SettingsError::OutOfRange(format!(
                "rms_force_thresh must be positive, got {}",
                self.rms_force_thresh
            )));
        }
        if self.max_step <= 0.0 {
            return Err(SettingsError::OutOfRange(format!(
                "max_step must be positive, got {}",
                self.max_step
            )));
        }
        if self.epsilon <= 0.0 {
            return Err(SettingsError::OutOfRange(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.scale_factor <= 0.0 || self.scale_factor >= 1.0 {
            return Err(SettingsError::OutOfRange(format!(
                "scale_factor must lie in (0, 1), got {}",
                self.scale_factor
            )));
        }
        if self.force_backtrack_in < 0 {
            return Err(SettingsError::OutOfRange(format!(
                "force_backtrack_in must be non-negative, got {}",
                self.force_backtrack_in
            )));
        }
        Ok(())
    }
}
