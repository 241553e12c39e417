//! Runtime configuration: model locations, active versions and thresholds.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Modality;

/// Per-modality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityConfig {
    /// Active model version directory name (e.g. `"v1"`).
    pub version: String,

    /// Probability cutoff: `label = 1` iff `probability >= threshold`.
    pub threshold: f64,
}

impl ModalityConfig {
    pub fn new(version: impl Into<String>, threshold: f64) -> Self {
        Self {
            version: version.into(),
            threshold,
        }
    }
}

/// Pipeline configuration.
///
/// Built once and handed to the resolver and pipeline at construction;
/// nothing in the crate reads process state after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the `<modality>/<version>/` model tree (default: `assets/models`)
    pub models_root: PathBuf,

    /// Face palsy screening (default: v1, threshold 0.2278)
    pub face: ModalityConfig,

    /// Arm drift screening (default: v1, threshold 0.5)
    pub arm: ModalityConfig,

    /// Speech screening, reserved (default: v1, threshold 0.5)
    pub speech: ModalityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("assets/models"),
            face: ModalityConfig::new("v1", 0.2278),
            arm: ModalityConfig::new("v1", 0.5),
            speech: ModalityConfig::new("v1", 0.5),
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `STROKE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup.
    ///
    /// Recognized keys: `STROKE_MODELS_ROOT`, `STROKE_<MODALITY>_MODEL_VERSION`
    /// and `STROKE_<MODALITY>_THRESHOLD`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("STROKE_MODELS_ROOT") {
            self.models_root = PathBuf::from(root);
        }

        for modality in Modality::ALL {
            let upper = modality.as_str().to_ascii_uppercase();
            let version_key = format!("STROKE_{upper}_MODEL_VERSION");
            let threshold_key = format!("STROKE_{upper}_THRESHOLD");

            let entry = self.modality_mut(modality);
            if let Some(version) = lookup(&version_key) {
                entry.version = version;
            }
            if let Some(raw) = lookup(&threshold_key) {
                entry.threshold = raw.trim().parse().map_err(|_| {
                    Error::Configuration(format!("{threshold_key} is not a number: {raw:?}"))
                })?;
            }
        }

        self.validate()?;
        Ok(self)
    }

    pub fn modality(&self, modality: Modality) -> &ModalityConfig {
        match modality {
            Modality::Face => &self.face,
            Modality::Arm => &self.arm,
            Modality::Speech => &self.speech,
        }
    }

    fn modality_mut(&mut self, modality: Modality) -> &mut ModalityConfig {
        match modality {
            Modality::Face => &mut self.face,
            Modality::Arm => &mut self.arm,
            Modality::Speech => &mut self.speech,
        }
    }

    pub fn threshold(&self, modality: Modality) -> f64 {
        self.modality(modality).threshold
    }

    pub fn version(&self, modality: Modality) -> &str {
        &self.modality(modality).version
    }

    pub fn validate(&self) -> Result<()> {
        for modality in Modality::ALL {
            let entry = self.modality(modality);
            if !(0.0..=1.0).contains(&entry.threshold) {
                return Err(Error::Configuration(format!(
                    "{modality} threshold {} is outside [0, 1]",
                    entry.threshold
                )));
            }
            if entry.version.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "{modality} model version is empty"
                )));
            }
        }
        Ok(())
    }
}
