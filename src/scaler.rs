use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-feature input scaling fitted at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f32>, scale: Vec<f32> },
    /// `(x - min) * scale`
    MinMax { min: Vec<f32>, scale: Vec<f32> },
    /// Identity; stands in when no scaler artifact could be loaded.
    Passthrough,
}

impl Scaler {
    /// Read a JSON scaler artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let scaler: Self = serde_json::from_str(&text)?;
        scaler.check()?;
        Ok(scaler)
    }

    fn check(&self) -> Result<()> {
        let (a, b) = match self {
            Scaler::Standard { mean, scale } => (mean.len(), scale.len()),
            Scaler::MinMax { min, scale } => (min.len(), scale.len()),
            Scaler::Passthrough => return Ok(()),
        };
        if a != b {
            return Err(Error::InvalidModel(format!(
                "Scaler parameter lengths differ: {a} vs {b}"
            )));
        }
        Ok(())
    }

    /// Number of input features the scaler was fitted on, when known.
    pub fn n_features(&self) -> Option<usize> {
        match self {
            Scaler::Standard { mean, .. } => Some(mean.len()),
            Scaler::MinMax { min, .. } => Some(min.len()),
            Scaler::Passthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Scaler::Passthrough)
    }

    pub fn transform(&self, row: &[f32]) -> Result<Vec<f32>> {
        if let Some(n) = self.n_features() {
            if row.len() != n {
                return Err(Error::InvalidModel(format!(
                    "Scaler expects {n} features, got {}",
                    row.len()
                )));
            }
        }

        let out = match self {
            Scaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                // A zero scale means the feature was constant in training.
                .map(|(x, (m, s))| if *s == 0.0 { x - m } else { (x - m) / s })
                .collect(),
            Scaler::MinMax { min, scale } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (lo, s))| (x - lo) * s)
                .collect(),
            Scaler::Passthrough => row.to_vec(),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scaling() {
        let scaler = Scaler::Standard {
            mean: vec![1.0, 10.0],
            scale: vec![2.0, 0.0],
        };
        assert_eq!(scaler.transform(&[3.0, 12.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(scaler.n_features(), Some(2));
    }

    #[test]
    fn min_max_scaling() {
        let scaler = Scaler::MinMax {
            min: vec![-1.0],
            scale: vec![0.5],
        };
        assert_eq!(scaler.transform(&[1.0]).unwrap(), vec![1.0]);
    }

    #[test]
    fn width_mismatch_fails() {
        let scaler = Scaler::Standard {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert!(scaler.transform(&[1.0, 2.0]).is_err());
        assert_eq!(Scaler::Passthrough.transform(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn loads_tagged_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        fs::write(
            &path,
            r#"{"kind": "standard", "mean": [0.5, 1.5], "scale": [1.0, 2.0]}"#,
        )
        .unwrap();
        let scaler = Scaler::load(&path).unwrap();
        assert_eq!(scaler.n_features(), Some(2));

        fs::write(&path, r#"{"kind": "min_max", "min": [0.0], "scale": []}"#).unwrap();
        assert!(matches!(Scaler::load(&path), Err(Error::InvalidModel(_))));
    }
}
