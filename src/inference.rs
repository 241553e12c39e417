//! Scaler + classifier application and threshold labelling.

use serde::{Deserialize, Serialize};

use crate::classifier::Prediction;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::resolver::ModelBundle;
use crate::types::Modality;

/// Probability reported whenever inference cannot produce a usable value.
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub modality: Modality,
    /// Model input, aligned to the bundle manifest.
    pub features: FeatureVector,
    /// Probability of the abnormal class, in `[0, 1]`.
    pub probability: f64,
    /// `1` when `probability >= threshold`.
    pub label: u8,
}

impl InferenceResult {
    pub fn is_abnormal(&self) -> bool {
        self.label == 1
    }
}

/// `1` iff `probability >= threshold`.
pub fn label_for(probability: f64, threshold: f64) -> u8 {
    u8::from(probability >= threshold)
}

/// Runs bundles against feature vectors with the configured thresholds.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    face: f64,
    arm: f64,
    speech: f64,
}

impl InferenceEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            face: config.threshold(Modality::Face),
            arm: config.threshold(Modality::Arm),
            speech: config.threshold(Modality::Speech),
        }
    }

    pub fn threshold(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Face => self.face,
            Modality::Arm => self.arm,
            Modality::Speech => self.speech,
        }
    }

    pub fn infer(&self, bundle: &ModelBundle, features: &FeatureVector) -> InferenceResult {
        let threshold = self.threshold(bundle.modality);
        infer(bundle, features, threshold)
    }
}

/// Score `features` with `bundle` and label the result against `threshold`.
///
/// Never fails: a scaler error falls back to the unscaled row and a
/// classifier error yields [`NEUTRAL_PROBABILITY`].
pub fn infer(bundle: &ModelBundle, features: &FeatureVector, threshold: f64) -> InferenceResult {
    let row = features.to_row(&bundle.manifest);

    let scaled = match bundle.scaler.transform(&row) {
        Ok(scaled) => scaled,
        Err(e) => {
            log::warn!(
                "{} {}: scaler transform failed ({e}); using the unscaled row",
                bundle.modality,
                bundle.version
            );
            row
        }
    };

    let probability = match bundle
        .classifier
        .predict(&scaled)
        .and_then(positive_probability)
    {
        Ok(p) => p,
        Err(e) => {
            log::error!(
                "{} {} ({}): inference failed ({e}); reporting {NEUTRAL_PROBABILITY}",
                bundle.modality,
                bundle.version,
                bundle.source
            );
            NEUTRAL_PROBABILITY
        }
    };

    InferenceResult {
        modality: bundle.modality,
        features: features.aligned(&bundle.manifest),
        probability,
        label: label_for(probability, threshold),
    }
}

/// Pick the abnormal-class probability out of a raw prediction.
fn positive_probability(prediction: Prediction) -> Result<f64> {
    let value = match prediction {
        Prediction::Proba(p) => match p.as_slice() {
            [_, positive, ..] => *positive,
            [only] => *only,
            [] => return Err(Error::InvalidModel("empty probability output".into())),
        },
        Prediction::Point(v) => v,
    };
    let value = f64::from(value);
    if !value.is_finite() {
        return Err(Error::InvalidModel(format!("non-finite output {value}")));
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::classifier::{Classifier, ModelSource, NeutralClassifier};
    use crate::estimator::{Estimator, LinearModel};
    use crate::scaler::Scaler;

    #[derive(Debug)]
    struct Fixed(Result<Prediction>);

    impl Classifier for Fixed {
        fn predict(&self, _row: &[f32]) -> Result<Prediction> {
            match &self.0 {
                Ok(p) => Ok(p.clone()),
                Err(_) => Err(Error::InvalidModel("boom".into())),
            }
        }
    }

    /// Echoes the first input column as the abnormal probability.
    #[derive(Debug)]
    struct Echo;

    impl Classifier for Echo {
        fn predict(&self, row: &[f32]) -> Result<Prediction> {
            let p = row.first().copied().unwrap_or(0.0);
            Ok(Prediction::Proba(vec![1.0 - p, p]))
        }
    }

    fn bundle(classifier: Box<dyn Classifier>, scaler: Scaler, manifest: &[&str]) -> ModelBundle {
        ModelBundle {
            modality: Modality::Face,
            version: "v1".into(),
            dir: PathBuf::from("unused"),
            manifest: manifest.iter().map(|s| s.to_string()).collect(),
            scaler,
            classifier,
            source: ModelSource::Estimator,
        }
    }

    fn features(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn prediction_shapes() {
        let cases = [
            (Ok(Prediction::Proba(vec![0.3, 0.7])), 0.7),
            (Ok(Prediction::Proba(vec![0.25])), 0.25),
            (Ok(Prediction::Point(0.4)), 0.4),
            (Ok(Prediction::Point(1.7)), 1.0),
            (Ok(Prediction::Point(-0.2)), 0.0),
            (Ok(Prediction::Point(f32::NAN)), NEUTRAL_PROBABILITY),
            (Ok(Prediction::Proba(vec![])), NEUTRAL_PROBABILITY),
            (Err(Error::InvalidModel(String::new())), NEUTRAL_PROBABILITY),
        ];
        for (prediction, expected) in cases {
            let b = bundle(Box::new(Fixed(prediction)), Scaler::Passthrough, &["a"]);
            let result = infer(&b, &FeatureVector::new(), 0.5);
            assert!((result.probability - expected).abs() < 1e-6, "{result:?}");
        }
    }

    #[test]
    fn row_follows_manifest_with_zero_fill() {
        let b = bundle(Box::new(Echo), Scaler::Passthrough, &["b", "missing"]);
        let result = infer(&b, &features(&[("a", 0.9), ("b", 0.25)]), 0.5);

        assert!((result.probability - 0.25).abs() < 1e-6);
        let names: Vec<_> = result.features.names().collect();
        assert_eq!(names, ["b", "missing"]);
        assert_eq!(result.features.get("missing"), Some(0.0));
    }

    #[test]
    fn scaler_is_applied_and_failures_fall_back_to_raw() {
        let scaled = bundle(
            Box::new(Echo),
            Scaler::Standard {
                mean: vec![0.5],
                scale: vec![2.0],
            },
            &["a"],
        );
        let result = infer(&scaled, &features(&[("a", 1.5)]), 0.5);
        assert!((result.probability - 0.5).abs() < 1e-6);

        // Scaler fitted on two columns, manifest has one: transform fails.
        let broken = bundle(
            Box::new(Echo),
            Scaler::MinMax {
                min: vec![0.0, 0.0],
                scale: vec![10.0, 10.0],
            },
            &["a"],
        );
        let result = infer(&broken, &features(&[("a", 0.125)]), 0.5);
        assert!((result.probability - 0.125).abs() < 1e-6);
    }

    #[test]
    fn label_is_threshold_inclusive() {
        assert_eq!(label_for(0.5, 0.5), 1);
        assert_eq!(label_for(0.4999, 0.5), 0);
        assert_eq!(label_for(0.0, 0.0), 1);

        let b = bundle(Box::new(NeutralClassifier), Scaler::Passthrough, &["a"]);
        assert!(infer(&b, &FeatureVector::new(), 0.2278).is_abnormal());
        assert!(!infer(&b, &FeatureVector::new(), 0.6).is_abnormal());
    }

    #[test]
    fn engine_uses_configured_thresholds() {
        let mut config = Config::default();
        config.face.threshold = 0.9;
        let engine = InferenceEngine::new(&config);
        assert_eq!(engine.threshold(Modality::Face), 0.9);
        assert_eq!(engine.threshold(Modality::Arm), 0.5);

        let b = bundle(Box::new(NeutralClassifier), Scaler::Passthrough, &["a"]);
        let result = engine.infer(&b, &FeatureVector::new());
        assert_eq!(result.probability, 0.5);
        assert_eq!(result.label, 0);
    }

    #[test]
    fn infinite_arm_slope_degrades_to_neutral() {
        // A vertical thumb-pinky line gives an infinite slope; 0 * inf is NaN.
        let model = Estimator::Logistic(LinearModel {
            coef: vec![0.0],
            intercept: 0.0,
        });
        let mut b = bundle(Box::new(model), Scaler::Passthrough, &["left_start_slope"]);
        b.modality = Modality::Arm;

        let result = infer(&b, &features(&[("left_start_slope", f64::INFINITY)]), 0.5);
        assert_eq!(result.probability, NEUTRAL_PROBABILITY);
        assert_eq!(result.label, 1);
        assert_eq!(result.features.get("left_start_slope"), Some(f64::INFINITY));
    }

    #[test]
    fn inference_is_deterministic() {
        let b = bundle(Box::new(Echo), Scaler::Passthrough, &["a", "b"]);
        let input = features(&[("a", 0.3), ("b", 0.1)]);
        let first = infer(&b, &input, 0.5);
        for _ in 0..10 {
            assert_eq!(infer(&b, &input, 0.5), first);
        }
    }
}
