//! End-to-end screening: image bytes in, labelled and explained outcome out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classifier::ModelSource;
use crate::compose::{fallback_text, Composer, DetectedSides, KoreanComposer};
use crate::config::Config;
use crate::detector::{extract_face, extract_hands, HandPair, LandmarkDetector};
use crate::error::{Error, Result};
use crate::features::{self, FeatureVector, Landmarks};
use crate::inference::{InferenceEngine, InferenceResult};
use crate::resolver::{ModelBundle, ModelResolver};
use crate::store::{sniff_mime, NewRecord, RecordSink, StoredRecord};
use crate::types::Modality;

pub type BoxedDetector = Box<dyn LandmarkDetector>;

/// Image input for one run.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// A single photograph (face).
    Image(&'a [u8]),
    /// Start and end pose photographs (arm).
    ImagePair { start: &'a [u8], end: &'a [u8] },
}

/// Result of one screening run, identical in shape for every modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub modality: Modality,
    /// Model input features in manifest order.
    pub features: FeatureVector,
    pub probability: f64,
    pub label: u8,
    pub explanation: String,
    pub model_source: ModelSource,
    pub model_version: String,
}

impl Outcome {
    pub fn is_abnormal(&self) -> bool {
        self.label == 1
    }
}

pub struct Pipeline {
    config: Config,
    resolver: Arc<ModelResolver>,
    engine: InferenceEngine,
    face_detector: BoxedDetector,
    hand_detector: Option<BoxedDetector>,
    composer: Box<dyn Composer>,
}

impl Pipeline {
    pub fn new(config: Config, face_detector: BoxedDetector) -> Self {
        let resolver = Arc::new(ModelResolver::new(config.models_root.clone()));
        Self {
            engine: InferenceEngine::new(&config),
            config,
            resolver,
            face_detector,
            hand_detector: None,
            composer: Box::new(KoreanComposer),
        }
    }

    pub fn with_hand_detector(mut self, detector: BoxedDetector) -> Self {
        self.hand_detector = Some(detector);
        self
    }

    pub fn with_composer(mut self, composer: Box<dyn Composer>) -> Self {
        self.composer = composer;
        self
    }

    /// Share a resolver (and its cache) with other pipelines.
    pub fn with_resolver(mut self, resolver: Arc<ModelResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<ModelResolver> {
        &self.resolver
    }

    /// Bundle for the configured version of `modality`.
    pub fn active_bundle(&self, modality: Modality) -> Result<Arc<ModelBundle>> {
        self.resolver
            .resolve(modality, self.config.version(modality))
    }

    /// Run the named modality on `payload`.
    ///
    /// `subject_name` is only used in face explanations.
    pub fn run(&self, modality: &str, payload: Payload<'_>, subject_name: Option<&str>) -> Result<Outcome> {
        let modality: Modality = modality.parse()?;
        match (modality, payload) {
            (Modality::Speech, _) => Err(Error::UnsupportedModality(Modality::Speech)),
            (Modality::Face, Payload::Image(bytes)) => self.run_face(bytes, subject_name),
            (Modality::Arm, Payload::ImagePair { start, end }) => self.run_arm(start, end),
            (Modality::Face, _) => Err(Error::InvalidPayload(
                "face screening takes exactly one image".into(),
            )),
            (Modality::Arm, _) => Err(Error::InvalidPayload(
                "arm screening takes a start and an end image".into(),
            )),
        }
    }

    pub fn run_face(&self, image: &[u8], subject_name: Option<&str>) -> Result<Outcome> {
        let keypoints = extract_face(&self.face_detector, image)?;
        let built = features::build(Modality::Face, Landmarks::Face(&keypoints))?;
        let (bundle, result) = self.score(Modality::Face, &built)?;

        let name = subject_name.unwrap_or_default();
        let explanation = self
            .composer
            .face(name, result.is_abnormal(), &built)
            .unwrap_or_else(|e| {
                log::warn!("Face composer failed: {e}");
                fallback_text(Modality::Face, result.is_abnormal())
            });

        Ok(outcome(&bundle, result, explanation))
    }

    pub fn run_arm(&self, start: &[u8], end: &[u8]) -> Result<Outcome> {
        let detector = self
            .hand_detector
            .as_ref()
            .ok_or_else(|| Error::Detector("no hand detector configured".into()))?;
        let start = extract_hands(detector, start)?;
        let end = extract_hands(detector, end)?;
        self.run_arm_keypoints(&start, &end)
    }

    /// Arm screening from hands that were already located.
    pub fn run_arm_keypoints(&self, start: &HandPair, end: &HandPair) -> Result<Outcome> {
        let built = features::build(Modality::Arm, Landmarks::Arm { start, end })?;
        let (bundle, result) = self.score(Modality::Arm, &built)?;

        let detected = DetectedSides::from_pairs(start, end);
        let explanation = self
            .composer
            .arm(result.probability, result.is_abnormal(), &built, detected)
            .unwrap_or_else(|e| {
                log::warn!("Arm composer failed: {e}");
                fallback_text(Modality::Arm, result.is_abnormal())
            });

        Ok(outcome(&bundle, result, explanation))
    }

    fn score(&self, modality: Modality, built: &FeatureVector) -> Result<(Arc<ModelBundle>, InferenceResult)> {
        let bundle = self.active_bundle(modality)?;
        let result = self.engine.infer(&bundle, built);
        log::info!(
            "{modality} screening with {} {}: p={:.4} label={}",
            bundle.source,
            bundle.version,
            result.probability,
            result.label
        );
        Ok((bundle, result))
    }

    /// Hand a finished outcome to a persistence sink.
    pub fn record(&self, sink: &dyn RecordSink, user_id: u64, image: &[u8], outcome: &Outcome) -> Result<StoredRecord> {
        sink.store(NewRecord {
            user_id,
            modality: outcome.modality,
            image: image.to_vec(),
            mime_type: sniff_mime(image).to_string(),
            result_text: outcome.explanation.clone(),
            features: outcome.features.to_json()?,
        })
    }
}

fn outcome(bundle: &ModelBundle, result: InferenceResult, explanation: String) -> Outcome {
    Outcome {
        modality: result.modality,
        features: result.features,
        probability: result.probability,
        label: result.label,
        explanation,
        model_source: bundle.source,
        model_version: bundle.version.clone(),
    }
}
