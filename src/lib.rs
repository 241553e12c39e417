//! # stroke-screen
//!
//! Stroke screening from photographs: facial palsy from a single face image
//! and arm drift from a pair of hand images.
//!
//! This crate provides:
//! - **Landmark extraction**: a [`LandmarkDetector`] seam, with a bundled
//!   ERT cascade detector built on rustface region proposals
//! - **Feature building**: 59 face asymmetry features and 16 arm drift
//!   features, in a fixed named order
//! - **Model resolution**: versioned artifact directories with format
//!   fallback and a process-wide cache
//! - **Inference**: scaling, classification and thresholding
//! - **Explanations**: Korean result text naming the most asymmetric region
//!   or the hand that moved most
//!
//! ## Pipeline
//!
//! 1. Decode the image and locate landmarks
//! 2. Derive the modality's feature vector from landmark geometry
//! 3. Resolve the configured model version and score the vector
//! 4. Label against the configured threshold and compose the explanation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stroke_screen::{Config, ErtDetector, Payload, Pipeline, ProposalParams};
//!
//! let config = Config::from_env().unwrap();
//! let detector = ErtDetector::load(
//!     "seeta_fd_frontal_v1.0.bin",
//!     "face_mesh_ert.bin.bz2",
//!     &ProposalParams::default(),
//! )
//! .unwrap();
//! let pipeline = Pipeline::new(config, Box::new(detector));
//!
//! let image = std::fs::read("face.jpg").unwrap();
//! let outcome = pipeline.run("face", Payload::Image(&image), Some("홍길동")).unwrap();
//! println!("{} (p={:.3})", outcome.explanation, outcome.probability);
//! ```
//!
//! ## Model Layout
//!
//! ```text
//! <models_root>/<modality>/<version>/
//!     feature_order.json
//!     scaler.json
//!     tabnet.bin.bz2 | model.bin[.bz2] | model.json
//! ```

pub mod arm;
pub mod artifact;
pub mod classifier;
pub mod compose;
mod config;
pub mod detector;
mod error;
pub mod estimator;
pub mod face;
pub mod features;
pub mod inference;
mod pipeline;
mod raster;
pub mod resolver;
mod scaler;
pub mod shape_model;
pub mod store;
mod tree;
mod types;

pub use classifier::{Classifier, ModelSource, NeutralClassifier, Prediction};
pub use compose::{Composer, DetectedSides, KoreanComposer};
pub use config::{Config, ModalityConfig};
pub use detector::{extract_face, extract_hands, ErtDetector, HandPair, LandmarkDetector, ProposalParams};
pub use error::{Error, ErrorKind, Result};
pub use features::{FeatureVector, Landmarks};
pub use inference::{InferenceEngine, InferenceResult};
pub use pipeline::{BoxedDetector, Outcome, Payload, Pipeline};
pub use raster::{decode_raster, PixelSource, Raster};
pub use resolver::{ModelBundle, ModelResolver};
pub use scaler::Scaler;
pub use shape_model::{LandmarkModel, PixelProbe};
pub use store::{MemoryStore, RecordSink};
pub use tree::{RegressionTree, SplitRule, TreeNode};
pub use types::{BoundingBox, KeypointSet, Modality, Point, Side, Subject};
