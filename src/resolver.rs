//! Model resolution: locate, load and cache the artifact bundle for a
//! (modality, version).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::artifact::{
    read_feature_order, ESTIMATOR_FILES, SCALER_FILE, TABNET_ARCHIVE_FILE, TENSOR_FILE,
};
use crate::classifier::{Classifier, DenseNetwork, ModelSource, NeutralClassifier, TabNetClassifier};
use crate::error::{Error, Result};
use crate::estimator::Estimator;
use crate::scaler::Scaler;
use crate::types::Modality;

/// Scaler, classifier and feature manifest for one model version.
#[derive(Debug)]
pub struct ModelBundle {
    pub modality: Modality,
    pub version: String,
    pub dir: PathBuf,
    /// Feature names in training order.
    pub manifest: Vec<String>,
    pub scaler: Scaler,
    pub classifier: Box<dyn Classifier>,
    pub source: ModelSource,
}

impl ModelBundle {
    /// True when the bundle is running on a stand-in scaler or classifier.
    pub fn is_degraded(&self) -> bool {
        self.source == ModelSource::Neutral || self.scaler.is_passthrough()
    }
}

type LoadAttempt = fn(&Path) -> Result<Option<Box<dyn Classifier>>>;

/// Classifier formats in priority order. An attempt returns `Ok(None)` when
/// its artifact is not present.
const CLASSIFIER_ATTEMPTS: [(ModelSource, LoadAttempt); 3] = [
    (ModelSource::TabNet, try_tabnet),
    (ModelSource::Estimator, try_estimator),
    (ModelSource::Tensor, try_tensor),
];

fn try_tabnet(dir: &Path) -> Result<Option<Box<dyn Classifier>>> {
    let path = dir.join(TABNET_ARCHIVE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(Box::new(TabNetClassifier::load(&path)?)))
}

fn try_estimator(dir: &Path) -> Result<Option<Box<dyn Classifier>>> {
    for name in ESTIMATOR_FILES {
        let path = dir.join(name);
        if path.exists() {
            return Ok(Some(Box::new(Estimator::load(&path)?)));
        }
    }
    Ok(None)
}

fn try_tensor(dir: &Path) -> Result<Option<Box<dyn Classifier>>> {
    let path = dir.join(TENSOR_FILE);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(Box::new(DenseNetwork::load(&path)?)))
}

/// Walk the format list and return the first classifier that loads.
///
/// Load failures are logged and the next format is tried. Fails with
/// `ModelUnavailable` when nothing loads.
pub fn load_classifier(dir: &Path) -> Result<(Box<dyn Classifier>, ModelSource)> {
    for (source, attempt) in CLASSIFIER_ATTEMPTS {
        match attempt(dir) {
            Ok(Some(classifier)) => {
                log::info!("Loaded {source} classifier from {}", dir.display());
                return Ok((classifier, source));
            }
            Ok(None) => log::debug!("No {source} artifact in {}", dir.display()),
            Err(e) => log::error!("Failed to load {source} classifier from {}: {e}", dir.display()),
        }
    }
    Err(Error::ModelUnavailable(format!(
        "no classifier artifact loads from {}",
        dir.display()
    )))
}

/// Load the scaler, falling back to the identity scaler on any failure.
pub fn load_scaler(dir: &Path) -> Scaler {
    let path = dir.join(SCALER_FILE);
    match Scaler::load(&path) {
        Ok(scaler) => scaler,
        Err(e) => {
            log::warn!(
                "Scaler load failed ({}): {e}; continuing with passthrough scaling",
                path.display()
            );
            Scaler::Passthrough
        }
    }
}

/// Load every artifact of one model version directory.
pub fn load_bundle(dir: &Path, modality: Modality, version: &str) -> Result<ModelBundle> {
    let manifest = read_feature_order(dir)?;
    let scaler = load_scaler(dir);

    if let Some(n) = scaler.n_features() {
        if n != manifest.len() {
            return Err(Error::Configuration(format!(
                "{}: scaler expects {n} features but the manifest lists {}",
                dir.display(),
                manifest.len()
            )));
        }
    }

    let (classifier, source) = match load_classifier(dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("{e}; using the neutral classifier (every probability will be 0.5)");
            (Box::new(NeutralClassifier) as Box<dyn Classifier>, ModelSource::Neutral)
        }
    };

    if let Some(n) = classifier.n_features() {
        if n != manifest.len() {
            log::warn!(
                "{}: {source} classifier expects {n} features but the manifest lists {}",
                dir.display(),
                manifest.len()
            );
        }
    }

    Ok(ModelBundle {
        modality,
        version: version.to_string(),
        dir: dir.to_path_buf(),
        manifest,
        scaler,
        classifier,
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModelKey {
    modality: Modality,
    version: String,
}

/// Loads model bundles on first use and keeps them for the process lifetime.
///
/// Concurrent first requests for the same key may each load the artifacts;
/// the first one stored wins and every caller gets that bundle. Failed loads
/// are not cached.
#[derive(Debug)]
pub struct ModelResolver {
    models_root: PathBuf,
    cache: RwLock<HashMap<ModelKey, Arc<ModelBundle>>>,
}

impl ModelResolver {
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    pub fn model_dir(&self, modality: Modality, version: &str) -> PathBuf {
        self.models_root.join(modality.as_str()).join(version)
    }

    pub fn resolve(&self, modality: Modality, version: &str) -> Result<Arc<ModelBundle>> {
        let key = ModelKey {
            modality,
            version: version.to_string(),
        };

        if let Some(bundle) = self.cache.read().get(&key) {
            return Ok(Arc::clone(bundle));
        }

        // Loaded outside the lock; other keys stay readable meanwhile.
        let dir = self.model_dir(modality, version);
        log::info!("Resolving {modality} model {version} from {}", dir.display());
        let loaded = Arc::new(load_bundle(&dir, modality, version)?);

        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(key).or_insert(loaded)))
    }

    pub fn is_cached(&self, modality: Modality, version: &str) -> bool {
        self.cache.read().contains_key(&ModelKey {
            modality,
            version: version.to_string(),
        })
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}
