//! File names of the versioned model layout and raw artifact reading.
//!
//! ```text
//! <models_root>/<modality>/<version>/
//!     feature_order.json   ordered feature names (required)
//!     scaler.json          input scaler
//!     tabnet.bin.bz2       attentive tabular network archive
//!     model.bin[.bz2]      generic estimator
//!     model.json           dense tensor network
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;

use crate::error::{Error, Result};

pub const FEATURE_ORDER_FILE: &str = "feature_order.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const TABNET_ARCHIVE_FILE: &str = "tabnet.bin.bz2";
pub const ESTIMATOR_FILES: [&str; 2] = ["model.bin", "model.bin.bz2"];
pub const TENSOR_FILE: &str = "model.json";

/// Read a file, transparently decompressing it when the name ends in `.bz2`.
pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let reader = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    if path.extension().is_some_and(|ext| ext == "bz2") {
        BzDecoder::new(reader).read_to_end(&mut bytes)?;
    } else {
        let mut reader = reader;
        reader.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Read the ordered feature-name manifest of a model version.
///
/// A missing, malformed or empty manifest is a configuration error.
pub fn read_feature_order(dir: &Path) -> Result<Vec<String>> {
    let path = dir.join(FEATURE_ORDER_FILE);
    let text = std::fs::read_to_string(&path).map_err(|e| {
        Error::Configuration(format!("{} not readable: {e}", path.display()))
    })?;
    let names: Vec<String> = serde_json::from_str(&text).map_err(|e| {
        Error::Configuration(format!("{} must be a list of strings: {e}", path.display()))
    })?;
    if names.is_empty() {
        return Err(Error::Configuration(format!(
            "{} lists no features",
            path.display()
        )));
    }
    Ok(names)
}
