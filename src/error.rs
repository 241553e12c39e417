use thiserror::Error;

use crate::types::Modality;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("No {0} found in image")]
    NoSubjectFound(&'static str),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("The {0} pipeline is not yet available")]
    UnsupportedModality(Modality),

    #[error("Unknown modality: {0:?}")]
    UnknownModality(String),

    #[error("Landmark {0} missing from keypoint set")]
    MissingLandmark(usize),

    #[error("Model deserialization error: {0}")]
    Deserialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Record {0} not found")]
    RecordNotFound(u64),
}

/// Coarse grouping of errors for callers that need to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was bad (undecodable image, no face, wrong payload).
    Client,
    /// The modality exists but has no pipeline yet.
    NotImplemented,
    /// Deployment or environment problem on the serving side.
    Server,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_)
            | Error::NoSubjectFound(_)
            | Error::UnknownModality(_)
            | Error::InvalidPayload(_)
            | Error::MissingLandmark(_)
            | Error::RecordNotFound(_) => ErrorKind::Client,
            Error::UnsupportedModality(_) => ErrorKind::NotImplemented,
            _ => ErrorKind::Server,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
