use std::path::PathBuf;

use thiserror::Error;

use crate::model::record::{Failure, FailureStage};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("failed to hand image to OCR engine: {0}")]
    Encode(#[from] image::ImageError),

    #[error("OCR engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error(transparent)]
    Ocr(#[from] OcrError),
}

impl ExtractError {
    pub fn stage(&self) -> FailureStage {
        match self {
            ExtractError::Decode { .. } => FailureStage::Decode,
            ExtractError::Ocr(_) => FailureStage::Ocr,
        }
    }
}

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("cannot build prompt: {0}")]
    Prompt(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid completion envelope: {0}")]
    Envelope(String),

    #[error("completion returned no choices")]
    EmptyChoices,

    #[error("invalid AI response: missing choices[0].message.content")]
    MissingContent,

    #[error("model content is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl StructureError {
    pub fn stage(&self) -> FailureStage {
        match self {
            StructureError::MissingApiKey
            | StructureError::Prompt(_)
            | StructureError::Request(_)
            | StructureError::Api { .. } => FailureStage::Request,
            StructureError::Envelope(_)
            | StructureError::EmptyChoices
            | StructureError::MissingContent
            | StructureError::InvalidJson(_) => FailureStage::Response,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot read input directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<ExtractError> for Failure {
    fn from(e: ExtractError) -> Self {
        Failure {
            stage: e.stage(),
            reason: e.to_string(),
        }
    }
}

impl From<StructureError> for Failure {
    fn from(e: StructureError) -> Self {
        Failure {
            stage: e.stage(),
            reason: e.to_string(),
        }
    }
}
