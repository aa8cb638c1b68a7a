use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single `/predict` request. Every variant is terminal for that request.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Models not loaded")]
    ServiceUnavailable,

    #[error("Missing {field} field in request")]
    MissingField { field: &'static str },

    #[error("No JSON data provided")]
    MalformedPayload { reason: String },

    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    #[error("Volume estimation failed")]
    EstimationFailed(#[source] EstimationError),
}

/// Response class of a pipeline outcome, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    BadRequest,
    ServiceUnavailable,
    InternalError,
}

impl PipelineError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            PipelineError::ServiceUnavailable => StatusClass::ServiceUnavailable,
            PipelineError::MissingField { .. }
            | PipelineError::MalformedPayload { .. }
            | PipelineError::InvalidImage(_) => StatusClass::BadRequest,
            PipelineError::EstimationFailed(_) => StatusClass::InternalError,
        }
    }

    /// Extra diagnostic text surfaced to the caller. Only estimation failures carry it.
    pub fn details(&self) -> Option<String> {
        match self {
            PipelineError::EstimationFailed(cause) => Some(cause.to_string()),
            _ => None,
        }
    }

    /// Pipeline stage the failure belongs to, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::ServiceUnavailable => "readiness",
            PipelineError::MissingField { .. } | PipelineError::MalformedPayload { .. } => {
                "payload"
            }
            PipelineError::InvalidImage(_) => "image decoding",
            PipelineError::EstimationFailed(_) => "volume estimation",
        }
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid base64 image data")]
    Base64(#[source] base64::DecodeError),

    #[error("Invalid byte array image data")]
    ByteArray { reason: String },

    #[error("Could not decode image")]
    Undecodable(#[source] image::ImageError),

    #[error("Could not decode image")]
    Empty,
}

#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("failed to encode image for inference: {0}")]
    Encode(#[from] image::ImageError),

    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inference endpoint returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("inference endpoint returned invalid volume {value} at index {index}")]
    InvalidVolume { index: usize, value: f64 },

    #[error("estimation timed out after {0:?}")]
    Timeout(Duration),

    #[error("image decoding worker failed: {0}")]
    Worker(#[source] tokio::task::JoinError),
}

/// Failure to build the density catalog at startup.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read density database {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch density database from {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse density database {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("invalid density {density} for {key:?} in {origin}")]
    InvalidDensity {
        origin: String,
        key: String,
        density: f64,
    },

    #[error("unsupported density database source: {0}")]
    Unsupported(String),
}
