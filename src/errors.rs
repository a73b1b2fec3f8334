use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the road segmentation pipeline.
///
/// Each variant carries the context of its stage (filesystem, raster codec,
/// model, remote fetch) so the HTTP layer can report a failure without
/// parsing error strings.
#[derive(Error, Debug)]
pub enum RoadSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Raster error: {operation} failed (file: {path})")]
    Raster {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Fetch error: could not retrieve {url}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported upload type `{content_type}` for {file_name}")]
    UnsupportedUpload {
        file_name: String,
        content_type: String,
    },

    #[error("Dimension mismatch: buffer holds {actual} samples, {width}x{height} raster needs {expected}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RoadSegError>;

impl RoadSegError {
    pub(crate) fn raster<E>(path: impl AsRef<std::path::Path>, operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Raster {
            path: path.as_ref().display().to_string(),
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn file_system(path: impl Into<PathBuf>, operation: &str, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            operation: operation.to_string(),
            source,
        }
    }

    pub(crate) fn model<E>(operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Model {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

/// Fallback for I/O errors raised without path context. Callers that know the
/// path construct `RoadSegError::FileSystem` directly.
impl From<std::io::Error> for RoadSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<tiff::TiffError> for RoadSegError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Raster {
            path: "unknown".to_string(),
            operation: "tiff codec".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for RoadSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come out of tensor reshaping around the forward pass, so they
/// are reported as model errors.
impl From<ndarray::ShapeError> for RoadSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<reqwest::Error> for RoadSegError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch {
            url: err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for RoadSegError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            message: format!("catalog manifest: {err}"),
        }
    }
}
