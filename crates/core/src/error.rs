//! Error types for geopipe

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for geopipe operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A named column is missing, duplicated or incompatible.
    #[error("Schema error: column '{column}' {reason}")]
    Schema { column: String, reason: String },

    /// Two layers with different coordinate reference systems were compared.
    #[error("CRS mismatch: {left} vs {right}; reproject one layer first")]
    CrsMismatch { left: String, right: String },

    /// A geometric operation needs a CRS the layer does not declare.
    #[error("Layer '{layer}' has no CRS; assign one before comparing geometries")]
    CrsUndefined { layer: String },

    /// `assign_crs` was asked to overwrite a CRS that is already declared.
    #[error("Layer '{layer}' already declares {crs}; use reprojection to change it")]
    CrsAlreadyDefined { layer: String, crs: String },

    #[error("Unsupported geometry: {kind} cannot be represented by {format}")]
    UnsupportedGeometry { kind: String, format: String },

    #[error("Output already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("GeoTIFF error: {0}")]
    Tiff(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::Schema`].
    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Schema {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Parse`].
    pub fn parse(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::Parse {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for geopipe operations
pub type Result<T> = std::result::Result<T, Error>;
