//! # geopipe core
//!
//! Data model, error taxonomy and I/O for the geopipe analysis pipeline.
//!
//! This crate provides:
//! - `CRS`: coordinate reference systems built from EPSG codes or PROJ strings,
//!   compared by resolved parameters
//! - `VectorLayer`: typed features (points, lines, polygons) with an attribute schema
//! - `AttributeTable`: delimited tables to be joined onto layers
//! - `Raster<T>`: generic raster grid with `GeoTransform` georeferencing
//! - Loaders and writers for vector bundles, point CSV, tables and GeoTIFF

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::{Transformer, CRS};
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{
    AttributeTable, AttributeValue, Feature, Field, FieldType, GeometryKind, Schema, VectorLayer,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{Transformer, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::io::{VectorFormat, WriteOptions};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{
        AttributeTable, AttributeValue, Feature, Field, FieldType, GeometryKind, Schema,
        VectorLayer,
    };
    pub use crate::Algorithm;
}

/// Core trait for pipeline stages.
///
/// Stages are pure functions from input layers to a new output; inputs are
/// never mutated.
pub trait Algorithm {
    /// Input type for the stage
    type Input;
    /// Output type for the stage
    type Output;
    /// Parameters controlling stage behavior
    type Params: Default;
    /// Error type for stage execution
    type Error: std::error::Error;

    /// Returns the stage name
    fn name(&self) -> &'static str;

    /// Returns a description of what the stage does
    fn description(&self) -> &'static str;

    /// Execute the stage
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
