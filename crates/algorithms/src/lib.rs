//! # geopipe algorithms
//!
//! Pipeline stages operating on `geopipe-core` layers.
//!
//! ## Stages
//!
//! - **join**: attribute join of a delimited table onto a layer by key
//! - **harmonize**: CRS safety checks and vector reprojection
//! - **warp**: raster reprojection (nearest / bilinear)
//! - **buffer**: metric buffers around points
//! - **select**: spatial predicate selection
//! - **aggregate**: point-in-polygon counts and per-area rates
//! - **pipeline**: JSON recipes chaining the stages above

pub mod aggregate;
pub mod buffer;
pub mod harmonize;
pub mod join;
pub mod measurements;
pub mod pipeline;
pub mod select;
pub mod warp;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{
        aggregate_count, AggregateParams, AreaUnit, BoundaryRule, CountPointsInPolygons,
    };
    pub use crate::buffer::{buffer, buffer_layer};
    pub use crate::harmonize::{ensure_same_crs, reproject_layer, require_same_crs};
    pub use crate::join::{attribute_join, join, AttributeJoin, DuplicateKeys, JoinParams};
    pub use crate::measurements::area;
    pub use crate::pipeline::{run, Recipe};
    pub use crate::select::{select_by_layer, select_by_predicate, SpatialPredicate};
    pub use crate::warp::{ensure_same_crs_raster, reproject_raster, Resampling, WarpParams};
    pub use geopipe_core::prelude::*;
}
