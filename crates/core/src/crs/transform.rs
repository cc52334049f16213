//! Coordinate transformation between two CRSs (delegated to proj4rs).

use super::CRS;
use crate::error::{Error, Result};
use geo::MapCoords;
use geo_types::{Coord, Geometry};
use proj4rs::proj::Proj;
use std::fmt;

/// A source → target projection pair.
///
/// Geographic coordinates are exchanged in degrees (x = longitude,
/// y = latitude); proj4rs itself works in radians.
pub struct Transformer {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
    label: String,
}

impl Transformer {
    pub fn new(source: &CRS, target: &CRS) -> Result<Self> {
        Ok(Self {
            source: source.to_proj()?,
            target: target.to_proj()?,
            source_geographic: source.is_geographic(),
            target_geographic: target.is_geographic(),
            label: format!("{} -> {}", source, target),
        })
    }

    /// Transform a single coordinate pair
    pub fn transform_xy(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            Error::Projection(format!("{}: cannot transform ({}, {}): {}", self.label, x, y, e))
        })?;

        let (mut tx, mut ty) = (point.0, point.1);
        if self.target_geographic {
            tx = tx.to_degrees();
            ty = ty.to_degrees();
        }
        if !tx.is_finite() || !ty.is_finite() {
            return Err(Error::Projection(format!(
                "{}: ({}, {}) is outside the projection domain",
                self.label, x, y
            )));
        }
        Ok((tx, ty))
    }

    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self.transform_xy(coord.x, coord.y)?;
        Ok(Coord { x, y })
    }

    /// Transform every coordinate tuple of a geometry
    pub fn transform_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|c| self.transform_coord(c))
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer").field("path", &self.label).finish()
    }
}
