//! Point-in-polygon aggregation
//!
//! Counts the points falling in each polygon group and derives a per-area
//! rate. Polygons sharing a value of the group key form one group: the count
//! and the area are taken over the whole group, and every member polygon
//! carries the group's figures.

use crate::harmonize::require_same_crs;
use crate::maybe_rayon::*;
use crate::measurements::area;
pub use crate::measurements::AreaUnit;
use crate::select::SpatialPredicate;
use geopipe_core::{
    Algorithm, AttributeValue, Error, Feature, Field, FieldType, GeometryKind, Result, VectorLayer,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// How a point on a boundary shared by several polygons is counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryRule {
    /// Counted in every polygon it intersects
    #[default]
    Inclusive,
    /// Counted only in the first polygon (layer order) covering it
    FirstMatch,
}

/// Parameters for point-in-polygon aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateParams {
    /// Output column holding the point count
    pub count_column: String,
    /// Output column holding count per unit area
    pub rate_column: String,
    pub area_unit: AreaUnit,
    pub boundary: BoundaryRule,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            count_column: "count".to_string(),
            rate_column: "rate".to_string(),
            area_unit: AreaUnit::SquareKilometers,
            boundary: BoundaryRule::Inclusive,
        }
    }
}

/// Point-in-polygon count stage grouped by a polygon attribute
#[derive(Debug, Clone)]
pub struct CountPointsInPolygons {
    pub group_key: String,
}

impl Algorithm for CountPointsInPolygons {
    /// (points, polygons)
    type Input = (VectorLayer, VectorLayer);
    type Output = VectorLayer;
    type Params = AggregateParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Count Points In Polygons"
    }

    fn description(&self) -> &'static str {
        "Count points per polygon group and compute a per-area rate"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (points, polygons) = input;
        aggregate_count(&points, &polygons, &self.group_key, &params)
    }
}

/// Count `points` per group of `polygons` and compute rates.
///
/// Returns one feature per polygon with its geometry and attributes plus
/// the count and rate columns. A group with zero area gets a `Null` rate.
///
/// # Errors
/// Checked in this order, before any geometry is evaluated:
/// - `Schema`: `group_key` missing from the polygons
/// - `UnsupportedGeometry`: inputs are not a point and a polygon layer
/// - `CrsUndefined` / `CrsMismatch`
/// - `Schema`: an output column already exists
/// - `InvalidParameter`: a metric area unit on a geographic CRS
pub fn aggregate_count(
    points: &VectorLayer,
    polygons: &VectorLayer,
    group_key: &str,
    params: &AggregateParams,
) -> Result<VectorLayer> {
    let key_col = polygons.schema().require(group_key)?;

    for (layer, kind) in [(points, GeometryKind::Point), (polygons, GeometryKind::Polygon)] {
        if layer.kind() != kind {
            return Err(Error::UnsupportedGeometry {
                kind: layer.kind().to_string(),
                format: format!("the {} input of point-in-polygon aggregation", kind),
            });
        }
    }

    let crs = require_same_crs(polygons, points)?;

    if params.count_column == params.rate_column {
        return Err(Error::schema(&params.count_column, "is used for both count and rate"));
    }
    for column in [&params.count_column, &params.rate_column] {
        if polygons.schema().index_of(column).is_some() {
            return Err(Error::schema(column.as_str(), "already exists in the polygon layer"));
        }
    }

    let factor = params.area_unit.factor(crs)?;

    let (group_of, group_count) = assign_groups(polygons, key_col);
    debug!("{} polygons in {} groups by '{}'", polygons.len(), group_count, group_key);

    // polygons hit by each point, in point order
    let hits: Vec<Vec<usize>> = points
        .features()
        .into_par_iter()
        .map(|point| -> Vec<usize> {
            let covering = polygons
                .iter()
                .enumerate()
                .filter(|(_, poly)| SpatialPredicate::Intersects.evaluate(&point.geometry, &poly.geometry))
                .map(|(i, _)| i);
            match params.boundary {
                BoundaryRule::Inclusive => covering.collect(),
                BoundaryRule::FirstMatch => covering.take(1).collect(),
            }
        })
        .collect();

    let mut counts = vec![0i64; group_count];
    let mut last_point = vec![usize::MAX; group_count];
    for (p, polys) in hits.iter().enumerate() {
        for &poly in polys {
            let group = group_of[poly];
            // a point counts once per group
            if last_point[group] != p {
                last_point[group] = p;
                counts[group] += 1;
            }
        }
    }

    let mut areas = vec![0.0f64; group_count];
    for (i, feature) in polygons.iter().enumerate() {
        areas[group_of[i]] += area(&feature.geometry) * factor;
    }

    let mut schema = polygons.schema().clone();
    schema.push(Field::new(params.count_column.clone(), FieldType::Integer))?;
    schema.push(Field::new(params.rate_column.clone(), FieldType::Real))?;

    let features = polygons
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let group = group_of[i];
            let count = counts[group];
            let rate = if areas[group] > 0.0 {
                AttributeValue::Float(count as f64 / areas[group])
            } else {
                AttributeValue::Null
            };
            let mut attributes = feature.attributes.clone();
            attributes.push(AttributeValue::Int(count));
            attributes.push(rate);
            Feature::new(feature.geometry.clone(), attributes)
        })
        .collect();

    let assigned: usize = hits.iter().filter(|h| !h.is_empty()).count();
    info!(
        "aggregated {} points ({} inside) into {} groups of '{}'",
        points.len(),
        assigned,
        group_count,
        polygons.name()
    );

    VectorLayer::new(polygons.name(), GeometryKind::Polygon, Some(crs.clone()), schema, features)
}

/// Group index per polygon. Polygons with a `Null` key form their own group.
fn assign_groups(polygons: &VectorLayer, key_col: usize) -> (Vec<usize>, usize) {
    let mut groups: HashMap<String, usize> = HashMap::new();
    let mut group_of = Vec::with_capacity(polygons.len());
    let mut next = 0usize;
    for feature in polygons.iter() {
        let group = match feature.attributes[key_col].join_key() {
            Some(key) => *groups.entry(key).or_insert(next),
            None => next,
        };
        if group == next {
            next += 1;
        }
        group_of.push(group);
    }
    (group_of, next)
}
