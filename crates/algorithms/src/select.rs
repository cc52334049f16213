//! Selection by spatial predicate
//!
//! Predicates are evaluated by `geo`'s DE-9IM relate. Bounding rectangles
//! are compared first; the shortcut only ever decides pairs whose envelopes
//! do not meet, which cannot intersect, so it never drops a true positive.

use crate::harmonize::{check_pair, require_same_crs};
use crate::maybe_rayon::*;
use geo::{BoundingRect, Geometry, Intersects, Relate};
use geopipe_core::{Error, Feature, Result, VectorLayer, CRS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Binary spatial predicate `candidate <predicate> reference`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialPredicate {
    #[default]
    Intersects,
    /// Candidate lies inside the reference
    Within,
    /// Candidate contains the reference
    Contains,
    /// Boundaries meet, interiors do not
    Touches,
    Disjoint,
}

impl SpatialPredicate {
    /// Evaluate `a <predicate> b`
    pub fn evaluate(self, a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
        let envelopes_meet = match (a.bounding_rect(), b.bounding_rect()) {
            (Some(ra), Some(rb)) => ra.intersects(&rb),
            _ => false,
        };
        if !envelopes_meet {
            return self == SpatialPredicate::Disjoint;
        }

        let matrix = a.relate(b);
        match self {
            SpatialPredicate::Intersects => matrix.is_intersects(),
            SpatialPredicate::Within => matrix.is_within(),
            SpatialPredicate::Contains => matrix.is_contains(),
            SpatialPredicate::Touches => matrix.is_touches(),
            SpatialPredicate::Disjoint => matrix.is_disjoint(),
        }
    }
}

impl fmt::Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpatialPredicate::Intersects => "intersects",
            SpatialPredicate::Within => "within",
            SpatialPredicate::Contains => "contains",
            SpatialPredicate::Touches => "touches",
            SpatialPredicate::Disjoint => "disjoint",
        };
        f.write_str(name)
    }
}

impl FromStr for SpatialPredicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "intersects" => Ok(SpatialPredicate::Intersects),
            "within" => Ok(SpatialPredicate::Within),
            "contains" => Ok(SpatialPredicate::Contains),
            "touches" => Ok(SpatialPredicate::Touches),
            "disjoint" => Ok(SpatialPredicate::Disjoint),
            _ => Err(Error::InvalidParameter {
                name: "predicate",
                value: s.to_string(),
                reason: "expected intersects, within, contains, touches or disjoint".into(),
            }),
        }
    }
}

/// Keep the candidates for which `predicate(candidate, reference)` holds.
///
/// The CRS check runs before any geometry is looked at. Output order is
/// candidate order.
pub fn select_by_predicate(
    candidates: &VectorLayer,
    reference: &Geometry<f64>,
    reference_crs: &CRS,
    predicate: SpatialPredicate,
) -> Result<VectorLayer> {
    check_pair(candidates.require_crs()?, reference_crs)?;

    let mask: Vec<bool> = candidates
        .features()
        .into_par_iter()
        .map(|f| predicate.evaluate(&f.geometry, reference))
        .collect();

    finish(candidates, mask, predicate)
}

/// Keep the candidates matching `predicate` against any feature of
/// `reference` (for `Disjoint`: against every feature).
pub fn select_by_layer(
    candidates: &VectorLayer,
    reference: &VectorLayer,
    predicate: SpatialPredicate,
) -> Result<VectorLayer> {
    require_same_crs(candidates, reference)?;

    let mask: Vec<bool> = candidates
        .features()
        .into_par_iter()
        .map(|f| {
            let mut hits = reference.iter().map(|r| predicate.evaluate(&f.geometry, &r.geometry));
            if predicate == SpatialPredicate::Disjoint {
                hits.all(|h| h)
            } else {
                hits.any(|h| h)
            }
        })
        .collect();

    finish(candidates, mask, predicate)
}

fn finish(candidates: &VectorLayer, mask: Vec<bool>, predicate: SpatialPredicate) -> Result<VectorLayer> {
    let selected: Vec<Feature> = candidates
        .iter()
        .zip(mask)
        .filter(|(_, keep)| *keep)
        .map(|(f, _)| f.clone())
        .collect();

    info!(
        "selected {} of {} features of '{}' ({})",
        selected.len(),
        candidates.len(),
        candidates.name(),
        predicate
    );
    VectorLayer::new(
        candidates.name(),
        candidates.kind(),
        candidates.crs().cloned(),
        candidates.schema().clone(),
        selected,
    )
}
