//! CRS harmonization for vector layers
//!
//! Every geometric comparison first calls [`require_same_crs`]. Reprojection
//! ([`reproject_layer`]) transforms coordinates; it is never implied by
//! `VectorLayer::assign_crs`, which only declares a missing CRS.

use geopipe_core::{Error, Feature, Result, Transformer, VectorLayer, CRS};
use tracing::{debug, info};

/// Check that two layers declare the same CRS and return it.
///
/// # Errors
/// `CrsUndefined` naming the layer without a CRS, or `CrsMismatch` naming both.
pub fn require_same_crs<'a>(a: &'a VectorLayer, b: &VectorLayer) -> Result<&'a CRS> {
    let left = a.require_crs()?;
    let right = b.require_crs()?;
    check_pair(left, right)?;
    Ok(left)
}

pub(crate) fn check_pair(left: &CRS, right: &CRS) -> Result<()> {
    if left != right {
        return Err(Error::CrsMismatch {
            left: left.to_string(),
            right: right.to_string(),
        });
    }
    Ok(())
}

/// Reproject every coordinate of `layer` into `target`.
///
/// Returns a copy when the layer is already in `target`.
pub fn reproject_layer(layer: &VectorLayer, target: &CRS) -> Result<VectorLayer> {
    let source = layer.require_crs()?;
    if source == target {
        debug!("'{}' already in {}", layer.name(), target);
        return Ok(layer.clone());
    }

    let transformer = Transformer::new(source, target)?;
    let features = layer
        .iter()
        .map(|f| {
            Ok(Feature::new(
                transformer.transform_geometry(&f.geometry)?,
                f.attributes.clone(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("reprojected '{}' ({} features): {} -> {}", layer.name(), layer.len(), source, target);
    VectorLayer::new(
        layer.name(),
        layer.kind(),
        Some(target.clone()),
        layer.schema().clone(),
        features,
    )
}

/// Bring `b` into the CRS of `a`.
///
/// `a` is returned unchanged; `b` is reprojected when the CRSs differ.
pub fn ensure_same_crs(a: &VectorLayer, b: &VectorLayer) -> Result<(VectorLayer, VectorLayer)> {
    let target = a.require_crs()?;
    b.require_crs()?;
    Ok((a.clone(), reproject_layer(b, target)?))
}
