//! Raster reprojection
//!
//! Inverse mapping: the target extent is found by transforming densified
//! source edges, then every target cell centre is mapped back into the
//! source grid and sampled. Cells that land outside the source, or whose
//! inputs are nodata, become nodata.

use geopipe_core::{Error, GeoTransform, Raster, RasterElement, Result, Transformer, VectorLayer, CRS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Resampling method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Nearest neighbour; keeps categorical values intact
    #[default]
    Nearest,
    /// Bilinear interpolation of the four surrounding cell centres
    Bilinear,
}

/// Parameters for raster reprojection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpParams {
    pub resampling: Resampling,
    /// Output cell size in target CRS units; derived from the source when `None`
    pub cell_size: Option<f64>,
}

/// Points sampled along each source edge when computing the target extent
const EDGE_SAMPLES: usize = 20;

/// Reproject a raster into `target`.
///
/// The source raster is not modified. Returns a copy when it is already in
/// `target`.
pub fn reproject_raster<T: RasterElement>(
    raster: &Raster<T>,
    target: &CRS,
    params: &WarpParams,
) -> Result<Raster<T>> {
    let source = raster.crs().ok_or_else(|| Error::CrsUndefined {
        layer: "raster".into(),
    })?;
    if let Some(cell) = params.cell_size {
        if !(cell.is_finite() && cell > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: cell.to_string(),
                reason: "must be a positive number".into(),
            });
        }
    }
    if source == target {
        debug!("raster already in {}", target);
        return Ok(raster.clone());
    }
    let (rows, cols) = raster.shape();
    if raster.is_empty() {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let forward = Transformer::new(source, target)?;
    let inverse = Transformer::new(target, source)?;

    let (min_x, min_y, max_x, max_y) = target_extent(raster, &forward)?;
    let cell = params.cell_size.unwrap_or_else(|| {
        // keep the pixel count along the diagonal
        let source_diagonal = ((rows * rows + cols * cols) as f64).sqrt();
        (max_x - min_x).hypot(max_y - min_y) / source_diagonal
    });
    let out_cols = ((max_x - min_x) / cell).ceil().max(1.0) as usize;
    let out_rows = ((max_y - min_y) / cell).ceil().max(1.0) as usize;
    let transform = GeoTransform::from_origin(min_x, max_y, cell);

    let nodata = fill_value(raster)?;
    let mut data = Vec::with_capacity(out_rows * out_cols);
    for row in 0..out_rows {
        for col in 0..out_cols {
            let (x, y) = transform.pixel_to_geo(col, row);
            let value = inverse
                .transform_xy(x, y)
                .ok()
                .and_then(|(sx, sy)| sample(raster, sx, sy, params.resampling));
            data.push(value.unwrap_or(nodata));
        }
    }

    info!(
        "warped raster {} x {} ({}) -> {} x {} ({}), cell {:.6}, {:?}",
        cols, rows, source, out_cols, out_rows, target, cell, params.resampling
    );
    Ok(Raster::from_vec(data, out_rows, out_cols, transform, Some(target.clone()))?.with_nodata(Some(nodata)))
}

/// Reproject `raster` into the CRS of `layer`.
pub fn ensure_same_crs_raster<T: RasterElement>(
    layer: &VectorLayer,
    raster: &Raster<T>,
    params: &WarpParams,
) -> Result<Raster<T>> {
    reproject_raster(raster, layer.require_crs()?, params)
}

/// Value written to cells with no source data: the declared nodata, else the
/// type's default nodata or the first value above it that no source cell holds.
fn fill_value<T: RasterElement>(raster: &Raster<T>) -> Result<T> {
    if let Some(nodata) = raster.nodata() {
        return Ok(nodata);
    }
    let default = T::default_nodata();
    let start = match default.to_f64() {
        Some(d) if !d.is_nan() => d,
        // NaN never collides with a value
        _ => return Ok(default),
    };

    let mut used: Vec<f64> = raster.data().iter().filter_map(|&v| v.to_f64()).collect();
    used.sort_by(f64::total_cmp);
    used.dedup();

    let mut candidate = start;
    for &v in used.iter().skip_while(|&&v| v < start) {
        if v != candidate {
            break;
        }
        candidate += 1.0;
    }
    match T::from_f64(candidate) {
        Some(fill) if fill.to_f64() == Some(candidate) => {
            debug!("no declared nodata; filling with unused value {}", candidate);
            Ok(fill)
        }
        _ => Err(Error::InvalidParameter {
            name: "nodata",
            value: "none".into(),
            reason: "every value of the cell type occurs in the raster; declare a nodata value".into(),
        }),
    }
}

fn target_extent<T: RasterElement>(
    raster: &Raster<T>,
    forward: &Transformer,
) -> Result<(f64, f64, f64, f64)> {
    let (rows, cols) = (raster.rows() as f64, raster.cols() as f64);
    let gt = raster.transform();

    let mut extent = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        for (col, row) in [(t * cols, 0.0), (t * cols, rows), (0.0, t * rows), (cols, t * rows)] {
            let (x, y) = gt.apply(col, row);
            if let Ok((tx, ty)) = forward.transform_xy(x, y) {
                extent = (extent.0.min(tx), extent.1.min(ty), extent.2.max(tx), extent.3.max(ty));
            }
        }
    }

    if !(extent.0 < extent.2 && extent.1 < extent.3) {
        return Err(Error::Projection(
            "raster extent cannot be represented in the target CRS".into(),
        ));
    }
    Ok(extent)
}

/// Sample the source raster at source-CRS coordinates.
fn sample<T: RasterElement>(raster: &Raster<T>, x: f64, y: f64, resampling: Resampling) -> Option<T> {
    let (rows, cols) = raster.shape();
    let (col_f, row_f) = raster.geo_to_pixel(x, y);
    if !(col_f >= 0.0 && row_f >= 0.0 && col_f < cols as f64 && row_f < rows as f64) {
        return None;
    }

    let valid = |row: usize, col: usize| {
        raster.get(row, col).ok().filter(|v| !raster.is_nodata(*v))
    };

    match resampling {
        Resampling::Nearest => valid(row_f as usize, col_f as usize),
        Resampling::Bilinear => {
            // positions relative to cell centres, clamped at the edges
            let cx = (col_f - 0.5).clamp(0.0, (cols - 1) as f64);
            let cy = (row_f - 0.5).clamp(0.0, (rows - 1) as f64);
            let (c0, r0) = (cx.floor() as usize, cy.floor() as usize);
            let (c1, r1) = ((c0 + 1).min(cols - 1), (r0 + 1).min(rows - 1));
            let (fx, fy) = (cx - c0 as f64, cy - r0 as f64);

            let v00 = valid(r0, c0)?.to_f64()?;
            let v01 = valid(r0, c1)?.to_f64()?;
            let v10 = valid(r1, c0)?.to_f64()?;
            let v11 = valid(r1, c1)?.to_f64()?;

            let top = v00 * (1.0 - fx) + v01 * fx;
            let bottom = v10 * (1.0 - fx) + v11 * fx;
            T::from_f64(top * (1.0 - fy) + bottom * fy)
        }
    }
}
