//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// Dimensions and transform are fixed at construction. Reprojection builds a
/// new raster; the only consuming update is [`Raster::assign_crs`].
///
/// ```ignore
/// use geopipe_core::{GeoTransform, Raster};
///
/// let raster = Raster::from_vec(vec![1u8; 6], 2, 3, GeoTransform::from_origin(0.0, 2.0, 1.0), None)?;
/// assert_eq!(raster.get(1, 2)?, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a raster filled with a single value
    pub fn filled(
        rows: usize,
        cols: usize,
        value: T,
        transform: GeoTransform,
        crs: Option<CRS>,
    ) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform,
            crs,
            nodata: None,
        }
    }

    /// Create a raster from row-major data
    pub fn from_vec(
        data: Vec<T>,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
        crs: Option<CRS>,
    ) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|_| Error::InvalidDimensions { width: cols, height: rows })?;

        Ok(Self {
            data,
            transform,
            crs,
            nodata: None,
        })
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            data,
            transform,
            crs,
            nodata: None,
        }
    }

    /// Declare the no-data value
    pub fn with_nodata(mut self, nodata: Option<T>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Declare the CRS of a raster loaded without one; coordinates are not changed.
    pub fn assign_crs(mut self, crs: CRS) -> Result<Self> {
        match &self.crs {
            None => {
                self.crs = Some(crs);
                Ok(self)
            }
            Some(current) if *current == crs => Ok(self),
            Some(current) => Err(Error::CrsAlreadyDefined {
                layer: "raster".into(),
                crs: current.to_string(),
            }),
        }
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    // Statistics

    /// Basic statistics over valid (non-nodata) cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;

        for v in self.data.iter().filter(|v| !self.is_nodata(**v)).filter_map(|v| v.to_f64()) {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }

        RasterStatistics {
            min: (count > 0).then_some(min),
            max: (count > 0).then_some(max),
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Raster<f32> {
        let data = (0..100).map(|v| v as f32).collect();
        Raster::from_vec(data, 10, 10, GeoTransform::from_origin(0.0, 10.0, 1.0), None).unwrap()
    }

    #[test]
    fn test_raster_creation() {
        let raster = ramp();
        assert_eq!(raster.shape(), (10, 10));
        assert_eq!(raster.get(5, 5).unwrap(), 55.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_from_vec_checks_length() {
        let err = Raster::from_vec(vec![0u8; 5], 2, 3, GeoTransform::default(), None).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { width: 3, height: 2 }));
    }

    #[test]
    fn test_raster_statistics_skip_nodata() {
        let raster = ramp().with_nodata(Some(0.0));
        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_assign_crs() {
        let raster = ramp().assign_crs(CRS::from_epsg(32618).unwrap()).unwrap();
        assert_eq!(raster.crs().and_then(|c| c.epsg()), Some(32618));
        assert!(raster.assign_crs(CRS::wgs84()).is_err());
    }
}
