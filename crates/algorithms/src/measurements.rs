//! Areal measurements and unit conversion

use geo::{Area as GeoArea, Geometry};
use geopipe_core::{Error, Result, CRS};
use serde::{Deserialize, Serialize};

/// Unsigned planar area of a geometry in CRS units squared.
///
/// Points and lines have zero area. For a geographic CRS this is square
/// degrees; reproject to a metric CRS first.
pub fn area(geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Polygon(p) => p.unsigned_area(),
        Geometry::MultiPolygon(mp) => mp.unsigned_area(),
        Geometry::Rect(r) => r.unsigned_area(),
        Geometry::Triangle(t) => t.unsigned_area(),
        _ => 0.0,
    }
}

/// Unit in which areas (and per-area rates) are expressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    /// Square CRS units, no conversion
    Native,
    SquareMeters,
    Hectares,
    #[default]
    SquareKilometers,
    SquareMiles,
}

impl AreaUnit {
    fn square_meters(self) -> Option<f64> {
        match self {
            AreaUnit::Native => None,
            AreaUnit::SquareMeters => Some(1.0),
            AreaUnit::Hectares => Some(1.0e4),
            AreaUnit::SquareKilometers => Some(1.0e6),
            AreaUnit::SquareMiles => Some(1609.344 * 1609.344),
        }
    }

    /// Factor converting an area in `crs` units squared into this unit.
    ///
    /// # Errors
    /// `InvalidParameter` for a metric unit on a CRS without a linear unit
    /// (geographic systems).
    pub fn factor(self, crs: &CRS) -> Result<f64> {
        let Some(unit_area) = self.square_meters() else {
            return Ok(1.0);
        };
        let meters = crs.linear_unit_meters().ok_or_else(|| Error::InvalidParameter {
            name: "area_unit",
            value: format!("{:?}", self),
            reason: format!("{} has no linear unit; reproject to a projected CRS or use native units", crs),
        })?;
        Ok(meters * meters / unit_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{point, polygon, LineString};

    #[test]
    fn test_area_of_square() {
        let square = polygon![
            (x: 0.0, y: 0.0), (x: 1000.0, y: 0.0), (x: 1000.0, y: 1000.0), (x: 0.0, y: 1000.0),
        ];
        assert_relative_eq!(area(&Geometry::Polygon(square)), 1.0e6);
        assert_eq!(area(&Geometry::Point(point!(x: 1.0, y: 1.0))), 0.0);
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(area(&Geometry::LineString(line)), 0.0);
    }

    #[test]
    fn test_unit_factors() {
        let utm = CRS::from_epsg(32618).unwrap();
        assert_relative_eq!(AreaUnit::SquareKilometers.factor(&utm).unwrap(), 1.0e-6);
        assert_relative_eq!(AreaUnit::Hectares.factor(&utm).unwrap(), 1.0e-4);
        assert_relative_eq!(AreaUnit::Native.factor(&CRS::wgs84()).unwrap(), 1.0);

        let feet = CRS::from_proj("+proj=tmerc +lat_0=0 +lon_0=-75 +k=1 +x_0=0 +y_0=0 +ellps=GRS80 +units=ft").unwrap();
        assert_relative_eq!(AreaUnit::SquareMeters.factor(&feet).unwrap(), 0.3048 * 0.3048);
    }

    #[test]
    fn test_metric_unit_on_geographic_crs() {
        let err = AreaUnit::SquareKilometers.factor(&CRS::wgs84()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "area_unit", .. }));
    }
}
