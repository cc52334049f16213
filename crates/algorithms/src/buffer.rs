//! Buffer operations
//!
//! Buffer zones around features, with the radius in the linear unit of the
//! layer CRS. Points become circles approximated by regular polygons; lines
//! and polygons are buffered as the union of circles at their vertices,
//! rectangles along their segments and (for polygons) their own area.
//! Angular (geographic) systems are refused since a radius in degrees is not
//! a distance.

use geo::orient::Direction;
use geo::{unary_union, Coord, Geometry, Line, LineString, MultiPolygon, Orient, Point, Polygon};
use geopipe_core::{Error, Feature, GeometryKind, Result, VectorLayer, CRS};
use std::f64::consts::PI;
use tracing::info;

/// Vertices of the polygon approximating a circle
const SEGMENTS: usize = 64;

fn check_radius(radius: f64) -> Result<()> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: radius.to_string(),
            reason: "must be a positive distance".into(),
        });
    }
    Ok(())
}

fn check_linear(crs: &CRS) -> Result<()> {
    if crs.linear_unit_meters().is_none() {
        return Err(Error::InvalidParameter {
            name: "crs",
            value: crs.to_string(),
            reason: "buffer radius needs a projected CRS with a linear unit; reproject first".into(),
        });
    }
    Ok(())
}

/// Counter-clockwise regular polygon inscribed in the circle
fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..SEGMENTS)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / SEGMENTS as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::new(ring), vec![])
}

/// Counter-clockwise rectangle of half-width `radius` around a segment
fn segment_band(line: Line<f64>, radius: f64) -> Option<Polygon<f64>> {
    let (dx, dy) = (line.dx(), line.dy());
    let length = dx.hypot(dy);
    if length == 0.0 {
        return None;
    }
    let n = Coord {
        x: -dy / length * radius,
        y: dx / length * radius,
    };
    let (a, b) = (line.start, line.end);
    Some(Polygon::new(LineString::new(vec![a - n, b - n, b + n, a + n, a - n]), vec![]))
}

fn ring_pieces(ring: &LineString<f64>, radius: f64, pieces: &mut Vec<Polygon<f64>>) {
    pieces.extend(ring.coords().map(|&c| circle(c, radius)));
    pieces.extend(ring.lines().filter_map(|l| segment_band(l, radius)));
}

fn polygon_pieces(polygon: &Polygon<f64>, radius: f64, pieces: &mut Vec<Polygon<f64>>) {
    pieces.push(polygon.orient(Direction::Default));
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        ring_pieces(ring, radius, pieces);
    }
}

fn collect_pieces(geometry: &Geometry<f64>, radius: f64, pieces: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Point(p) => pieces.push(circle(p.0, radius)),
        Geometry::MultiPoint(mp) => pieces.extend(mp.iter().map(|p| circle(p.0, radius))),
        Geometry::Line(l) => ring_pieces(&LineString::new(vec![l.start, l.end]), radius, pieces),
        Geometry::LineString(ls) => ring_pieces(ls, radius, pieces),
        Geometry::MultiLineString(mls) => mls.iter().for_each(|ls| ring_pieces(ls, radius, pieces)),
        Geometry::Polygon(p) => polygon_pieces(p, radius, pieces),
        Geometry::MultiPolygon(mp) => mp.iter().for_each(|p| polygon_pieces(p, radius, pieces)),
        Geometry::Rect(r) => polygon_pieces(&r.to_polygon(), radius, pieces),
        Geometry::Triangle(t) => polygon_pieces(&t.to_polygon(), radius, pieces),
        Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| collect_pieces(g, radius, pieces)),
    }
}

/// Area within `radius` of any part of `geometry`
fn buffer_geometry(geometry: &Geometry<f64>, radius: f64) -> MultiPolygon<f64> {
    if let Geometry::Point(p) = geometry {
        return MultiPolygon::new(vec![circle(p.0, radius)]);
    }
    let mut pieces = Vec::new();
    collect_pieces(geometry, radius, &mut pieces);
    unary_union(&pieces)
}

/// Circular buffer of `radius` CRS units around a point.
///
/// # Errors
/// `InvalidParameter` for a non-positive radius or an angular CRS.
pub fn buffer(point: &Point<f64>, radius: f64, crs: &CRS) -> Result<Polygon<f64>> {
    check_radius(radius)?;
    check_linear(crs)?;
    Ok(circle(point.0, radius))
}

/// Buffer every feature of a layer, keeping attributes and CRS.
///
/// The result is a polygon layer; buffers that split into several parts are
/// stored as multipolygons.
pub fn buffer_layer(layer: &VectorLayer, radius: f64) -> Result<VectorLayer> {
    check_radius(radius)?;
    check_linear(layer.require_crs()?)?;

    let features = layer
        .iter()
        .map(|f| {
            let mut parts = buffer_geometry(&f.geometry, radius);
            let geometry = if parts.0.len() == 1 {
                Geometry::Polygon(parts.0.remove(0))
            } else {
                Geometry::MultiPolygon(parts)
            };
            Feature::new(geometry, f.attributes.clone())
        })
        .collect();

    info!("buffered {} features of '{}' by {}", layer.len(), layer.name(), radius);
    VectorLayer::new(
        layer.name(),
        GeometryKind::Polygon,
        layer.crs().cloned(),
        layer.schema().clone(),
        features,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::area;
    use geo::{line_string, polygon, Contains, Relate};
    use geopipe_core::{AttributeValue, Field, FieldType, Schema};
    use std::f64::consts::PI;

    fn utm() -> CRS {
        CRS::from_epsg(32618).unwrap()
    }

    #[test]
    fn test_buffer_point_circle() {
        let center = Point::new(583_000.0, 4_507_000.0);
        let circle = buffer(&center, 100.0, &utm()).unwrap();

        let expected = PI * 100.0 * 100.0;
        let actual = area(&Geometry::Polygon(circle.clone()));
        assert!((actual - expected).abs() / expected < 0.05, "area {actual}");
        assert!(circle.contains(&center));
        assert!(circle.relate(&Point::new(583_095.0, 4_507_000.0)).is_intersects());
        assert!(!circle.relate(&Point::new(583_105.0, 4_507_000.0)).is_intersects());
    }

    #[test]
    fn test_buffer_rejects_geographic_crs() {
        let err = buffer(&Point::new(-73.98, 40.75), 0.01, &CRS::wgs84()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "crs", .. }));
    }

    #[test]
    fn test_buffer_rejects_bad_radius() {
        for radius in [0.0, -5.0, f64::NAN] {
            let err = buffer(&Point::new(0.0, 0.0), radius, &utm()).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { name: "radius", .. }));
        }
    }

    #[test]
    fn test_buffer_layer_keeps_attributes() {
        let schema = Schema::new(vec![Field::new("id", FieldType::Integer)]).unwrap();
        let stations = VectorLayer::new(
            "stations",
            GeometryKind::Point,
            Some(utm()),
            schema,
            vec![
                Feature::new(Geometry::Point(Point::new(0.0, 0.0)), vec![AttributeValue::Int(1)]),
                Feature::new(Geometry::Point(Point::new(500.0, 0.0)), vec![AttributeValue::Int(2)]),
            ],
        )
        .unwrap();

        let zones = buffer_layer(&stations, 50.0).unwrap();
        assert_eq!(zones.kind(), GeometryKind::Polygon);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.value(1, "id").unwrap(), &AttributeValue::Int(2));
        assert_eq!(zones.crs(), Some(&utm()));
    }

    #[test]
    fn test_buffer_polygon_grows_by_radius() {
        let square = Geometry::Polygon(geo::polygon![
            (x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0),
        ]);
        let grown = buffer_geometry(&square, 10.0);
        assert_eq!(grown.0.len(), 1);

        // square + four side bands + rounded corners
        let expected = 100.0 * 100.0 + 4.0 * 100.0 * 10.0 + PI * 10.0 * 10.0;
        let actual = area(&Geometry::MultiPolygon(grown.clone()));
        assert!((actual - expected).abs() / expected < 0.01, "area {actual}");
        assert!(grown.contains(&Point::new(50.0, 50.0)));
        assert!(grown.contains(&Point::new(-9.0, 50.0)));
        assert!(!grown.contains(&Point::new(-11.0, 50.0)));
    }

    #[test]
    fn test_buffer_line_string() {
        let road = Geometry::LineString(geo::line_string![(x: 0.0, y: 0.0), (x: 200.0, y: 0.0)]);
        let corridor = buffer_geometry(&road, 5.0);
        assert!(corridor.contains(&Point::new(100.0, 4.5)));
        assert!(!corridor.contains(&Point::new(100.0, 5.5)));
        assert!(corridor.contains(&Point::new(-4.5, 0.0)));
    }
}
