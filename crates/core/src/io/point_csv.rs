//! Point layers stored as delimited x/y tables
//!
//! Incident locations usually arrive as a spreadsheet export with a
//! longitude/latitude (or easting/northing) pair per row. The file carries no
//! CRS: the caller states it, or the layer is loaded without one and must be
//! annotated with `assign_crs` before any geometric comparison.

use super::{table::read_delimited, write_staged, VectorFormat, WriteOptions};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{Feature, GeometryKind, VectorLayer};
use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Options for reading and writing point CSV files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCsvOptions {
    /// Column holding x / longitude
    pub x_column: String,
    /// Column holding y / latitude
    pub y_column: String,
    pub delimiter: u8,
    /// CRS of the coordinates, if known
    pub crs: Option<CRS>,
    /// Layer name; defaults to the file stem
    pub name: Option<String>,
}

impl Default for PointCsvOptions {
    fn default() -> Self {
        Self {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            delimiter: b',',
            crs: None,
            name: None,
        }
    }
}

/// Read a point layer from a delimited file with x/y columns.
///
/// The remaining columns become attributes with inferred types.
pub fn read_point_csv<P: AsRef<Path>>(path: P, options: &PointCsvOptions) -> Result<VectorLayer> {
    let path = path.as_ref();
    let raw = read_delimited(path, options.delimiter)?;

    let find = |name: &str| {
        raw.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::schema(name, format!("does not exist in {}", path.display())))
    };
    let x_col = find(&options.x_column)?;
    let y_col = find(&options.y_column)?;

    let (schema, rows) = raw.typed_columns(&[x_col, y_col])?;

    let mut features = Vec::with_capacity(rows.len());
    for (n, (record, attributes)) in raw.records.iter().zip(rows).enumerate() {
        let coord = |col: usize, name: &str| {
            record[col].trim().parse::<f64>().map_err(|_| {
                Error::parse(
                    path.display(),
                    format!("row {}: {} value '{}' is not a number", n + 1, name, record[col]),
                )
            })
        };
        let x = coord(x_col, &options.x_column)?;
        let y = coord(y_col, &options.y_column)?;
        features.push(Feature::new(Geometry::Point(Point::new(x, y)), attributes));
    }

    let name = options.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "points".into())
    });
    let layer = VectorLayer::new(name, GeometryKind::Point, options.crs.clone(), schema, features)?;
    info!("loaded {} points from {}", layer.len(), path.display());
    Ok(layer)
}

/// Write a point layer as a delimited x/y table.
///
/// Fails with `UnsupportedGeometry` for anything but single points.
pub fn write_point_csv<P: AsRef<Path>>(
    layer: &VectorLayer,
    path: P,
    options: &PointCsvOptions,
    write_options: &WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    if !VectorFormat::PointCsv.can_represent(layer) {
        let kind = if layer.kind() == GeometryKind::Point {
            "multipoint".to_string()
        } else {
            layer.kind().to_string()
        };
        return Err(Error::UnsupportedGeometry {
            kind,
            format: VectorFormat::PointCsv.to_string(),
        });
    }
    for column in [&options.x_column, &options.y_column] {
        if layer.schema().index_of(column).is_some() {
            return Err(Error::schema(column.as_str(), "clashes with a coordinate column"));
        }
    }

    write_staged(path, write_options, |staged| {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .from_path(staged)?;

        let mut header = vec![options.x_column.as_str(), options.y_column.as_str()];
        header.extend(layer.schema().names());
        writer.write_record(&header)?;

        for feature in layer.iter() {
            if let Geometry::Point(p) = &feature.geometry {
                let mut record = vec![p.x().to_string(), p.y().to_string()];
                record.extend(feature.attributes.iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }
        }
        writer.flush()?;
        Ok(())
    })?;
    info!("saved {} points to {}", layer.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{AttributeValue, Schema};
    use geo_types::polygon;
    use std::io::Write;

    #[test]
    fn test_read_incidents() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "id,lon,lat,category").unwrap();
        writeln!(file, "1,-73.98,40.75,theft").unwrap();
        writeln!(file, "2,-73.95,40.78,assault").unwrap();
        file.flush().unwrap();

        let options = PointCsvOptions {
            x_column: "lon".into(),
            y_column: "lat".into(),
            crs: Some(CRS::wgs84()),
            ..Default::default()
        };
        let layer = read_point_csv(file.path(), &options).unwrap();

        assert_eq!(layer.len(), 2);
        assert_eq!(layer.schema().names(), vec!["id", "category"]);
        assert_eq!(layer.features()[0].geometry, Geometry::Point(Point::new(-73.98, 40.75)));
        assert_eq!(layer.value(1, "category").unwrap(), &AttributeValue::String("assault".into()));
        assert_eq!(layer.crs(), Some(&CRS::wgs84()));
    }

    #[test]
    fn test_missing_coordinate_column() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "id,lon").unwrap();
        writeln!(file, "1,2").unwrap();
        file.flush().unwrap();

        let err = read_point_csv(file.path(), &PointCsvOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Schema { ref column, .. } if column == "x"));
    }

    #[test]
    fn test_polygons_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.csv");
        let layer = VectorLayer::new(
            "tracts",
            GeometryKind::Polygon,
            None,
            Schema::default(),
            vec![Feature::new(
                Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]),
                vec![],
            )],
        )
        .unwrap();

        let err = write_point_csv(&layer, &path, &PointCsvOptions::default(), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedGeometry { ref kind, .. } if kind == "polygon"));
        assert!(!path.exists());
    }
}
