//! Directory-based vector layer bundle
//!
//! ```text
//! tracts/
//!   layer.json      name, geometry kind, CRS, schema, feature count
//!   geometry.wkt    one WKT geometry per line, in feature order
//!   attributes.csv  header + one row per feature (omitted for empty schemas)
//! ```
//!
//! An empty cell is `Null`. Text cells holding an empty string are listed in
//! the manifest so they read back as text.

use super::{table::read_delimited, write_staged, WriteOptions};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, GeometryKind, Schema, VectorLayer};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};
use wkt::{ToWkt, TryFromWkt};

const MANIFEST: &str = "layer.json";
const GEOMETRY: &str = "geometry.wkt";
const ATTRIBUTES: &str = "attributes.csv";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    geometry: GeometryKind,
    crs: Option<CRS>,
    fields: Schema,
    feature_count: usize,
    /// `[row, column]` of cells holding empty text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    empty_text: Vec<[usize; 2]>,
}

/// Read a vector bundle directory
pub fn read_bundle<P: AsRef<Path>>(path: P) -> Result<VectorLayer> {
    let dir = path.as_ref();
    let manifest_path = dir.join(MANIFEST);
    let manifest: Manifest = serde_json::from_reader(BufReader::new(fs::File::open(&manifest_path)?))
        .map_err(|e| Error::parse(manifest_path.display(), e.to_string()))?;

    let geometries = read_geometries(&dir.join(GEOMETRY))?;
    if geometries.len() != manifest.feature_count {
        return Err(Error::parse(
            dir.join(GEOMETRY).display(),
            format!(
                "{} geometries for {} features declared in {}",
                geometries.len(),
                manifest.feature_count,
                MANIFEST
            ),
        ));
    }

    let mut rows = if manifest.fields.is_empty() {
        vec![Vec::new(); manifest.feature_count]
    } else {
        read_attributes(&dir.join(ATTRIBUTES), &manifest.fields, manifest.feature_count)?
    };
    for &[row, col] in &manifest.empty_text {
        let cell = rows.get_mut(row).and_then(|r| r.get_mut(col)).ok_or_else(|| {
            Error::parse(manifest_path.display(), format!("empty_text cell [{}, {}] out of range", row, col))
        })?;
        *cell = AttributeValue::String(String::new());
    }

    let features = geometries
        .into_iter()
        .zip(rows)
        .map(|(geometry, attributes)| Feature::new(geometry, attributes))
        .collect();

    let layer = VectorLayer::new(
        manifest.name,
        manifest.geometry,
        manifest.crs,
        manifest.fields,
        features,
    )?;
    info!(
        "loaded {} ({} {} features, CRS {})",
        dir.display(),
        layer.len(),
        layer.kind(),
        layer.crs().map(|c| c.to_string()).unwrap_or_else(|| "undefined".into())
    );
    Ok(layer)
}

fn read_geometries(path: &Path) -> Result<Vec<Geometry<f64>>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut geometries = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let geometry = Geometry::<f64>::try_from_wkt_str(line.trim())
            .map_err(|e| Error::parse(path.display(), format!("line {}: {}", n + 1, e)))?;
        geometries.push(geometry);
    }
    Ok(geometries)
}

fn read_attributes(path: &Path, schema: &Schema, expected: usize) -> Result<Vec<Vec<AttributeValue>>> {
    let raw = read_delimited(path, b',')?;
    if raw.headers != schema.names() {
        return Err(Error::schema(
            raw.headers.join(","),
            format!("header of {} does not match the declared fields", path.display()),
        ));
    }
    if raw.records.len() != expected {
        return Err(Error::parse(
            path.display(),
            format!("{} rows for {} features", raw.records.len(), expected),
        ));
    }

    raw.records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            schema
                .fields()
                .iter()
                .zip(record)
                .map(|(field, cell)| {
                    field.field_type.parse_cell(cell).ok_or_else(|| {
                        Error::parse(
                            path.display(),
                            format!("row {}: '{}' is not a valid {} for '{}'", row + 1, cell, field.field_type, field.name),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Write a layer as a bundle directory.
///
/// The bundle is written to a sibling staging directory and renamed into
/// place, so a failure leaves no partial output.
pub fn write_bundle<P: AsRef<Path>>(layer: &VectorLayer, path: P, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    write_staged(path, options, |staged| {
        fs::create_dir_all(staged)?;
        write_contents(layer, staged)
    })?;
    info!("saved {} features to {}", layer.len(), path.display());
    Ok(())
}

fn write_contents(layer: &VectorLayer, dir: &Path) -> Result<()> {
    let manifest = Manifest {
        name: layer.name().to_string(),
        geometry: layer.kind(),
        crs: layer.crs().cloned(),
        fields: layer.schema().clone(),
        feature_count: layer.len(),
        empty_text: empty_text_cells(layer),
    };
    let mut out = BufWriter::new(fs::File::create(dir.join(MANIFEST))?);
    serde_json::to_writer_pretty(&mut out, &manifest)?;
    out.flush()?;

    let mut out = BufWriter::new(fs::File::create(dir.join(GEOMETRY))?);
    for feature in layer.iter() {
        writeln!(out, "{}", feature.geometry.wkt_string())?;
    }
    out.flush()?;

    if !layer.schema().is_empty() {
        let mut writer = csv::Writer::from_path(dir.join(ATTRIBUTES))?;
        writer.write_record(layer.schema().names())?;
        for feature in layer.iter() {
            writer.write_record(feature.attributes.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
    }

    debug!("bundle contents written to {}", dir.display());
    Ok(())
}

fn empty_text_cells(layer: &VectorLayer) -> Vec<[usize; 2]> {
    let mut cells = Vec::new();
    for (row, feature) in layer.iter().enumerate() {
        for (col, value) in feature.attributes.iter().enumerate() {
            if matches!(value, AttributeValue::String(s) if s.is_empty()) {
                cells.push([row, col]);
            }
        }
    }
    cells
}
