//! End-to-end workflow: load, join, harmonize, aggregate, write.
//!
//! Census tracts in UTM 18N, incident reports in longitude/latitude.

use approx::assert_relative_eq;
use geo_types::{polygon, Geometry, Point};
use geopipe_algorithms::pipeline::{run, Recipe};
use geopipe_algorithms::prelude::*;
use geopipe_core::io::{read_bundle, read_point_csv, read_table, write_bundle, PointCsvOptions};
use std::fs;
use std::io::Write;
use std::path::Path;

const X0: f64 = 583_000.0;
const Y0: f64 = 4_507_000.0;

fn utm() -> CRS {
    CRS::from_epsg(32618).unwrap()
}

fn rect(x0: f64, x1: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: X0 + x0, y: Y0), (x: X0 + x1, y: Y0), (x: X0 + x1, y: Y0 + 1000.0), (x: X0 + x0, y: Y0 + 1000.0),
    ])
}

/// Tracts of 1.0, 2.0 and 0.5 km²
fn tracts() -> VectorLayer {
    let schema = Schema::new(vec![Field::new("GEOID", FieldType::Text)]).unwrap();
    let features = vec![
        Feature::new(rect(0.0, 1000.0), vec!["A".into()]),
        Feature::new(rect(1000.0, 3000.0), vec!["B".into()]),
        Feature::new(rect(3000.0, 3500.0), vec!["D".into()]),
    ];
    VectorLayer::new("tracts", GeometryKind::Polygon, Some(utm()), schema, features).unwrap()
}

/// Two incidents in A, three in B, none in D; written as lon/lat
fn write_incidents(path: &Path) {
    let to_wgs84 = Transformer::new(&utm(), &CRS::wgs84()).unwrap();
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "report,lon,lat").unwrap();
    for (i, (dx, dy)) in [(200.0, 300.0), (800.0, 700.0), (1200.0, 500.0), (2000.0, 100.0), (2800.0, 900.0)]
        .iter()
        .enumerate()
    {
        let (lon, lat) = to_wgs84.transform_xy(X0 + dx, Y0 + dy).unwrap();
        writeln!(file, "{},{},{}", i + 1, lon, lat).unwrap();
    }
}

fn write_census(path: &Path) {
    fs::write(path, "geoid,population\nA,1200\nB,3400\nC,999\n").unwrap();
}

#[test]
fn test_manual_workflow() {
    let dir = tempfile::tempdir().unwrap();
    write_incidents(&dir.path().join("incidents.csv"));
    write_census(&dir.path().join("census.csv"));

    let options = PointCsvOptions {
        x_column: "lon".into(),
        y_column: "lat".into(),
        crs: Some(CRS::wgs84()),
        ..Default::default()
    };
    let incidents = read_point_csv(dir.path().join("incidents.csv"), &options).unwrap();
    let census = read_table(dir.path().join("census.csv"), b',').unwrap();

    let joined = join(&tracts(), &census, "GEOID", "geoid").unwrap();
    assert_eq!(joined.len(), 3);
    assert_eq!(joined.value(2, "population").unwrap(), &AttributeValue::Null);

    // comparing before harmonizing is refused
    let err = aggregate_count(&incidents, &joined, "GEOID", &AggregateParams::default()).unwrap_err();
    assert!(matches!(err, Error::CrsMismatch { .. }));

    let (joined, incidents) = ensure_same_crs(&joined, &incidents).unwrap();
    let density = aggregate_count(&incidents, &joined, "GEOID", &AggregateParams::default()).unwrap();

    let rates: Vec<f64> = (0..3)
        .map(|i| density.value(i, "rate").unwrap().as_f64().unwrap())
        .collect();
    assert_relative_eq!(rates[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(rates[1], 1.5, epsilon = 1e-9);
    assert_relative_eq!(rates[2], 0.0);

    let out = dir.path().join("density");
    write_bundle(&density, &out, &WriteOptions::default()).unwrap();
    let back = read_bundle(&out).unwrap();
    assert_eq!(back.schema().names(), vec!["GEOID", "population", "count", "rate"]);
    assert_eq!(back.crs(), Some(&utm()));
    assert_eq!(back.value(1, "count").unwrap(), &AttributeValue::Int(3));
}

#[test]
fn test_recipe_workflow() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&tracts(), dir.path().join("tracts"), &WriteOptions::default()).unwrap();
    write_incidents(&dir.path().join("incidents.csv"));
    write_census(&dir.path().join("census.csv"));

    let recipe_path = dir.path().join("recipe.json");
    fs::write(
        &recipe_path,
        r#"{
            "steps": [
                { "op": "load_bundle", "name": "tracts", "path": "tracts" },
                { "op": "load_points", "name": "incidents", "path": "incidents.csv",
                  "options": { "x_column": "lon", "y_column": "lat", "crs": "EPSG:4326" } },
                { "op": "load_table", "name": "census", "path": "census.csv" },
                { "op": "join", "layer": "tracts", "table": "census",
                  "layer_key": "GEOID", "table_key": "geoid" },
                { "op": "reproject", "layer": "incidents", "crs": "EPSG:32618" },
                { "op": "aggregate", "points": "incidents", "polygons": "tracts",
                  "group_key": "GEOID", "output": "density",
                  "params": { "area_unit": "hectares" } },
                { "op": "buffer", "layer": "incidents", "radius": 50.0, "output": "zones" },
                { "op": "write", "layer": "density", "path": "out/density" },
                { "op": "write", "layer": "incidents", "path": "out/incidents.csv", "format": "point-csv" }
            ]
        }"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();

    let recipe = Recipe::from_path(&recipe_path).unwrap();
    let ws = run(&recipe).unwrap();

    let density = ws.layer("density").unwrap();
    // 2 incidents per km² is 0.02 per hectare
    assert_relative_eq!(density.value(0, "rate").unwrap().as_f64().unwrap(), 0.02, epsilon = 1e-12);
    assert_eq!(ws.layer("zones").unwrap().kind(), GeometryKind::Polygon);

    let written = read_bundle(dir.path().join("out/density")).unwrap();
    assert_eq!(written.len(), 3);

    let points = read_point_csv(dir.path().join("out/incidents.csv"), &PointCsvOptions::default()).unwrap();
    assert_eq!(points.len(), 5);
    assert!(points.crs().is_none());

    // the same recipe again refuses to overwrite its outputs
    let err = run(&recipe).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
}

#[test]
fn test_assign_then_select() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.csv");
    fs::write(&path, format!("x,y\n{},{}\n{},{}\n", X0 + 500.0, Y0 + 500.0, X0 + 9000.0, Y0 + 500.0)).unwrap();

    let raw = read_point_csv(&path, &PointCsvOptions::default()).unwrap();
    let err = select_by_layer(&raw, &tracts(), SpatialPredicate::Within).unwrap_err();
    assert!(matches!(err, Error::CrsUndefined { .. }));

    let located = raw.assign_crs(utm()).unwrap();
    let inside = select_by_layer(&located, &tracts(), SpatialPredicate::Within).unwrap();
    assert_eq!(inside.len(), 1);
    assert_eq!(inside.features()[0].geometry, Geometry::Point(Point::new(X0 + 500.0, Y0 + 500.0)));

    // a second, different annotation is refused
    let err = inside.assign_crs(CRS::wgs84()).unwrap_err();
    assert!(matches!(err, Error::CrsAlreadyDefined { .. }));
}
