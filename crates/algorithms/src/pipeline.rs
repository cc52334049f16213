//! JSON pipeline recipes
//!
//! A recipe is an ordered list of steps over named datasets:
//!
//! ```json
//! {
//!   "steps": [
//!     { "op": "load_bundle", "name": "tracts", "path": "tracts" },
//!     { "op": "load_points", "name": "incidents", "path": "incidents.csv",
//!       "options": { "x_column": "lon", "y_column": "lat", "crs": "EPSG:4326" } },
//!     { "op": "load_table", "name": "census", "path": "census.csv" },
//!     { "op": "join", "layer": "tracts", "table": "census",
//!       "layer_key": "GEOID", "table_key": "geoid" },
//!     { "op": "reproject", "layer": "incidents", "crs": "EPSG:32618" },
//!     { "op": "aggregate", "points": "incidents", "polygons": "tracts",
//!       "group_key": "GEOID", "output": "density" },
//!     { "op": "write", "layer": "density", "path": "out/density" }
//!   ]
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the recipe file.
//! Steps without an `output` replace their input dataset.

use crate::aggregate::{AggregateParams, CountPointsInPolygons};
use crate::buffer::buffer_layer;
use crate::harmonize::reproject_layer;
use crate::join::{AttributeJoin, JoinParams};
use crate::select::{select_by_layer, SpatialPredicate};
use crate::warp::{reproject_raster, WarpParams};
use geopipe_core::io::{
    read_bundle, read_geotiff, read_point_csv, read_table, write_geotiff, write_vector,
    PointCsvOptions, VectorFormat, WriteOptions,
};
use geopipe_core::{Algorithm, AttributeTable, Error, Raster, Result, VectorLayer, CRS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn comma() -> char {
    ','
}

/// One pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    LoadBundle {
        name: String,
        path: PathBuf,
    },
    LoadPoints {
        name: String,
        path: PathBuf,
        #[serde(default)]
        options: PointCsvOptions,
    },
    LoadTable {
        name: String,
        path: PathBuf,
        #[serde(default = "comma")]
        delimiter: char,
    },
    LoadRaster {
        name: String,
        path: PathBuf,
    },
    /// Declare the CRS of a layer loaded without one
    AssignCrs {
        layer: String,
        crs: CRS,
    },
    Reproject {
        layer: String,
        crs: CRS,
        output: Option<String>,
    },
    ReprojectRaster {
        raster: String,
        crs: CRS,
        #[serde(default)]
        params: WarpParams,
        output: Option<String>,
    },
    Join {
        layer: String,
        table: String,
        layer_key: String,
        table_key: String,
        #[serde(default)]
        params: JoinParams,
        output: Option<String>,
    },
    Buffer {
        layer: String,
        radius: f64,
        output: Option<String>,
    },
    Select {
        layer: String,
        reference: String,
        #[serde(default)]
        predicate: SpatialPredicate,
        output: Option<String>,
    },
    Aggregate {
        points: String,
        polygons: String,
        group_key: String,
        #[serde(default)]
        params: AggregateParams,
        output: Option<String>,
    },
    Write {
        layer: String,
        path: PathBuf,
        #[serde(default)]
        format: VectorFormat,
        #[serde(default)]
        overwrite: bool,
    },
    WriteRaster {
        raster: String,
        path: PathBuf,
        #[serde(default)]
        overwrite: bool,
    },
}

/// A pipeline recipe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub steps: Vec<Step>,
    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Recipe {
    /// Load a recipe from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut recipe: Recipe =
            serde_json::from_str(&text).map_err(|e| Error::parse(path.display(), e.to_string()))?;
        recipe.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(recipe)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// A named value produced by a step
#[derive(Debug, Clone)]
pub enum Dataset {
    Layer(VectorLayer),
    Table(AttributeTable),
    Raster(Raster<f64>),
}

impl Dataset {
    fn kind(&self) -> &'static str {
        match self {
            Dataset::Layer(_) => "vector layer",
            Dataset::Table(_) => "table",
            Dataset::Raster(_) => "raster",
        }
    }
}

/// Datasets held between steps
#[derive(Debug, Default)]
pub struct Workspace {
    datasets: HashMap<String, Dataset>,
}

impl Workspace {
    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn layer(&self, name: &str) -> Result<&VectorLayer> {
        match self.fetch(name)? {
            Dataset::Layer(layer) => Ok(layer),
            other => Err(wrong_kind(name, other, "vector layer")),
        }
    }

    pub fn table(&self, name: &str) -> Result<&AttributeTable> {
        match self.fetch(name)? {
            Dataset::Table(table) => Ok(table),
            other => Err(wrong_kind(name, other, "table")),
        }
    }

    pub fn raster(&self, name: &str) -> Result<&Raster<f64>> {
        match self.fetch(name)? {
            Dataset::Raster(raster) => Ok(raster),
            other => Err(wrong_kind(name, other, "raster")),
        }
    }

    fn fetch(&self, name: &str) -> Result<&Dataset> {
        self.datasets.get(name).ok_or_else(|| Error::InvalidParameter {
            name: "dataset",
            value: name.to_string(),
            reason: "not defined by an earlier step".into(),
        })
    }

    fn insert(&mut self, name: &str, dataset: Dataset) {
        self.datasets.insert(name.to_string(), dataset);
    }
}

fn wrong_kind(name: &str, found: &Dataset, expected: &str) -> Error {
    Error::InvalidParameter {
        name: "dataset",
        value: name.to_string(),
        reason: format!("is a {}, expected a {}", found.kind(), expected),
    }
}

/// Run every step of `recipe` in order.
///
/// Stops at the first failing step; outputs already written by earlier
/// steps stay on disk.
pub fn run(recipe: &Recipe) -> Result<Workspace> {
    let mut ws = Workspace::default();
    for (i, step) in recipe.steps.iter().enumerate() {
        info!("step {}/{}: {}", i + 1, recipe.steps.len(), step_name(step));
        run_step(recipe, &mut ws, step)?;
    }
    Ok(ws)
}

fn step_name(step: &Step) -> &'static str {
    match step {
        Step::LoadBundle { .. } => "load_bundle",
        Step::LoadPoints { .. } => "load_points",
        Step::LoadTable { .. } => "load_table",
        Step::LoadRaster { .. } => "load_raster",
        Step::AssignCrs { .. } => "assign_crs",
        Step::Reproject { .. } => "reproject",
        Step::ReprojectRaster { .. } => "reproject_raster",
        Step::Join { .. } => "join",
        Step::Buffer { .. } => "buffer",
        Step::Select { .. } => "select",
        Step::Aggregate { .. } => "aggregate",
        Step::Write { .. } => "write",
        Step::WriteRaster { .. } => "write_raster",
    }
}

fn run_step(recipe: &Recipe, ws: &mut Workspace, step: &Step) -> Result<()> {
    match step {
        Step::LoadBundle { name, path } => {
            let layer = read_bundle(recipe.resolve(path))?;
            ws.insert(name, Dataset::Layer(layer));
        }
        Step::LoadPoints { name, path, options } => {
            let options = PointCsvOptions {
                name: options.name.clone().or_else(|| Some(name.clone())),
                ..options.clone()
            };
            let layer = read_point_csv(recipe.resolve(path), &options)?;
            ws.insert(name, Dataset::Layer(layer));
        }
        Step::LoadTable { name, path, delimiter } => {
            let delimiter = u8::try_from(*delimiter).map_err(|_| Error::InvalidParameter {
                name: "delimiter",
                value: delimiter.to_string(),
                reason: "must be a single-byte character".into(),
            })?;
            let table = read_table(recipe.resolve(path), delimiter)?;
            ws.insert(name, Dataset::Table(table));
        }
        Step::LoadRaster { name, path } => {
            let raster = read_geotiff::<f64, _>(recipe.resolve(path))?;
            ws.insert(name, Dataset::Raster(raster));
        }
        Step::AssignCrs { layer, crs } => {
            let annotated = ws.layer(layer)?.clone().assign_crs(crs.clone())?;
            ws.insert(layer, Dataset::Layer(annotated));
        }
        Step::Reproject { layer, crs, output } => {
            let projected = reproject_layer(ws.layer(layer)?, crs)?;
            ws.insert(output.as_ref().unwrap_or(layer), Dataset::Layer(projected));
        }
        Step::ReprojectRaster {
            raster,
            crs,
            params,
            output,
        } => {
            let warped = reproject_raster(ws.raster(raster)?, crs, params)?;
            ws.insert(output.as_ref().unwrap_or(raster), Dataset::Raster(warped));
        }
        Step::Join {
            layer,
            table,
            layer_key,
            table_key,
            params,
            output,
        } => {
            let stage = AttributeJoin {
                layer_key: layer_key.clone(),
                table_key: table_key.clone(),
            };
            let joined = stage.execute(
                (ws.layer(layer)?.clone(), ws.table(table)?.clone()),
                params.clone(),
            )?;
            ws.insert(output.as_ref().unwrap_or(layer), Dataset::Layer(joined));
        }
        Step::Buffer { layer, radius, output } => {
            let zones = buffer_layer(ws.layer(layer)?, *radius)?;
            ws.insert(output.as_ref().unwrap_or(layer), Dataset::Layer(zones));
        }
        Step::Select {
            layer,
            reference,
            predicate,
            output,
        } => {
            let selected = select_by_layer(ws.layer(layer)?, ws.layer(reference)?, *predicate)?;
            ws.insert(output.as_ref().unwrap_or(layer), Dataset::Layer(selected));
        }
        Step::Aggregate {
            points,
            polygons,
            group_key,
            params,
            output,
        } => {
            let stage = CountPointsInPolygons {
                group_key: group_key.clone(),
            };
            let counted = stage.execute(
                (ws.layer(points)?.clone(), ws.layer(polygons)?.clone()),
                params.clone(),
            )?;
            ws.insert(output.as_ref().unwrap_or(polygons), Dataset::Layer(counted));
        }
        Step::Write {
            layer,
            path,
            format,
            overwrite,
        } => {
            let options = WriteOptions {
                overwrite: *overwrite,
            };
            write_vector(ws.layer(layer)?, recipe.resolve(path), *format, &options)?;
        }
        Step::WriteRaster {
            raster,
            path,
            overwrite,
        } => {
            let options = WriteOptions {
                overwrite: *overwrite,
            };
            write_geotiff(ws.raster(raster)?, recipe.resolve(path), &options)?;
        }
    }
    Ok(())
}
