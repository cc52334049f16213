//! geopipe CLI - vector/raster analysis pipeline

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geopipe_algorithms::aggregate::{aggregate_count, AggregateParams, AreaUnit, BoundaryRule};
use geopipe_algorithms::buffer::buffer_layer;
use geopipe_algorithms::harmonize::reproject_layer;
use geopipe_algorithms::join::{attribute_join, DuplicateKeys, JoinParams};
use geopipe_algorithms::pipeline::{self, Recipe};
use geopipe_algorithms::select::{select_by_layer, SpatialPredicate};
use geopipe_algorithms::warp::{reproject_raster, Resampling, WarpParams};
use geopipe_core::io::{
    read_bundle, read_geotiff, read_point_csv, read_table, write_geotiff, write_vector,
    PointCsvOptions, VectorFormat, WriteOptions,
};
use geopipe_core::{Raster, VectorLayer, CRS};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geopipe")]
#[command(author, version, about = "Vector/raster spatial analysis pipeline", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    points: PointInput,

    #[command(flatten)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

/// How to read point CSV inputs (ignored for bundle directories)
#[derive(Args, Clone)]
struct PointInput {
    /// X / longitude column of point CSV inputs
    #[arg(long, default_value = "x", global = true)]
    x_column: String,
    /// Y / latitude column of point CSV inputs
    #[arg(long, default_value = "y", global = true)]
    y_column: String,
    /// CRS of point CSV inputs (EPSG:<code> or PROJ string); left undefined if omitted
    #[arg(long, value_parser = parse_crs, global = true)]
    points_crs: Option<CRS>,
}

/// Output handling shared by every writer
#[derive(Args, Clone, Copy)]
struct Output {
    /// Replace existing outputs
    #[arg(long, global = true)]
    overwrite: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a vector bundle, point CSV, table or GeoTIFF
    Info {
        /// Input path
        input: PathBuf,
    },
    /// Join a delimited table onto a layer by key
    Join {
        /// Input layer
        layer: PathBuf,
        /// Delimited table
        table: PathBuf,
        /// Output layer
        output: PathBuf,
        /// Key column in the layer
        #[arg(long)]
        layer_key: String,
        /// Key column in the table
        #[arg(long)]
        table_key: String,
        /// Table delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,
        /// Suffix for table columns colliding with layer columns
        #[arg(long, default_value = "_right")]
        suffix: String,
        /// Emit one feature per matching row when keys repeat in the table
        #[arg(long)]
        fan_out: bool,
    },
    /// Reproject a vector layer
    Reproject {
        input: PathBuf,
        output: PathBuf,
        /// Target CRS
        #[arg(short, long, value_parser = parse_crs)]
        crs: CRS,
    },
    /// Reproject a GeoTIFF raster
    ReprojectRaster {
        input: PathBuf,
        output: PathBuf,
        /// Target CRS
        #[arg(short, long, value_parser = parse_crs)]
        crs: CRS,
        /// Resampling: nearest, bilinear
        #[arg(short, long, default_value = "nearest")]
        resampling: String,
        /// Output cell size in target CRS units
        #[arg(long)]
        cell_size: Option<f64>,
    },
    /// Declare the CRS of a layer that has none (coordinates unchanged)
    AssignCrs {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, value_parser = parse_crs)]
        crs: CRS,
    },
    /// Buffer every feature by a distance in CRS units
    Buffer {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long)]
        radius: f64,
    },
    /// Select features by spatial predicate against a reference layer
    Select {
        input: PathBuf,
        reference: PathBuf,
        output: PathBuf,
        /// Predicate: intersects, within, contains, touches, disjoint
        #[arg(short, long, default_value = "intersects")]
        predicate: String,
    },
    /// Count points per polygon group and compute per-area rates
    Aggregate {
        points: PathBuf,
        polygons: PathBuf,
        output: PathBuf,
        /// Polygon column defining groups
        #[arg(short, long)]
        group_key: String,
        #[arg(long, default_value = "count")]
        count_column: String,
        #[arg(long, default_value = "rate")]
        rate_column: String,
        /// Area unit: native, m2, ha, km2, mi2
        #[arg(short, long, default_value = "km2")]
        area_unit: String,
        /// Boundary rule: inclusive, first-match
        #[arg(short, long, default_value = "inclusive")]
        boundary: String,
    },
    /// Run a JSON pipeline recipe
    Run {
        recipe: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn parse_crs(s: &str) -> std::result::Result<CRS, String> {
    CRS::parse(s).map_err(|e| e.to_string())
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("txt"))
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

fn read_layer(path: &Path, points: &PointInput) -> Result<VectorLayer> {
    let pb = spinner("Reading layer...");
    let layer = if is_csv(path) {
        let options = PointCsvOptions {
            x_column: points.x_column.clone(),
            y_column: points.y_column.clone(),
            crs: points.points_crs.clone(),
            ..Default::default()
        };
        read_point_csv(path, &options)
    } else {
        read_bundle(path)
    }
    .with_context(|| format!("Failed to read layer {}", path.display()))?;
    pb.finish_and_clear();
    info!(
        "Input: '{}', {} {} features, CRS {}",
        layer.name(),
        layer.len(),
        layer.kind(),
        describe_crs(layer.crs())
    );
    Ok(layer)
}

fn write_layer(layer: &VectorLayer, path: &Path, output: Output) -> Result<()> {
    let pb = spinner("Writing output...");
    let format = if is_csv(path) {
        VectorFormat::PointCsv
    } else {
        VectorFormat::Bundle
    };
    let options = WriteOptions {
        overwrite: output.overwrite,
    };
    write_vector(layer, path, format, &options).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn describe_crs(crs: Option<&CRS>) -> String {
    crs.map(|c| c.to_string()).unwrap_or_else(|| "undefined".into())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_resampling(s: &str) -> Result<Resampling> {
    match s.to_lowercase().as_str() {
        "nearest" | "near" => Ok(Resampling::Nearest),
        "bilinear" | "linear" => Ok(Resampling::Bilinear),
        _ => anyhow::bail!("Unknown resampling: {}. Use nearest or bilinear.", s),
    }
}

fn parse_area_unit(s: &str) -> Result<AreaUnit> {
    match s.to_lowercase().as_str() {
        "native" => Ok(AreaUnit::Native),
        "m2" | "sqm" => Ok(AreaUnit::SquareMeters),
        "ha" | "hectares" => Ok(AreaUnit::Hectares),
        "km2" | "sqkm" => Ok(AreaUnit::SquareKilometers),
        "mi2" | "sqmi" => Ok(AreaUnit::SquareMiles),
        _ => anyhow::bail!("Unknown area unit: {}. Use native, m2, ha, km2 or mi2.", s),
    }
}

fn parse_boundary(s: &str) -> Result<BoundaryRule> {
    match s.to_lowercase().as_str() {
        "inclusive" => Ok(BoundaryRule::Inclusive),
        "first-match" | "first" => Ok(BoundaryRule::FirstMatch),
        _ => anyhow::bail!("Unknown boundary rule: {}. Use inclusive or first-match.", s),
    }
}

fn print_layer_info(layer: &VectorLayer) {
    println!("Layer: {}", layer.name());
    println!("Geometry: {} ({} features)", layer.kind(), layer.len());
    println!("CRS: {}", describe_crs(layer.crs()));
    println!("\nFields:");
    for field in layer.schema().fields() {
        println!("  {} ({})", field.name, field.field_type);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let Cli {
        points,
        output,
        command,
        ..
    } = cli;

    match command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            if is_tiff(&input) {
                let raster = read_raster(&input)?;
                let (rows, cols) = raster.shape();
                let bounds = raster.bounds();
                let stats = raster.statistics();

                println!("File: {}", input.display());
                println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
                println!("Cell size: {}", raster.cell_size());
                println!(
                    "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    bounds.0, bounds.1, bounds.2, bounds.3
                );
                println!("CRS: {}", describe_crs(raster.crs()));
                println!("\nStatistics:");
                if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                    println!("  Min: {:.4}", min);
                    println!("  Max: {:.4}", max);
                    println!("  Mean: {:.4}", mean);
                }
                println!(
                    "  Valid cells: {} ({:.1}%)",
                    stats.valid_count,
                    100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
                );
            } else if input.is_dir() {
                print_layer_info(&read_layer(&input, &points)?);
            } else {
                // a CSV may be a point layer or a plain table
                match read_layer(&input, &points) {
                    Ok(layer) => print_layer_info(&layer),
                    Err(_) => {
                        let table = read_table(&input, b',').context("Failed to read table")?;
                        println!("Table: {} ({} rows)", input.display(), table.len());
                        println!("\nFields:");
                        for field in table.schema().fields() {
                            println!("  {} ({})", field.name, field.field_type);
                        }
                    }
                }
            }
        }

        // ── Join ─────────────────────────────────────────────────────
        Commands::Join {
            layer,
            table,
            output: out,
            layer_key,
            table_key,
            delimiter,
            suffix,
            fan_out,
        } => {
            let layer = read_layer(&layer, &points)?;
            let delimiter = u8::try_from(delimiter)
                .map_err(|_| anyhow::anyhow!("Delimiter must be a single-byte character"))?;
            let table = read_table(&table, delimiter).context("Failed to read table")?;
            let start = Instant::now();
            let params = JoinParams {
                suffix,
                duplicates: if fan_out {
                    DuplicateKeys::FanOut
                } else {
                    DuplicateKeys::Reject
                },
            };
            let joined = attribute_join(&layer, &table, &layer_key, &table_key, &params)
                .context("Join failed")?;
            let elapsed = start.elapsed();
            write_layer(&joined, &out, output)?;
            done("Joined layer", &out, elapsed);
        }

        // ── Harmonize ────────────────────────────────────────────────
        Commands::Reproject { input, output: out, crs } => {
            let layer = read_layer(&input, &points)?;
            let start = Instant::now();
            let projected = reproject_layer(&layer, &crs).context("Reprojection failed")?;
            let elapsed = start.elapsed();
            write_layer(&projected, &out, output)?;
            done("Reprojected layer", &out, elapsed);
        }

        Commands::ReprojectRaster {
            input,
            output: out,
            crs,
            resampling,
            cell_size,
        } => {
            let raster = read_raster(&input)?;
            let params = WarpParams {
                resampling: parse_resampling(&resampling)?,
                cell_size,
            };
            let start = Instant::now();
            let warped = reproject_raster(&raster, &crs, &params).context("Raster reprojection failed")?;
            let elapsed = start.elapsed();
            let pb = spinner("Writing output...");
            let options = WriteOptions {
                overwrite: output.overwrite,
            };
            write_geotiff(&warped, &out, &options).context("Failed to write output")?;
            pb.finish_and_clear();
            done("Reprojected raster", &out, elapsed);
        }

        Commands::AssignCrs { input, output: out, crs } => {
            let layer = read_layer(&input, &points)?;
            let start = Instant::now();
            let annotated = layer.assign_crs(crs).context("Cannot assign CRS")?;
            let elapsed = start.elapsed();
            write_layer(&annotated, &out, output)?;
            done("Annotated layer", &out, elapsed);
        }

        // ── Selection / aggregation ─────────────────────────────────
        Commands::Buffer { input, output: out, radius } => {
            let layer = read_layer(&input, &points)?;
            let start = Instant::now();
            let zones = buffer_layer(&layer, radius).context("Buffer failed")?;
            let elapsed = start.elapsed();
            write_layer(&zones, &out, output)?;
            done("Buffers", &out, elapsed);
        }

        Commands::Select {
            input,
            reference,
            output: out,
            predicate,
        } => {
            let predicate: SpatialPredicate = predicate.parse()?;
            let candidates = read_layer(&input, &points)?;
            let reference = read_layer(&reference, &points)?;
            let start = Instant::now();
            let selected =
                select_by_layer(&candidates, &reference, predicate).context("Selection failed")?;
            let elapsed = start.elapsed();
            println!("Selected {} of {} features", selected.len(), candidates.len());
            write_layer(&selected, &out, output)?;
            done("Selection", &out, elapsed);
        }

        Commands::Aggregate {
            points: points_path,
            polygons,
            output: out,
            group_key,
            count_column,
            rate_column,
            area_unit,
            boundary,
        } => {
            let params = AggregateParams {
                count_column,
                rate_column,
                area_unit: parse_area_unit(&area_unit)?,
                boundary: parse_boundary(&boundary)?,
            };
            let incidents = read_layer(&points_path, &points)?;
            let polygons = read_layer(&polygons, &points)?;
            let start = Instant::now();
            let counted = aggregate_count(&incidents, &polygons, &group_key, &params)
                .context("Aggregation failed")?;
            let elapsed = start.elapsed();
            write_layer(&counted, &out, output)?;
            done("Aggregated layer", &out, elapsed);
        }

        // ── Recipe ───────────────────────────────────────────────────
        Commands::Run { recipe } => {
            let start = Instant::now();
            let parsed = Recipe::from_path(&recipe)
                .with_context(|| format!("Failed to read recipe {}", recipe.display()))?;
            let pb = spinner(&format!("Running {} steps...", parsed.steps.len()));
            let result = pipeline::run(&parsed);
            pb.finish_and_clear();
            result.context("Pipeline failed")?;
            println!("Recipe {} completed ({} steps)", recipe.display(), parsed.steps.len());
            println!("  Processing time: {:.2?}", start.elapsed());
        }
    }

    Ok(())
}
