//! Loading and persisting layers
//!
//! - Vector bundles: a directory with `layer.json`, `geometry.wkt` and
//!   `attributes.csv` (geometry + attributes + CRS)
//! - Point CSV: x/y columns plus attributes, points only
//! - Delimited attribute tables
//! - GeoTIFF rasters (native `tiff` reader/writer)

mod bundle;
mod native;
mod point_csv;
mod table;

pub use bundle::{read_bundle, write_bundle};
pub use native::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
pub use point_csv::{read_point_csv, write_point_csv, PointCsvOptions};
pub use table::read_table;

use crate::error::{Error, Result};
use crate::vector::{GeometryKind, VectorLayer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options shared by every writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Replace an existing output instead of failing with `AlreadyExists`
    #[serde(default)]
    pub overwrite: bool,
}

impl WriteOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// Vector output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VectorFormat {
    /// Directory bundle; represents every geometry kind
    #[default]
    Bundle,
    /// Delimited x/y table; single points only
    PointCsv,
}

impl VectorFormat {
    /// Whether this format can store every geometry of `layer`
    pub fn can_represent(self, layer: &VectorLayer) -> bool {
        match self {
            VectorFormat::Bundle => true,
            VectorFormat::PointCsv => {
                layer.kind() == GeometryKind::Point
                    && layer
                        .iter()
                        .all(|f| matches!(f.geometry, geo_types::Geometry::Point(_)))
            }
        }
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorFormat::Bundle => f.write_str("vector bundle"),
            VectorFormat::PointCsv => f.write_str("point CSV"),
        }
    }
}

/// Read a vector bundle
pub fn read_vector<P: AsRef<Path>>(path: P) -> Result<VectorLayer> {
    read_bundle(path)
}

/// Write a vector layer in the requested format.
///
/// Fails with `UnsupportedGeometry` before touching the disk when the format
/// cannot hold the layer, and with `AlreadyExists` unless overwriting.
pub fn write_vector<P: AsRef<Path>>(
    layer: &VectorLayer,
    path: P,
    format: VectorFormat,
    options: &WriteOptions,
) -> Result<()> {
    match format {
        VectorFormat::Bundle => write_bundle(layer, path, options),
        VectorFormat::PointCsv => write_point_csv(layer, path, &PointCsvOptions::default(), options),
    }
}

/// Fail with `AlreadyExists` if `path` exists and overwriting is off.
pub(crate) fn check_destination(path: &Path, options: &WriteOptions) -> Result<()> {
    if path.exists() && !options.overwrite {
        return Err(Error::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Sibling path used to stage an output before moving it into place
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    path.with_file_name(format!(".{}.partial-{}", name, std::process::id()))
}

/// Move a fully written staging file or directory onto `path`.
pub(crate) fn commit(staged: &Path, path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(staged, path)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Remove a staging file or directory; a missing one is not an error.
fn remove_staged(staged: &Path) -> std::io::Result<()> {
    let removed = if staged.is_dir() {
        fs::remove_dir_all(staged)
    } else {
        fs::remove_file(staged)
    };
    match removed {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove leftovers of a previous or failed write, logging what cannot be removed.
pub(crate) fn discard(staged: &Path) {
    if let Err(e) = remove_staged(staged) {
        warn!("could not remove staging output {}: {}", staged.display(), e);
    }
}

/// Run `write` against a staging path, then commit or discard it.
pub(crate) fn write_staged<F>(path: &Path, options: &WriteOptions, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    check_destination(path, options)?;
    let staged = staging_path(path);
    discard(&staged);
    match write(&staged).and_then(|_| commit(&staged, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            discard(&staged);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_staged() {
        let dir = tempfile::tempdir().unwrap();

        let staged_dir = staging_path(&dir.path().join("tracts"));
        fs::create_dir_all(staged_dir.join("nested")).unwrap();
        remove_staged(&staged_dir).unwrap();
        assert!(!staged_dir.exists());

        let staged_file = staging_path(&dir.path().join("ortho.tif"));
        fs::write(&staged_file, b"partial").unwrap();
        remove_staged(&staged_file).unwrap();
        assert!(!staged_file.exists());

        // nothing to clean up
        remove_staged(&staged_file).unwrap();
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let err = write_staged(&path, &WriteOptions::default(), |staged| {
            fs::create_dir_all(staged)?;
            Err(Error::schema("x", "fails midway"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
