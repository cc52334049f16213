//! Vector data structures
//!
//! - [`VectorLayer`]: ordered features sharing one geometry kind, one schema
//!   and one CRS
//! - [`Feature`]: geometry + attribute row aligned to the layer schema
//! - [`AttributeTable`]: a plain attribute table without geometry

mod schema;
mod table;

pub use schema::{Field, FieldType, Schema};
pub use table::AttributeTable;

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical string used to compare join keys of different types.
    ///
    /// Integral floats render without a fractional part so `7.0` matches `7`.
    /// `Null` never produces a key.
    pub fn join_key(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Int(v) => Some(v.to_string()),
            AttributeValue::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(format!("{}", *v as i64))
            }
            AttributeValue::Float(v) => Some(v.to_string()),
            AttributeValue::String(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for AttributeValue {
    /// Text form used by the delimited writers; `Null` is empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// Geometry kind shared by every feature of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    /// Kind of a geometry; multi-part variants map to their single-part kind.
    /// Geometry collections have no kind.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryKind::Line)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "polygon",
        };
        f.write_str(name)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Geometry<f64>,
    /// Attribute values, positionally aligned to the layer schema
    pub attributes: Vec<AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, attributes: Vec<AttributeValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }
}

/// A vector layer.
///
/// Layers are immutable values: derivations build new layers. The only
/// consuming update is [`VectorLayer::assign_crs`], which declares a missing
/// CRS without touching coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    name: String,
    kind: GeometryKind,
    crs: Option<CRS>,
    schema: Schema,
    features: Vec<Feature>,
}

impl VectorLayer {
    /// Build a layer, checking geometry kinds and attribute rows.
    pub fn new(
        name: impl Into<String>,
        kind: GeometryKind,
        crs: Option<CRS>,
        schema: Schema,
        features: Vec<Feature>,
    ) -> Result<Self> {
        let name = name.into();
        for feature in &features {
            match GeometryKind::of(&feature.geometry) {
                Some(k) if k == kind => {}
                Some(k) => {
                    return Err(Error::UnsupportedGeometry {
                        kind: k.to_string(),
                        format: format!("{} layer '{}'", kind, name),
                    });
                }
                None => {
                    return Err(Error::UnsupportedGeometry {
                        kind: "geometry collection".into(),
                        format: format!("{} layer '{}'", kind, name),
                    });
                }
            }
            schema.validate_row(&feature.attributes)?;
        }
        Ok(Self {
            name,
            kind,
            crs,
            schema,
            features,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// The layer CRS, or [`Error::CrsUndefined`].
    pub fn require_crs(&self) -> Result<&CRS> {
        self.crs.as_ref().ok_or_else(|| Error::CrsUndefined {
            layer: self.name.clone(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Value of `column` for the feature at `index`
    pub fn value(&self, index: usize, column: &str) -> Result<&AttributeValue> {
        let col = self.schema.require(column)?;
        self.features
            .get(index)
            .map(|f| &f.attributes[col])
            .ok_or_else(|| Error::InvalidParameter {
                name: "feature",
                value: index.to_string(),
                reason: format!("layer '{}' has {} features", self.name, self.len()),
            })
    }

    /// Rename the layer
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare the CRS of a layer loaded without one.
    ///
    /// Coordinates are not changed. Assigning the CRS the layer already has
    /// is a no-op; assigning a different one fails, since that would silently
    /// reinterpret coordinates (reproject instead).
    pub fn assign_crs(mut self, crs: CRS) -> Result<Self> {
        match &self.crs {
            None => {
                self.crs = Some(crs);
                Ok(self)
            }
            Some(current) if *current == crs => Ok(self),
            Some(current) => Err(Error::CrsAlreadyDefined {
                layer: self.name.clone(),
                crs: current.to_string(),
            }),
        }
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }
}

impl IntoIterator for VectorLayer {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
