//! Attribute join
//!
//! Appends the non-key columns of an [`AttributeTable`] to a [`VectorLayer`]
//! wherever the layer key equals the table key. Keys are compared after
//! coercion to a canonical string, so an integer `1001` matches the text
//! `"1001"` (but not `"01001"`).

use geopipe_core::{
    Algorithm, AttributeTable, AttributeValue, Error, Feature, Field, Result, VectorLayer,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// What to do when a layer key matches more than one table row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeys {
    /// Fail with a schema error naming the key
    #[default]
    Reject,
    /// Emit one output feature per matching row
    FanOut,
}

/// Parameters for the attribute join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinParams {
    /// Appended to table column names that collide with layer columns
    pub suffix: String,
    pub duplicates: DuplicateKeys,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            suffix: "_right".to_string(),
            duplicates: DuplicateKeys::Reject,
        }
    }
}

/// Attribute join stage with its key columns
#[derive(Debug, Clone)]
pub struct AttributeJoin {
    pub layer_key: String,
    pub table_key: String,
}

impl Algorithm for AttributeJoin {
    type Input = (VectorLayer, AttributeTable);
    type Output = VectorLayer;
    type Params = JoinParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Attribute Join"
    }

    fn description(&self) -> &'static str {
        "Append table columns to a layer where the key columns match"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (layer, table) = input;
        attribute_join(&layer, &table, &self.layer_key, &self.table_key, &params)
    }
}

/// Join `table` onto `layer` with default parameters (unique keys, `_right` suffix).
pub fn join(
    layer: &VectorLayer,
    table: &AttributeTable,
    layer_key: &str,
    table_key: &str,
) -> Result<VectorLayer> {
    attribute_join(layer, table, layer_key, table_key, &JoinParams::default())
}

/// Left join of a table onto a layer.
///
/// Geometry, CRS and feature order are preserved. Features without a match
/// get `Null` in every appended column. A key matching several rows is an
/// error unless `params.duplicates` is [`DuplicateKeys::FanOut`].
///
/// # Errors
/// `Schema` if a key column is missing, a key is duplicated in the table
/// (with `Reject`), or a column name still collides after suffixing.
pub fn attribute_join(
    layer: &VectorLayer,
    table: &AttributeTable,
    layer_key: &str,
    table_key: &str,
    params: &JoinParams,
) -> Result<VectorLayer> {
    let layer_col = layer.schema().require(layer_key)?;
    let table_col = table.schema().require(table_key)?;

    let appended: Vec<usize> = (0..table.schema().len()).filter(|&i| i != table_col).collect();

    let mut schema = layer.schema().clone();
    for &i in &appended {
        let field = &table.schema().fields()[i];
        let name = if schema.index_of(&field.name).is_some() {
            format!("{}{}", field.name, params.suffix)
        } else {
            field.name.clone()
        };
        if schema.index_of(&name).is_some() {
            return Err(Error::schema(name, "collides with an existing column even after suffixing"));
        }
        schema.push(Field::new(name, field.field_type))?;
    }

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (row, values) in table.rows().iter().enumerate() {
        if let Some(key) = values[table_col].join_key() {
            index.entry(key).or_default().push(row);
        }
    }
    debug!("join index: {} distinct keys over {} rows", index.len(), table.len());

    let unmatched = vec![AttributeValue::Null; appended.len()];
    let extend = |feature: &Feature, extra: Vec<AttributeValue>| {
        let mut attributes = feature.attributes.clone();
        attributes.extend(extra);
        Feature::new(feature.geometry.clone(), attributes)
    };
    let pick = |row: usize| -> Vec<AttributeValue> {
        appended.iter().map(|&i| table.rows()[row][i].clone()).collect()
    };

    let mut features = Vec::with_capacity(layer.len());
    let mut matched = 0usize;
    for feature in layer.iter() {
        let key = feature.attributes[layer_col].join_key();
        let rows = key
            .as_ref()
            .and_then(|k| index.get(k))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        match rows {
            [] => features.push(extend(feature, unmatched.clone())),
            [row] => {
                matched += 1;
                features.push(extend(feature, pick(*row)));
            }
            many => {
                if params.duplicates == DuplicateKeys::Reject {
                    return Err(Error::schema(
                        table_key,
                        format!(
                            "value '{}' matches {} rows; keys must be unique unless fan-out is requested",
                            key.unwrap_or_default(),
                            many.len()
                        ),
                    ));
                }
                matched += 1;
                features.extend(many.iter().map(|&row| extend(feature, pick(row))));
            }
        }
    }

    info!(
        "joined {} table columns onto '{}': {} of {} features matched",
        appended.len(),
        layer.name(),
        matched,
        layer.len()
    );

    VectorLayer::new(layer.name(), layer.kind(), layer.crs().cloned(), schema, features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, Geometry};
    use geopipe_core::{FieldType, GeometryKind, Schema, CRS};

    fn tracts(keys: &[&str]) -> VectorLayer {
        let schema = Schema::new(vec![
            Field::new("GEOID", FieldType::Text),
            Field::new("name", FieldType::Text),
        ])
        .unwrap();
        let features = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                Feature::new(
                    Geometry::Point(point!(x: i as f64, y: 0.0)),
                    vec![(*k).into(), format!("tract {}", k).as_str().into()],
                )
            })
            .collect();
        VectorLayer::new("tracts", GeometryKind::Point, Some(CRS::wgs84()), schema, features).unwrap()
    }

    fn census(rows: &[(&str, i64)]) -> AttributeTable {
        let schema = Schema::new(vec![
            Field::new("geoid", FieldType::Text),
            Field::new("population", FieldType::Integer),
        ])
        .unwrap();
        AttributeTable::new(
            schema,
            rows.iter()
                .map(|(k, p)| vec![(*k).into(), AttributeValue::Int(*p)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_left_join_keeps_unmatched_features() {
        let layer = tracts(&["A", "B", "D"]);
        let table = census(&[("A", 100), ("B", 200), ("C", 300)]);

        let joined = join(&layer, &table, "GEOID", "geoid").unwrap();

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.schema().names(), vec!["GEOID", "name", "population"]);
        assert_eq!(joined.value(0, "population").unwrap(), &AttributeValue::Int(100));
        assert_eq!(joined.value(1, "population").unwrap(), &AttributeValue::Int(200));
        assert_eq!(joined.value(2, "population").unwrap(), &AttributeValue::Null);
        for (a, b) in joined.iter().zip(layer.iter()) {
            assert_eq!(a.geometry, b.geometry);
        }
        assert_eq!(joined.crs(), layer.crs());
    }

    #[test]
    fn test_missing_key_column() {
        let err = join(&tracts(&["A"]), &census(&[("A", 1)]), "GEOID", "tract_id").unwrap_err();
        assert!(matches!(err, Error::Schema { ref column, .. } if column == "tract_id"));
    }

    #[test]
    fn test_duplicate_keys_rejected_by_default() {
        let table = census(&[("A", 1), ("A", 2)]);
        let err = join(&tracts(&["A", "B"]), &table, "GEOID", "geoid").unwrap_err();
        match err {
            Error::Schema { column, reason } => {
                assert_eq!(column, "geoid");
                assert!(reason.contains("'A'"));
                assert!(reason.contains("2 rows"));
            }
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_fan_out_when_requested() {
        let table = census(&[("A", 1), ("A", 2)]);
        let params = JoinParams {
            duplicates: DuplicateKeys::FanOut,
            ..Default::default()
        };
        let joined = attribute_join(&tracts(&["A", "B"]), &table, "GEOID", "geoid", &params).unwrap();

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.value(0, "population").unwrap(), &AttributeValue::Int(1));
        assert_eq!(joined.value(1, "population").unwrap(), &AttributeValue::Int(2));
        assert_eq!(joined.value(2, "GEOID").unwrap(), &AttributeValue::from("B"));
    }

    #[test]
    fn test_colliding_columns_get_suffix() {
        let schema = Schema::new(vec![
            Field::new("geoid", FieldType::Text),
            Field::new("name", FieldType::Text),
        ])
        .unwrap();
        let table = AttributeTable::new(schema, vec![vec!["A".into(), "Alpha".into()]]).unwrap();

        let joined = join(&tracts(&["A"]), &table, "GEOID", "geoid").unwrap();
        assert_eq!(joined.schema().names(), vec!["GEOID", "name", "name_right"]);
        assert_eq!(joined.value(0, "name_right").unwrap(), &AttributeValue::from("Alpha"));
    }

    #[test]
    fn test_numeric_keys_match_text_keys() {
        let schema = Schema::new(vec![
            Field::new("code", FieldType::Integer),
            Field::new("label", FieldType::Text),
        ])
        .unwrap();
        let table = AttributeTable::new(
            schema,
            vec![
                vec![AttributeValue::Int(7), "seven".into()],
                vec![AttributeValue::Null, "nothing".into()],
            ],
        )
        .unwrap();

        let joined = join(&tracts(&["7", "07"]), &table, "GEOID", "code").unwrap();
        assert_eq!(joined.value(0, "label").unwrap(), &AttributeValue::from("seven"));
        assert_eq!(joined.value(1, "label").unwrap(), &AttributeValue::Null);
    }

    #[test]
    fn test_algorithm_trait() {
        let stage = AttributeJoin {
            layer_key: "GEOID".into(),
            table_key: "geoid".into(),
        };
        let out = stage
            .execute_default((tracts(&["A"]), census(&[("A", 5)])))
            .unwrap();
        assert_eq!(out.value(0, "population").unwrap(), &AttributeValue::Int(5));
    }
}
