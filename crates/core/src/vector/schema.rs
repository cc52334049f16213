//! Attribute schema shared by every row of a layer or table

use super::AttributeValue;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    Integer,
    Real,
    Text,
}

impl FieldType {
    /// Whether `value` may be stored in a column of this type.
    ///
    /// `Null` fits everywhere; integers widen into `Real`.
    pub fn accepts(self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (_, AttributeValue::Null)
                | (FieldType::Bool, AttributeValue::Bool(_))
                | (FieldType::Integer, AttributeValue::Int(_))
                | (FieldType::Real, AttributeValue::Int(_))
                | (FieldType::Real, AttributeValue::Float(_))
                | (FieldType::Text, AttributeValue::String(_))
        )
    }

    /// Parse a raw text cell into a value of this type
    pub fn parse_cell(self, raw: &str) -> Option<AttributeValue> {
        if raw.is_empty() {
            return Some(AttributeValue::Null);
        }
        match self {
            FieldType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(AttributeValue::Bool(true)),
                "false" => Some(AttributeValue::Bool(false)),
                _ => None,
            },
            FieldType::Integer => raw.parse().ok().map(AttributeValue::Int),
            FieldType::Real => raw.parse().ok().map(AttributeValue::Float),
            FieldType::Text => Some(AttributeValue::String(raw.to_string())),
        }
    }

    /// Narrowest type able to hold every cell of a text column.
    ///
    /// Codes with leading zeros (`"01001"`) stay text so they keep matching.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut int = true;
        let mut real = true;
        let mut boolean = true;
        let mut seen = false;

        for cell in cells.into_iter().filter(|c| !c.is_empty()) {
            seen = true;
            let numeric = !has_leading_zero(cell);
            int &= numeric && cell.parse::<i64>().is_ok();
            real &= numeric && cell.parse::<f64>().is_ok();
            boolean &= cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false");
        }

        match (seen, int, real, boolean) {
            (false, ..) => FieldType::Text,
            (_, true, _, _) => FieldType::Integer,
            (_, _, true, _) => FieldType::Real,
            (_, _, _, true) => FieldType::Bool,
            _ => FieldType::Text,
        }
    }
}

fn has_leading_zero(cell: &str) -> bool {
    let digits = cell.trim_start_matches(['-', '+']);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bool => "bool",
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
        };
        f.write_str(name)
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered list of uniquely named fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut schema = Schema::default();
        for field in fields {
            schema.push(field)?;
        }
        Ok(schema)
    }

    /// Append a field; names must be unique
    pub fn push(&mut self, field: Field) -> Result<()> {
        if self.index_of(&field.name).is_some() {
            return Err(Error::schema(field.name, "is defined twice"));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of a column that must exist
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::schema(name, format!("does not exist (have: {})", self.names().join(", "))))
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that a row has one value per field and each value fits its type.
    pub fn validate_row(&self, row: &[AttributeValue]) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(Error::schema(
                self.names().join(","),
                format!("expects {} values per row, got {}", self.fields.len(), row.len()),
            ));
        }
        for (field, value) in self.fields.iter().zip(row) {
            if !field.field_type.accepts(value) {
                return Err(Error::schema(
                    &field.name,
                    format!("is {} but holds {:?}", field.field_type, value),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_types() {
        assert_eq!(FieldType::infer(["1", "2", ""]), FieldType::Integer);
        assert_eq!(FieldType::infer(["1", "2.5"]), FieldType::Real);
        assert_eq!(FieldType::infer(["true", "FALSE"]), FieldType::Bool);
        assert_eq!(FieldType::infer(["36061", "x"]), FieldType::Text);
        assert_eq!(FieldType::infer(["", ""]), FieldType::Text);
        assert_eq!(FieldType::infer(["01001", "01003"]), FieldType::Text);
        assert_eq!(FieldType::infer(["0", "0.25"]), FieldType::Real);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = Schema::new(vec![
            Field::new("GEOID", FieldType::Text),
            Field::new("GEOID", FieldType::Integer),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GEOID"));
    }

    #[test]
    fn test_require_names_missing_column() {
        let schema = Schema::new(vec![Field::new("pop", FieldType::Integer)]).unwrap();
        let err = schema.require("GEOID").unwrap_err();
        assert!(matches!(err, Error::Schema { ref column, .. } if column == "GEOID"));
    }

    #[test]
    fn test_validate_row_widens_int() {
        let schema = Schema::new(vec![Field::new("density", FieldType::Real)]).unwrap();
        assert!(schema.validate_row(&[AttributeValue::Int(3)]).is_ok());
        assert!(schema.validate_row(&[AttributeValue::String("x".into())]).is_err());
        assert!(schema.validate_row(&[]).is_err());
    }
}
