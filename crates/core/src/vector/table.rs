//! Attribute table without geometry (join input)

use super::{AttributeValue, Schema};
use crate::error::Result;

/// Rows of attribute values sharing one schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTable {
    schema: Schema,
    rows: Vec<Vec<AttributeValue>>,
}

impl AttributeTable {
    pub fn new(schema: Schema, rows: Vec<Vec<AttributeValue>>) -> Result<Self> {
        for row in &rows {
            schema.validate_row(row)?;
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<AttributeValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a named column, in row order
    pub fn column(&self, name: &str) -> Result<Vec<&AttributeValue>> {
        let idx = self.schema.require(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }
}
