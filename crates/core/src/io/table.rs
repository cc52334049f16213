//! Delimited text tables with a header row

use crate::error::{Error, Result};
use crate::vector::{AttributeTable, AttributeValue, Field, FieldType, Schema};
use std::path::Path;
use tracing::debug;

/// Raw header + records of a delimited file
pub(crate) struct Delimited {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

pub(crate) fn read_delimited(path: &Path, delimiter: u8) -> Result<Delimited> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(Delimited { headers, records })
}

impl Delimited {
    /// Infer a type per column (skipping `skip`) and parse every cell.
    pub fn typed_columns(&self, skip: &[usize]) -> Result<(Schema, Vec<Vec<AttributeValue>>)> {
        let columns: Vec<usize> = (0..self.headers.len()).filter(|i| !skip.contains(i)).collect();

        let mut fields = Vec::with_capacity(columns.len());
        for &col in &columns {
            let field_type = FieldType::infer(self.records.iter().map(|r| r[col].as_str()));
            fields.push(Field::new(self.headers[col].clone(), field_type));
        }
        let schema = Schema::new(fields)?;

        let rows = self
            .records
            .iter()
            .map(|record| {
                schema
                    .fields()
                    .iter()
                    .zip(&columns)
                    .map(|(field, &col)| {
                        // inference guarantees every cell parses
                        field
                            .field_type
                            .parse_cell(&record[col])
                            .unwrap_or(AttributeValue::Null)
                    })
                    .collect()
            })
            .collect();

        Ok((schema, rows))
    }
}

/// Read a delimited table, inferring column types.
///
/// Empty cells become `Null`.
pub fn read_table<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<AttributeTable> {
    let path = path.as_ref();
    let raw = read_delimited(path, delimiter)?;
    if raw.headers.is_empty() {
        return Err(Error::parse(path.display(), "missing header row"));
    }
    let (schema, rows) = raw.typed_columns(&[])?;
    debug!("table {}: {} rows, columns {:?}", path.display(), rows.len(), schema.names());
    AttributeTable::new(schema, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_table_infers_types() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "geoid,population,median_income,name").unwrap();
        writeln!(file, "A,1200,51000.5,North").unwrap();
        writeln!(file, "B,,48000,South").unwrap();
        file.flush().unwrap();

        let table = read_table(file.path(), b',').unwrap();
        let types: Vec<FieldType> = table.schema().fields().iter().map(|f| f.field_type).collect();
        assert_eq!(
            types,
            vec![FieldType::Text, FieldType::Integer, FieldType::Real, FieldType::Text]
        );
        assert_eq!(table.rows()[1][1], AttributeValue::Null);
        assert_eq!(table.rows()[1][2], AttributeValue::Float(48000.0));
    }

    #[test]
    fn test_read_table_semicolon() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "id;value").unwrap();
        writeln!(file, "1;x").unwrap();
        file.flush().unwrap();

        let table = read_table(file.path(), b';').unwrap();
        assert_eq!(table.schema().names(), vec!["id", "value"]);
        assert_eq!(table.rows()[0][0], AttributeValue::Int(1));
    }

    #[test]
    fn test_duplicate_header_is_schema_error() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "id,id").unwrap();
        writeln!(file, "1,2").unwrap();
        file.flush().unwrap();

        assert!(matches!(read_table(file.path(), b','), Err(Error::Schema { .. })));
    }
}
