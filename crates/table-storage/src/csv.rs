//! CSV ingestion and output built on `arrow::csv`.

use std::fs::File;
use std::io::Seek;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use table_core::{Result, TableError};
use tracing::debug;

/// Options for reading CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvReadOptions {
    pub delimiter: u8,
    pub has_header: bool,
    /// Overrides the inferred column names when non-empty.
    pub column_names: Vec<String>,
    /// Read a list of files on one worker thread each.
    pub concurrent_file_reads: bool,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            column_names: Vec::new(),
            concurrent_file_reads: false,
        }
    }
}

/// Options for writing CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvWriteOptions {
    pub delimiter: u8,
    pub override_column_names: bool,
    pub column_names: Vec<String>,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            override_column_names: false,
            column_names: Vec::new(),
        }
    }
}

/// Reads one CSV file, inferring the schema from its contents.
pub fn read_csv(path: &str, options: &CsvReadOptions) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let mut file = File::open(path)?;
    let format = Format::default()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter);
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .map_err(|e| TableError::IoError(e.to_string()))?;
    let schema = Arc::new(rename_fields(schema, &options.column_names)?);
    file.rewind()?;

    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_header(options.has_header)
        .with_delimiter(options.delimiter)
        .build(file)
        .map_err(|e| TableError::IoError(e.to_string()))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(|e| TableError::IoError(e.to_string()))?);
    }
    debug!(path, batches = batches.len(), "read csv");
    Ok((schema, batches))
}

/// Writes the batches of one table as a CSV file with a header row.
pub fn write_csv(
    path: &str,
    schema: &SchemaRef,
    batches: &[RecordBatch],
    options: &CsvWriteOptions,
) -> Result<()> {
    let renamed = if options.override_column_names {
        if options.column_names.len() != schema.fields().len() {
            return Err(TableError::IndexError(format!(
                "Provided headers do not match the number of columns. Given {}, expected {}",
                options.column_names.len(),
                schema.fields().len()
            )));
        }
        Some(Arc::new(rename_fields(
            schema.as_ref().clone(),
            &options.column_names,
        )?))
    } else {
        None
    };

    let file = File::create(path)?;
    let mut writer = WriterBuilder::new()
        .with_delimiter(options.delimiter)
        .with_header(true)
        .build(file);
    for batch in batches {
        let batch = match &renamed {
            Some(schema) => RecordBatch::try_new(Arc::clone(schema), batch.columns().to_vec())
                .map_err(|e| TableError::ExecutionError(e.to_string()))?,
            None => batch.clone(),
        };
        writer
            .write(&batch)
            .map_err(|e| TableError::IoError(e.to_string()))?;
    }
    Ok(())
}

fn rename_fields(schema: Schema, names: &[String]) -> Result<Schema> {
    if names.is_empty() {
        return Ok(schema);
    }
    if names.len() != schema.fields().len() {
        return Err(TableError::IndexError(format!(
            "Given {} column names, expected {}",
            names.len(),
            schema.fields().len()
        )));
    }
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .zip(names)
        .map(|(field, name)| Field::new(name, field.data_type().clone(), field.is_nullable()))
        .collect();
    Ok(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::DataType;
    use std::io::Write;

    fn write_sample(dir: &tempfile::TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "id,name").unwrap();
        writeln!(file, "1,alice").unwrap();
        writeln!(file, "2,bob").unwrap();
        writeln!(file, "3,charlie").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_read_infers_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "people.csv");

        let (schema, batches) = read_csv(&path, &CsvReadOptions::default()).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);

        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(&dir, "in.csv");
        let output = dir.path().join("out.csv").to_string_lossy().into_owned();

        let (schema, batches) = read_csv(&input, &CsvReadOptions::default()).unwrap();
        write_csv(&output, &schema, &batches, &CsvWriteOptions::default()).unwrap();
        let (schema2, batches2) = read_csv(&output, &CsvReadOptions::default()).unwrap();

        assert_eq!(schema, schema2);
        let rows = |batches: &[RecordBatch]| -> Vec<(i64, String)> {
            let mut out = Vec::new();
            for batch in batches {
                let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
                let names = batch
                    .column(1)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .unwrap();
                for row in 0..batch.num_rows() {
                    out.push((ids.value(row), names.value(row).to_string()));
                }
            }
            out.sort();
            out
        };
        assert_eq!(rows(&batches), rows(&batches2));
    }

    #[test]
    fn test_column_name_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "people.csv");

        let options = CsvReadOptions {
            column_names: vec!["key".to_string(), "label".to_string()],
            ..Default::default()
        };
        let (schema, _) = read_csv(&path, &options).unwrap();
        assert_eq!(schema.field(0).name(), "key");
        assert_eq!(schema.field(1).name(), "label");
    }

    #[test]
    fn test_write_header_arity_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "people.csv");
        let (schema, batches) = read_csv(&path, &CsvReadOptions::default()).unwrap();

        let options = CsvWriteOptions {
            override_column_names: true,
            column_names: vec!["only_one".to_string()],
            ..Default::default()
        };
        let output = dir.path().join("bad.csv").to_string_lossy().into_owned();
        let result = write_csv(&output, &schema, &batches, &options);
        assert!(matches!(result, Err(TableError::IndexError(_))));
    }
}
