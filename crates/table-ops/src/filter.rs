//! Row-predicate selection and column projection.

use std::sync::Arc;

use arrow::array::BooleanBuilder;
use arrow::compute::kernels::filter::filter_record_batch;
use arrow::datatypes::{FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use table_core::{Result, TableError};

use crate::row::Row;

/// Keeps the rows for which `predicate` holds.
pub fn select<F>(batch: &RecordBatch, predicate: F) -> Result<RecordBatch>
where
    F: Fn(&Row) -> bool,
{
    let mut mask = BooleanBuilder::with_capacity(batch.num_rows());
    for row_index in 0..batch.num_rows() {
        mask.append_value(predicate(&Row::new(batch, row_index)));
    }
    filter_record_batch(batch, &mask.finish())
        .map_err(|e| TableError::ExecutionError(e.to_string()))
}

/// Builds a batch holding only the listed columns, in the listed order.
pub fn project(batch: &RecordBatch, column_indices: &[usize]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<FieldRef> = Vec::with_capacity(column_indices.len());
    let mut columns = Vec::with_capacity(column_indices.len());
    for &column_index in column_indices {
        let field = schema.fields().get(column_index).ok_or_else(|| {
            TableError::IndexError(format!(
                "Projection column {} out of range for {} columns",
                column_index,
                batch.num_columns()
            ))
        })?;
        fields.push(field.clone());
        columns.push(batch.column(column_index).clone());
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| TableError::ExecutionError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec!["a", "b", "c", "d"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_by_predicate() {
        let batch = create_test_batch();
        let result = select(&batch, |row| row.i64(0).map(|v| v > 2).unwrap_or(false)).unwrap();

        assert_eq!(result.num_rows(), 2);
        let ids = result
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.values(), &[3, 4]);
    }

    #[test]
    fn test_project_all_columns_keeps_rows_and_schema() {
        let batch = create_test_batch();
        let result = project(&batch, &[0, 1]).unwrap();
        assert_eq!(result.num_rows(), batch.num_rows());
        assert_eq!(result.schema(), batch.schema());
    }

    #[test]
    fn test_project_reorders() {
        let batch = create_test_batch();
        let result = project(&batch, &[1, 0]).unwrap();
        assert_eq!(result.schema().field(0).name(), "name");
        assert_eq!(result.schema().field(1).name(), "id");
    }

    #[test]
    fn test_project_out_of_range() {
        let batch = create_test_batch();
        assert!(matches!(
            project(&batch, &[0, 7]),
            Err(TableError::IndexError(_))
        ));
    }
}
