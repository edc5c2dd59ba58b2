//! Stable single-column sort.

use std::cmp::Ordering;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute;
use arrow::record_batch::RecordBatch;
use table_core::{Result, TableError};

use crate::compare::compare_cells;

/// Sorts `batch` ascending on one column. Rows with equal keys keep their
/// input order; nulls sort last.
pub fn sort_by_column(batch: &RecordBatch, column_index: usize) -> Result<RecordBatch> {
    if column_index >= batch.num_columns() {
        return Err(TableError::IndexError(format!(
            "Sort column {} out of range for {} columns",
            column_index,
            batch.num_columns()
        )));
    }

    let key = batch.column(column_index).clone();
    let permutation = sort_indices(&key)?;
    let indices = UInt32Array::from(permutation);
    let columns: Vec<ArrayRef> = batch
        .columns()
        .iter()
        .map(|column| compute::take(column.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TableError::ExecutionError(e.to_string()))?;
    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| TableError::ExecutionError(e.to_string()))
}

/// Stable permutation ordering `key` ascending. The comparator cannot fail
/// mid-sort without surfacing, so the first error is latched and returned.
fn sort_indices(key: &ArrayRef) -> Result<Vec<u32>> {
    let mut order: Vec<u32> = (0..key.len() as u32).collect();
    let mut failed: Option<TableError> = None;
    order.sort_by(|&a, &b| match compare_cells(key, a as usize, key, b as usize) {
        Ok(ordering) => ordering,
        Err(err) => {
            failed.get_or_insert(err);
            Ordering::Equal
        }
    });
    match failed {
        Some(err) => Err(err),
        None => Ok(order),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn create_test_batch(keys: Vec<Option<i64>>, tags: Vec<&str>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("key", DataType::Int64, true),
            Field::new("tag", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(keys)),
                Arc::new(StringArray::from(tags)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_sort_is_stable() {
        let batch = create_test_batch(
            vec![Some(2), Some(1), Some(2), Some(1)],
            vec!["first2", "first1", "second2", "second1"],
        );

        let sorted = sort_by_column(&batch, 0).unwrap();
        let tags = sorted
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(tags.value(0), "first1");
        assert_eq!(tags.value(1), "second1");
        assert_eq!(tags.value(2), "first2");
        assert_eq!(tags.value(3), "second2");
    }

    #[test]
    fn test_sort_non_decreasing() {
        let batch = create_test_batch(
            vec![Some(5), Some(3), Some(9), Some(1)],
            vec!["a", "b", "c", "d"],
        );
        let sorted = sort_by_column(&batch, 0).unwrap();
        let keys = sorted
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        for row in 1..keys.len() {
            assert!(keys.value(row - 1) <= keys.value(row));
        }
    }

    #[test]
    fn test_nulls_sort_last() {
        let batch = create_test_batch(vec![None, Some(1)], vec!["null", "one"]);
        let sorted = sort_by_column(&batch, 0).unwrap();
        let keys = sorted
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert!(!keys.is_null(0));
        assert!(keys.is_null(1));
    }

    #[test]
    fn test_column_out_of_range() {
        let batch = create_test_batch(vec![Some(1)], vec!["a"]);
        assert!(matches!(
            sort_by_column(&batch, 5),
            Err(TableError::IndexError(_))
        ));
    }
}
