//! Typed cell and row comparison across record batches.

use std::cmp::Ordering;

use arrow::array::*;
use arrow::record_batch::RecordBatch;
use table_core::{Result, TableError};

macro_rules! cmp_downcast {
    ($left:expr, $left_row:expr, $right:expr, $right_row:expr, $array:ty) => {
        if let (Some(l), Some(r)) = (
            $left.as_any().downcast_ref::<$array>(),
            $right.as_any().downcast_ref::<$array>(),
        ) {
            return Ok(l.value($left_row).cmp(&r.value($right_row)));
        }
    };
}

/// Compares the value at `(left, left_row)` with `(right, right_row)`.
/// The arrays must share a type. Nulls order after every value.
pub fn compare_cells(
    left: &ArrayRef,
    left_row: usize,
    right: &ArrayRef,
    right_row: usize,
) -> Result<Ordering> {
    match (left.is_null(left_row), right.is_null(right_row)) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => return Ok(Ordering::Greater),
        (false, true) => return Ok(Ordering::Less),
        (false, false) => {}
    }

    cmp_downcast!(left, left_row, right, right_row, Int64Array);
    cmp_downcast!(left, left_row, right, right_row, Int32Array);
    cmp_downcast!(left, left_row, right, right_row, Int16Array);
    cmp_downcast!(left, left_row, right, right_row, Int8Array);
    cmp_downcast!(left, left_row, right, right_row, UInt64Array);
    cmp_downcast!(left, left_row, right, right_row, UInt32Array);
    cmp_downcast!(left, left_row, right, right_row, UInt16Array);
    cmp_downcast!(left, left_row, right, right_row, UInt8Array);
    cmp_downcast!(left, left_row, right, right_row, BooleanArray);
    cmp_downcast!(left, left_row, right, right_row, Date32Array);
    cmp_downcast!(left, left_row, right, right_row, Date64Array);

    if let (Some(l), Some(r)) = (
        left.as_any().downcast_ref::<Float64Array>(),
        right.as_any().downcast_ref::<Float64Array>(),
    ) {
        return Ok(l.value(left_row).total_cmp(&r.value(right_row)));
    }
    if let (Some(l), Some(r)) = (
        left.as_any().downcast_ref::<Float32Array>(),
        right.as_any().downcast_ref::<Float32Array>(),
    ) {
        return Ok(l.value(left_row).total_cmp(&r.value(right_row)));
    }
    if let (Some(l), Some(r)) = (
        left.as_any().downcast_ref::<StringArray>(),
        right.as_any().downcast_ref::<StringArray>(),
    ) {
        return Ok(l.value(left_row).cmp(r.value(right_row)));
    }
    if let (Some(l), Some(r)) = (
        left.as_any().downcast_ref::<LargeStringArray>(),
        right.as_any().downcast_ref::<LargeStringArray>(),
    ) {
        return Ok(l.value(left_row).cmp(r.value(right_row)));
    }
    if let (Some(l), Some(r)) = (
        left.as_any().downcast_ref::<BinaryArray>(),
        right.as_any().downcast_ref::<BinaryArray>(),
    ) {
        return Ok(l.value(left_row).cmp(r.value(right_row)));
    }

    Err(TableError::ExecutionError(format!(
        "Unsupported type for comparison: {}",
        left.data_type()
    )))
}

/// Row equality across two batches over all columns.
pub fn rows_equal(
    left: &RecordBatch,
    left_row: usize,
    right: &RecordBatch,
    right_row: usize,
) -> Result<bool> {
    for (left_column, right_column) in left.columns().iter().zip(right.columns().iter()) {
        if compare_cells(left_column, left_row, right_column, right_row)? != Ordering::Equal {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(ids: Vec<Option<i64>>, names: Vec<&str>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rows_equal_across_batches() {
        let left = batch(vec![Some(1), Some(2)], vec!["a", "b"]);
        let right = batch(vec![Some(2), Some(3)], vec!["b", "c"]);

        assert!(rows_equal(&left, 1, &right, 0).unwrap());
        assert!(!rows_equal(&left, 0, &right, 0).unwrap());
    }

    #[test]
    fn test_null_orders_last() {
        let b = batch(vec![Some(5), None], vec!["a", "b"]);
        let column = b.column(0).clone();
        assert_eq!(
            compare_cells(&column, 0, &column, 1).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_cells(&column, 1, &column, 1).unwrap(),
            Ordering::Equal
        );
    }
}
