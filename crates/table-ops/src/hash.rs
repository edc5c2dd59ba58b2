//! Deterministic row hashing for partitioning and row-set equality.
//!
//! The hash must agree across workers for bit-equal values so that rows
//! sharing a key land on the same destination rank everywhere. The hasher
//! is seeded with the column position, so key column order matters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use arrow::array::*;
use table_core::{Result, TableError};

/// Writes the value at `row` of `column` into `hasher`.
fn hash_cell(hasher: &mut DefaultHasher, column: &ArrayRef, row: usize) -> Result<()> {
    if column.is_null(row) {
        // tag keeps null from colliding with any real value
        hasher.write_u8(0);
        return Ok(());
    }
    hasher.write_u8(1);

    if let Some(arr) = column.as_any().downcast_ref::<Int64Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Int32Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Int16Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Int8Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt64Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt32Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt16Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt8Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Float64Array>() {
        arr.value(row).to_bits().hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Float32Array>() {
        arr.value(row).to_bits().hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<BooleanArray>() {
        hasher.write_u8(arr.value(row) as u8);
    } else if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
        hasher.write(arr.value(row).as_bytes());
    } else if let Some(arr) = column.as_any().downcast_ref::<LargeStringArray>() {
        hasher.write(arr.value(row).as_bytes());
    } else if let Some(arr) = column.as_any().downcast_ref::<BinaryArray>() {
        hasher.write(arr.value(row));
    } else if let Some(arr) = column.as_any().downcast_ref::<Date32Array>() {
        arr.value(row).hash(hasher);
    } else if let Some(arr) = column.as_any().downcast_ref::<Date64Array>() {
        arr.value(row).hash(hasher);
    } else {
        return Err(TableError::ExecutionError(format!(
            "Unsupported type for hashing: {}",
            column.data_type()
        )));
    }
    Ok(())
}

/// Hashes one row across `columns`, mixing in each column's position.
pub fn row_hash(columns: &[ArrayRef], row: usize) -> Result<u64> {
    let mut hasher = DefaultHasher::new();
    for (position, column) in columns.iter().enumerate() {
        hasher.write_usize(position);
        hash_cell(&mut hasher, column, row)?;
    }
    Ok(hasher.finish())
}

/// Builds the dense partition vector for the key columns: entry `i` is the
/// destination partition of row `i`, in `[0, num_partitions)`.
pub fn build_partition_vector(
    key_columns: &[ArrayRef],
    num_partitions: usize,
) -> Result<Vec<usize>> {
    if key_columns.is_empty() {
        return Err(TableError::Invalid(
            "No key columns given for hash partition".to_string(),
        ));
    }
    if num_partitions == 0 {
        return Err(TableError::Invalid(
            "Number of partitions must be positive".to_string(),
        ));
    }
    let length = key_columns[0].len();
    for column in key_columns {
        if column.len() != length {
            return Err(TableError::IndexError(format!(
                "Column lengths do not match: {} vs {}",
                column.len(),
                length
            )));
        }
    }

    let mut partition_of = Vec::with_capacity(length);
    for row in 0..length {
        partition_of.push((row_hash(key_columns, row)? as usize) % num_partitions);
    }
    Ok(partition_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn int_column(values: Vec<i64>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }

    fn string_column(values: Vec<&str>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    #[test]
    fn test_partition_vector_is_deterministic() {
        let keys = vec![int_column((0..100).collect())];
        let first = build_partition_vector(&keys, 4).unwrap();
        let second = build_partition_vector(&keys, 4).unwrap();
        assert_eq!(first, second);
        assert!(first.iter().all(|&p| p < 4));
    }

    #[test]
    fn test_equal_keys_share_partition() {
        let keys = vec![int_column(vec![7, 3, 7, 3, 7])];
        let partition_of = build_partition_vector(&keys, 3).unwrap();
        assert_eq!(partition_of[0], partition_of[2]);
        assert_eq!(partition_of[0], partition_of[4]);
        assert_eq!(partition_of[1], partition_of[3]);
    }

    #[test]
    fn test_column_order_matters() {
        let a = int_column(vec![1, 2, 3]);
        let b = string_column(vec!["x", "y", "z"]);
        let forward: Vec<u64> = (0..3)
            .map(|row| row_hash(&[a.clone(), b.clone()], row).unwrap())
            .collect();
        let reversed: Vec<u64> = (0..3)
            .map(|row| row_hash(&[b.clone(), a.clone()], row).unwrap())
            .collect();
        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_length_mismatch() {
        let keys = vec![int_column(vec![1, 2, 3]), int_column(vec![1, 2])];
        let result = build_partition_vector(&keys, 2);
        assert!(matches!(result, Err(TableError::IndexError(_))));
    }

    #[test]
    fn test_null_hashes_apart_from_zero() {
        let column: ArrayRef = Arc::new(Int64Array::from(vec![Some(0), None]));
        let zero = row_hash(std::slice::from_ref(&column), 0).unwrap();
        let null = row_hash(std::slice::from_ref(&column), 1).unwrap();
        assert_ne!(zero, null);
    }
}
