//! Splits a batch into per-partition batches following a partition vector.
//!
//! Rows keep their original relative order inside each partition, which the
//! shuffle relies on to preserve per-source FIFO semantics end to end.

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute;
use arrow::record_batch::RecordBatch;
use table_core::{Result, TableError};

/// Gathers each partition's rows into its own batch. Every partition index
/// gets an output batch, possibly empty.
pub fn split_by_partition(
    batch: &RecordBatch,
    partition_of: &[usize],
    num_partitions: usize,
) -> Result<Vec<RecordBatch>> {
    if partition_of.len() != batch.num_rows() {
        return Err(TableError::IndexError(format!(
            "Partition vector has {} entries for {} rows",
            partition_of.len(),
            batch.num_rows()
        )));
    }

    let mut assignments: Vec<Vec<u32>> = vec![Vec::new(); num_partitions];
    for (row, &partition) in partition_of.iter().enumerate() {
        let rows = assignments.get_mut(partition).ok_or_else(|| {
            TableError::IndexError(format!(
                "Partition {} out of range for {} partitions",
                partition, num_partitions
            ))
        })?;
        rows.push(row as u32);
    }

    let mut outputs = Vec::with_capacity(num_partitions);
    for rows in assignments {
        let indices = UInt32Array::from(rows);
        let columns: Vec<ArrayRef> = batch
            .columns()
            .iter()
            .map(|column| compute::take(column.as_ref(), &indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TableError::ExecutionError(e.to_string()))?;
        outputs.push(
            RecordBatch::try_new(batch.schema(), columns)
                .map_err(|e| TableError::ExecutionError(e.to_string()))?,
        );
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![0, 1, 2, 3, 4, 5])),
                Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e", "f"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_split_preserves_relative_order() {
        let batch = create_test_batch();
        let partition_of = vec![0, 1, 0, 1, 0, 1];

        let parts = split_by_partition(&batch, &partition_of, 2).unwrap();
        assert_eq!(parts.len(), 2);

        let ids0 = parts[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids0.values(), &[0, 2, 4]);

        let ids1 = parts[1]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids1.values(), &[1, 3, 5]);
    }

    #[test]
    fn test_split_is_a_permutation() {
        let batch = create_test_batch();
        let partition_of = vec![2, 0, 1, 2, 0, 1];

        let parts = split_by_partition(&batch, &partition_of, 3).unwrap();
        let total: usize = parts.iter().map(|p| p.num_rows()).sum();
        assert_eq!(total, batch.num_rows());
    }

    #[test]
    fn test_empty_partitions_present() {
        let batch = create_test_batch();
        let partition_of = vec![0; 6];

        let parts = split_by_partition(&batch, &partition_of, 4).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].num_rows(), 6);
        assert_eq!(parts[1].num_rows(), 0);
    }

    #[test]
    fn test_partition_out_of_range() {
        let batch = create_test_batch();
        let partition_of = vec![0, 1, 2, 3, 4, 9];
        let result = split_by_partition(&batch, &partition_of, 5);
        assert!(matches!(result, Err(TableError::IndexError(_))));
    }
}
