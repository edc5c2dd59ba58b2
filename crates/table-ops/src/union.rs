//! Set union of two schema-compatible batches with duplicate elimination.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use table_core::{schemas_compatible, Result, TableError};
use tracing::debug;

use crate::compare::rows_equal;
use crate::hash::row_hash;

/// Transient address of a row: table side (0 = left, 1 = right) and row
/// index inside that side.
type RowAddress = (u8, u32);

/// Hash buckets over row addresses. Hashing and equality run against the
/// two batches handed to `insert`; the set itself holds no table state.
struct RowSet {
    buckets: HashMap<u64, Vec<RowAddress>>,
    kept: Vec<RowAddress>,
}

impl RowSet {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: HashMap::with_capacity(capacity),
            kept: Vec::with_capacity(capacity),
        }
    }

    fn insert(&mut self, sides: [&RecordBatch; 2], side: u8, row: u32) -> Result<()> {
        let batch = sides[side as usize];
        let hash = row_hash(batch.columns(), row as usize)?;
        let bucket = self.buckets.entry(hash).or_default();
        for &(other_side, other_row) in bucket.iter() {
            if rows_equal(
                sides[other_side as usize],
                other_row as usize,
                batch,
                row as usize,
            )? {
                return Ok(());
            }
        }
        bucket.push((side, row));
        self.kept.push((side, row));
        Ok(())
    }
}

/// Set union: duplicates removed under whole-row equality, surviving left
/// rows laid out before surviving right rows, first-occurrence order kept
/// within each side.
pub fn union(left: &RecordBatch, right: &RecordBatch) -> Result<RecordBatch> {
    if !schemas_compatible(left.schema().as_ref(), right.schema().as_ref()) {
        return Err(TableError::Invalid(
            "The fields of the two tables are not similar, cannot perform union".to_string(),
        ));
    }

    let sides = [left, right];
    let capacity = left.num_rows() + right.num_rows();
    debug!(buckets = capacity, "building union row set");
    let mut set = RowSet::with_capacity(capacity);

    // lockstep walk over both sides for a reproducible interleaving
    let max_rows = left.num_rows().max(right.num_rows());
    for row in 0..max_rows {
        if row < left.num_rows() {
            set.insert(sides, 0, row as u32)?;
        }
        if row < right.num_rows() {
            set.insert(sides, 1, row as u32)?;
        }
    }

    let mut indices: [Vec<u32>; 2] = [Vec::new(), Vec::new()];
    for &(side, row) in &set.kept {
        indices[side as usize].push(row);
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(left.num_columns());
    for column_index in 0..left.num_columns() {
        let mut parts: Vec<ArrayRef> = Vec::with_capacity(2);
        for side in 0..2 {
            let take_indices = UInt32Array::from(indices[side].clone());
            parts.push(
                compute::take(sides[side].column(column_index).as_ref(), &take_indices, None)
                    .map_err(|e| TableError::ExecutionError(e.to_string()))?,
            );
        }
        let refs: Vec<&dyn Array> = parts.iter().map(|a| a.as_ref()).collect();
        columns.push(
            compute::concat(&refs).map_err(|e| TableError::ExecutionError(e.to_string()))?,
        );
    }

    // names come from the left side; a column is nullable if either side's is
    let fields: Vec<Field> = left
        .schema()
        .fields()
        .iter()
        .zip(right.schema().fields().iter())
        .map(|(l, r)| {
            Field::new(
                l.name(),
                l.data_type().clone(),
                l.is_nullable() || r.is_nullable(),
            )
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| TableError::ExecutionError(e.to_string()))
}
