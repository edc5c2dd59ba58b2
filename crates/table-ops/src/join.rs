//! Local equi-join kernels over a single key column per side.
//!
//! Both algorithms produce `(left_row, right_row)` index pairs and then
//! materialize the output with the take kernel; outer kinds use null
//! indices, which take turns into null output values.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Builder};
use arrow::compute;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use table_core::{Result, TableError};

use crate::compare::compare_cells;
use crate::hash::row_hash;

/// Join kind, deciding which unmatched rows survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    Hash,
    Sort,
}

/// Configuration for a join: one key column per side, the kind, and the
/// local algorithm used after the shuffle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub left_column: usize,
    pub right_column: usize,
    pub kind: JoinKind,
    pub algorithm: JoinAlgorithm,
}

impl JoinConfig {
    pub fn new(kind: JoinKind, left_column: usize, right_column: usize) -> Self {
        Self {
            left_column,
            right_column,
            kind,
            algorithm: JoinAlgorithm::Hash,
        }
    }

    pub fn inner(left_column: usize, right_column: usize) -> Self {
        Self::new(JoinKind::Inner, left_column, right_column)
    }

    pub fn left(left_column: usize, right_column: usize) -> Self {
        Self::new(JoinKind::Left, left_column, right_column)
    }

    pub fn right(left_column: usize, right_column: usize) -> Self {
        Self::new(JoinKind::Right, left_column, right_column)
    }

    pub fn full(left_column: usize, right_column: usize) -> Self {
        Self::new(JoinKind::Full, left_column, right_column)
    }

    pub fn with_algorithm(mut self, algorithm: JoinAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

type IndexPair = (Option<u32>, Option<u32>);

/// Joins two batches. The output schema is the left fields followed by the
/// right fields, with the outer side's fields marked nullable.
pub fn join(left: &RecordBatch, right: &RecordBatch, config: &JoinConfig) -> Result<RecordBatch> {
    let left_key = left
        .columns()
        .get(config.left_column)
        .cloned()
        .ok_or_else(|| {
            TableError::IndexError(format!(
                "Left join column {} out of range for {} columns",
                config.left_column,
                left.num_columns()
            ))
        })?;
    let right_key = right
        .columns()
        .get(config.right_column)
        .cloned()
        .ok_or_else(|| {
            TableError::IndexError(format!(
                "Right join column {} out of range for {} columns",
                config.right_column,
                right.num_columns()
            ))
        })?;
    if left_key.data_type() != right_key.data_type() {
        return Err(TableError::Invalid(format!(
            "Join key types do not match: {} vs {}",
            left_key.data_type(),
            right_key.data_type()
        )));
    }

    let pairs = match config.algorithm {
        JoinAlgorithm::Hash => hash_join_pairs(&left_key, &right_key, config.kind)?,
        JoinAlgorithm::Sort => sort_merge_pairs(&left_key, &right_key, config.kind)?,
    };
    materialize(left, right, config.kind, &pairs)
}

/// Builds a hash table over the right key column and probes with the left.
/// Null keys never match; unmatched rows are padded per the join kind.
fn hash_join_pairs(
    left_key: &ArrayRef,
    right_key: &ArrayRef,
    kind: JoinKind,
) -> Result<Vec<IndexPair>> {
    let mut table: HashMap<u64, Vec<u32>> = HashMap::with_capacity(right_key.len());
    for row in 0..right_key.len() {
        if right_key.is_null(row) {
            continue;
        }
        let hash = row_hash(std::slice::from_ref(right_key), row)?;
        table.entry(hash).or_default().push(row as u32);
    }

    let mut pairs = Vec::new();
    let mut right_matched = vec![false; right_key.len()];
    for row in 0..left_key.len() {
        let mut matched = false;
        if !left_key.is_null(row) {
            let hash = row_hash(std::slice::from_ref(left_key), row)?;
            if let Some(candidates) = table.get(&hash) {
                for &candidate in candidates {
                    if compare_cells(left_key, row, right_key, candidate as usize)?
                        == Ordering::Equal
                    {
                        pairs.push((Some(row as u32), Some(candidate)));
                        right_matched[candidate as usize] = true;
                        matched = true;
                    }
                }
            }
        }
        if !matched && matches!(kind, JoinKind::Left | JoinKind::Full) {
            pairs.push((Some(row as u32), None));
        }
    }

    if matches!(kind, JoinKind::Right | JoinKind::Full) {
        for (row, matched) in right_matched.iter().enumerate() {
            if !matched {
                pairs.push((None, Some(row as u32)));
            }
        }
    }
    Ok(pairs)
}

/// Orders both key columns, then merges equal-key groups with a two-pointer
/// scan, emitting the cross product per group.
fn sort_merge_pairs(
    left_key: &ArrayRef,
    right_key: &ArrayRef,
    kind: JoinKind,
) -> Result<Vec<IndexPair>> {
    let left_order = compute::sort_to_indices(left_key.as_ref(), None, None)
        .map_err(|e| TableError::ExecutionError(e.to_string()))?;
    let right_order = compute::sort_to_indices(right_key.as_ref(), None, None)
        .map_err(|e| TableError::ExecutionError(e.to_string()))?;
    let left_order: Vec<u32> = left_order.values().to_vec();
    let right_order: Vec<u32> = right_order.values().to_vec();

    let emit_left = matches!(kind, JoinKind::Left | JoinKind::Full);
    let emit_right = matches!(kind, JoinKind::Right | JoinKind::Full);

    let mut pairs = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < left_order.len() && j < right_order.len() {
        let li = left_order[i] as usize;
        let rj = right_order[j] as usize;
        if left_key.is_null(li) {
            if emit_left {
                pairs.push((Some(li as u32), None));
            }
            i += 1;
            continue;
        }
        if right_key.is_null(rj) {
            if emit_right {
                pairs.push((None, Some(rj as u32)));
            }
            j += 1;
            continue;
        }
        match compare_cells(left_key, li, right_key, rj)? {
            Ordering::Less => {
                if emit_left {
                    pairs.push((Some(li as u32), None));
                }
                i += 1;
            }
            Ordering::Greater => {
                if emit_right {
                    pairs.push((None, Some(rj as u32)));
                }
                j += 1;
            }
            Ordering::Equal => {
                let mut i_end = i + 1;
                while i_end < left_order.len() {
                    let next = left_order[i_end] as usize;
                    if left_key.is_null(next)
                        || compare_cells(left_key, next, left_key, li)? != Ordering::Equal
                    {
                        break;
                    }
                    i_end += 1;
                }
                let mut j_end = j + 1;
                while j_end < right_order.len() {
                    let next = right_order[j_end] as usize;
                    if right_key.is_null(next)
                        || compare_cells(right_key, next, right_key, rj)? != Ordering::Equal
                    {
                        break;
                    }
                    j_end += 1;
                }
                for &l in &left_order[i..i_end] {
                    for &r in &right_order[j..j_end] {
                        pairs.push((Some(l), Some(r)));
                    }
                }
                i = i_end;
                j = j_end;
            }
        }
    }
    while i < left_order.len() {
        if emit_left {
            pairs.push((Some(left_order[i]), None));
        }
        i += 1;
    }
    while j < right_order.len() {
        if emit_right {
            pairs.push((None, Some(right_order[j])));
        }
        j += 1;
    }
    Ok(pairs)
}

fn materialize(
    left: &RecordBatch,
    right: &RecordBatch,
    kind: JoinKind,
    pairs: &[IndexPair],
) -> Result<RecordBatch> {
    let mut left_builder = UInt32Builder::with_capacity(pairs.len());
    let mut right_builder = UInt32Builder::with_capacity(pairs.len());
    for (left_row, right_row) in pairs {
        left_builder.append_option(*left_row);
        right_builder.append_option(*right_row);
    }
    let left_indices = left_builder.finish();
    let right_indices = right_builder.finish();

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(left.num_columns() + right.num_columns());
    for column in left.columns() {
        columns.push(
            compute::take(column.as_ref(), &left_indices, None)
                .map_err(|e| TableError::ExecutionError(e.to_string()))?,
        );
    }
    for column in right.columns() {
        columns.push(
            compute::take(column.as_ref(), &right_indices, None)
                .map_err(|e| TableError::ExecutionError(e.to_string()))?,
        );
    }

    let left_nullable = matches!(kind, JoinKind::Right | JoinKind::Full);
    let right_nullable = matches!(kind, JoinKind::Left | JoinKind::Full);
    let mut fields = Vec::with_capacity(columns.len());
    for field in left.schema().fields() {
        fields.push(Field::new(
            field.name(),
            field.data_type().clone(),
            field.is_nullable() || left_nullable,
        ));
    }
    for field in right.schema().fields() {
        fields.push(Field::new(
            field.name(),
            field.data_type().clone(),
            field.is_nullable() || right_nullable,
        ));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| TableError::ExecutionError(e.to_string()))
}
