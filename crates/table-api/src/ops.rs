//! Table-level operations over the registry, the local kernels and the
//! all-to-all exchange.
//!
//! Operations address tables by their registry id and register their
//! output under a caller-chosen destination id. A failed operation leaves
//! the destination unregistered; intermediate tables created along the way
//! are removed on success and on error.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::datatypes::{FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty;
use parking_lot::Mutex;
use table_comm::{run_until_complete, AllToAll};
use table_core::{schemas_compatible, validate_supported, Result, TableError};
use table_ops::join::JoinConfig;
use table_ops::row::Row;
use table_storage::csv::{CsvReadOptions, CsvWriteOptions};
use tracing::{debug, info};

use crate::context::Context;
use crate::registry::TableData;

/// Registers batches as a new table after validating the column types.
pub fn from_batches(
    ctx: &Context,
    schema: arrow::datatypes::SchemaRef,
    batches: Vec<RecordBatch>,
) -> Result<String> {
    validate_supported(schema.as_ref())?;
    Ok(ctx.registry().put(TableData::new(schema, batches)))
}

pub fn row_count(ctx: &Context, id: &str) -> Result<usize> {
    Ok(ctx.registry().fetch(id)?.num_rows())
}

pub fn column_count(ctx: &Context, id: &str) -> Result<usize> {
    Ok(ctx.registry().fetch(id)?.num_columns())
}

/// Reads one CSV file into the registry under `id`.
pub fn read_csv(ctx: &Context, path: &str, id: &str, options: &CsvReadOptions) -> Result<()> {
    let (schema, batches) = table_storage::csv::read_csv(path, options)?;
    ctx.registry().put_with_id(id, TableData::new(schema, batches));
    Ok(())
}

/// Reads a list of CSV files, each into its own registry slot. With
/// `concurrent_file_reads` every file gets a worker thread; the threads
/// join before this returns and the first failure wins.
pub fn read_csv_list(
    ctx: &Arc<Context>,
    paths: &[String],
    ids: &[String],
    options: &CsvReadOptions,
) -> Result<()> {
    if paths.len() != ids.len() {
        return Err(TableError::Invalid(
            "Size of paths and ids mismatch".to_string(),
        ));
    }

    if options.concurrent_file_reads {
        let mut handles = Vec::with_capacity(paths.len());
        for (path, id) in paths.iter().zip(ids) {
            let ctx = Arc::clone(ctx);
            let path = path.clone();
            let id = id.clone();
            let options = options.clone();
            handles.push(thread::spawn(move || read_csv(&ctx, &path, &id, &options)));
        }
        let mut all_passed = true;
        let mut first_error = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    all_passed = false;
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    all_passed = false;
                    first_error
                        .get_or_insert(TableError::UnknownError("CSV reader panicked".to_string()));
                }
            }
        }
        if all_passed {
            Ok(())
        } else {
            Err(first_error
                .unwrap_or_else(|| TableError::IoError("Failed to read the csv files".to_string())))
        }
    } else {
        for (path, id) in paths.iter().zip(ids) {
            read_csv(ctx, path, id, options)?;
        }
        Ok(())
    }
}

pub fn write_csv(ctx: &Context, id: &str, path: &str, options: &CsvWriteOptions) -> Result<()> {
    let table = ctx.registry().fetch(id)?;
    table_storage::csv::write_csv(path, &table.schema, &table.batches, options)
}

/// Pretty-prints the table to stdout.
pub fn print(ctx: &Context, id: &str) -> Result<()> {
    let table = ctx.registry().fetch(id)?;
    pretty::print_batches(&table.batches).map_err(|e| TableError::ExecutionError(e.to_string()))
}

/// Splits the table into `num_partitions` tables by key hash; every input
/// row lands in exactly one output, partitions keep original row order.
pub fn hash_partition(
    ctx: &Context,
    id: &str,
    hash_columns: &[usize],
    num_partitions: usize,
) -> Result<HashMap<usize, String>> {
    let table = ctx.registry().fetch(id)?;
    let combined = table.combine()?;

    let key_columns: Vec<ArrayRef> = hash_columns
        .iter()
        .map(|&column| {
            combined.columns().get(column).cloned().ok_or_else(|| {
                TableError::IndexError(format!(
                    "Hash column {} out of range for {} columns",
                    column,
                    combined.num_columns()
                ))
            })
        })
        .collect::<Result<_>>()?;
    let partition_of = table_ops::build_partition_vector(&key_columns, num_partitions)?;
    let parts = table_ops::split_by_partition(&combined, &partition_of, num_partitions)?;

    let mut out = HashMap::with_capacity(num_partitions);
    for (partition, batch) in parts.into_iter().enumerate() {
        out.insert(partition, ctx.registry().put(TableData::from_batch(batch)));
    }
    Ok(out)
}

/// Colocates rows sharing a key hash: partitions locally into `world_size`
/// buckets and swaps them over an all-to-all exchange on `edge`. The local
/// bucket bypasses the transport.
pub fn shuffle(ctx: &Context, id: &str, hash_columns: &[usize], edge: i32) -> Result<TableData> {
    let table = ctx.registry().fetch(id)?;
    let partitioned = hash_partition(ctx, id, hash_columns, ctx.world_size())?;

    let received: Arc<Mutex<Vec<RecordBatch>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let neighbours = ctx.neighbours(true);
    let mut exchange = AllToAll::new(
        ctx.communicator(),
        neighbours.clone(),
        neighbours,
        edge,
        move |_source: usize, batch: RecordBatch| {
            sink.lock().push(batch);
            true
        },
        Arc::clone(&table.schema),
    )?;

    let exchanged: Result<()> = (|| {
        for (&partition, partition_id) in &partitioned {
            let part = ctx.registry().fetch(partition_id)?;
            if partition == ctx.rank() {
                received.lock().extend(part.batches.iter().cloned());
            } else {
                for batch in &part.batches {
                    while !exchange.insert(batch, partition)? {
                        exchange.is_complete()?;
                    }
                }
            }
        }
        exchange.finish();
        run_until_complete(&mut exchange)?;
        Ok(())
    })();
    exchange.close();
    for partition_id in partitioned.values() {
        ctx.registry().remove(partition_id);
    }
    exchanged?;

    let batches = {
        let mut guard = received.lock();
        std::mem::take(&mut *guard)
    };
    info!(edge, tables = batches.len(), "concatenating shuffled tables");
    let combined = concat_batches(&table.schema, batches.iter())
        .map_err(|e| TableError::ExecutionError(e.to_string()))?;
    Ok(TableData::from_batch(combined))
}

/// Shuffles two tables one after the other on fresh edge ids, so the left
/// exchange fully drains before the right one starts.
pub fn shuffle_two(
    ctx: &Context,
    left_id: &str,
    left_columns: &[usize],
    right_id: &str,
    right_columns: &[usize],
) -> Result<(TableData, TableData)> {
    let left = shuffle(ctx, left_id, left_columns, ctx.next_sequence())?;
    debug!("left table shuffled");
    let right = shuffle(ctx, right_id, right_columns, ctx.next_sequence())?;
    Ok((left, right))
}

/// Local join of two registered tables into `dest_id`.
pub fn join_tables(
    ctx: &Context,
    left_id: &str,
    right_id: &str,
    config: &JoinConfig,
    dest_id: &str,
) -> Result<()> {
    let left = ctx.registry().fetch(left_id)?;
    let right = ctx.registry().fetch(right_id)?;
    let result = table_ops::join(&left.combine()?, &right.combine()?, config)?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(result));
    Ok(())
}

/// Distributed join: shuffles both sides on their key columns so matching
/// keys colocate, then joins locally.
pub fn distributed_join(
    ctx: &Context,
    left_id: &str,
    right_id: &str,
    config: &JoinConfig,
    dest_id: &str,
) -> Result<()> {
    if ctx.world_size() == 1 {
        return join_tables(ctx, left_id, right_id, config, dest_id);
    }

    let (left, right) = shuffle_two(
        ctx,
        left_id,
        &[config.left_column],
        right_id,
        &[config.right_column],
    )?;
    let result = table_ops::join(&left.combine()?, &right.combine()?, config)?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(result));
    Ok(())
}

/// Local set union into `dest_id`.
pub fn union_tables(ctx: &Context, left_id: &str, right_id: &str, dest_id: &str) -> Result<()> {
    let left = ctx.registry().fetch(left_id)?;
    let right = ctx.registry().fetch(right_id)?;
    let result = table_ops::union(&left.combine()?, &right.combine()?)?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(result));
    Ok(())
}

/// Distributed union: shuffles both inputs hashing all columns so that
/// identical rows colocate, then unions locally.
pub fn distributed_union(
    ctx: &Context,
    left_id: &str,
    right_id: &str,
    dest_id: &str,
) -> Result<()> {
    if ctx.world_size() == 1 {
        return union_tables(ctx, left_id, right_id, dest_id);
    }

    let left = ctx.registry().fetch(left_id)?;
    let right = ctx.registry().fetch(right_id)?;
    if !schemas_compatible(left.schema.as_ref(), right.schema.as_ref()) {
        return Err(TableError::Invalid(
            "The fields of the two tables are not similar, cannot perform union".to_string(),
        ));
    }

    let all_columns: Vec<usize> = (0..left.num_columns()).collect();
    let (left_shuffled, right_shuffled) =
        shuffle_two(ctx, left_id, &all_columns, right_id, &all_columns)?;

    let left_tmp = ctx.registry().put(left_shuffled);
    let right_tmp = ctx.registry().put(right_shuffled);
    let result = union_tables(ctx, &left_tmp, &right_tmp, dest_id);
    ctx.registry().remove(&left_tmp);
    ctx.registry().remove(&right_tmp);
    result
}

/// Stable sort on one column into `dest_id`.
pub fn sort_table(ctx: &Context, id: &str, dest_id: &str, column_index: usize) -> Result<()> {
    let table = ctx.registry().fetch(id)?;
    let sorted = table_ops::sort_by_column(&table.combine()?, column_index)?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(sorted));
    Ok(())
}

/// Concatenates tables with identical schema into one contiguous batch.
pub fn merge_tables(ctx: &Context, ids: &[String], dest_id: &str) -> Result<()> {
    let mut schema = None;
    let mut batches = Vec::new();
    for id in ids {
        let table = ctx.registry().fetch(id)?;
        schema.get_or_insert_with(|| Arc::clone(&table.schema));
        batches.extend(table.batches.iter().cloned());
    }
    let schema = schema.ok_or_else(|| TableError::Invalid("No tables to merge".to_string()))?;
    let combined = concat_batches(&schema, batches.iter())
        .map_err(|e| TableError::ExecutionError(e.to_string()))?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(combined));
    Ok(())
}

/// Keeps the rows for which `predicate` holds.
pub fn select<F>(ctx: &Context, id: &str, dest_id: &str, predicate: F) -> Result<()>
where
    F: Fn(&Row) -> bool,
{
    let table = ctx.registry().fetch(id)?;
    let result = table_ops::select(&table.combine()?, predicate)?;
    ctx.registry()
        .put_with_id(dest_id, TableData::from_batch(result));
    Ok(())
}

/// Keeps only the listed columns, preserving the table's chunking.
pub fn project(ctx: &Context, id: &str, column_indices: &[usize], dest_id: &str) -> Result<()> {
    let table = ctx.registry().fetch(id)?;
    let mut fields: Vec<FieldRef> = Vec::with_capacity(column_indices.len());
    for &column in column_indices {
        let field = table.schema.fields().get(column).ok_or_else(|| {
            TableError::IndexError(format!(
                "Projection column {} out of range for {} columns",
                column,
                table.num_columns()
            ))
        })?;
        fields.push(field.clone());
    }
    let mut batches = Vec::with_capacity(table.batches.len());
    for batch in &table.batches {
        batches.push(table_ops::project(batch, column_indices)?);
    }
    ctx.registry().put_with_id(
        dest_id,
        TableData::new(Arc::new(Schema::new(fields)), batches),
    );
    Ok(())
}
