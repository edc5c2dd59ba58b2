//! UUID-addressed handle over a registered table.
//!
//! A handle keeps its registry entry alive; dropping the handle removes
//! the entry. Operators return new handles, the inputs stay registered.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use table_core::Result;
use table_ops::join::JoinConfig;
use table_ops::row::Row;
use table_storage::csv::{CsvReadOptions, CsvWriteOptions};
use uuid::Uuid;

use crate::context::Context;
use crate::ops;
use crate::registry::TableData;

pub struct Table {
    id: String,
    ctx: Arc<Context>,
}

impl Table {
    fn wrap(ctx: &Arc<Context>, id: String) -> Self {
        Self {
            id,
            ctx: Arc::clone(ctx),
        }
    }

    fn fresh_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Reads a CSV file into a new table.
    pub fn from_csv(ctx: &Arc<Context>, path: &str, options: &CsvReadOptions) -> Result<Self> {
        let id = Self::fresh_id();
        ops::read_csv(ctx, path, &id, options)?;
        Ok(Self::wrap(ctx, id))
    }

    /// Registers batches as a new table after validating the column types.
    pub fn from_batches(
        ctx: &Arc<Context>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self> {
        let id = ops::from_batches(ctx, schema, batches)?;
        Ok(Self::wrap(ctx, id))
    }

    pub fn from_batch(ctx: &Arc<Context>, batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        Self::from_batches(ctx, schema, vec![batch])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rows(&self) -> Result<usize> {
        ops::row_count(&self.ctx, &self.id)
    }

    pub fn columns(&self) -> Result<usize> {
        ops::column_count(&self.ctx, &self.id)
    }

    /// Snapshot of the table's schema and batches.
    pub fn data(&self) -> Result<TableData> {
        self.ctx.registry().fetch(&self.id)
    }

    pub fn write_csv(&self, path: &str, options: &CsvWriteOptions) -> Result<()> {
        ops::write_csv(&self.ctx, &self.id, path, options)
    }

    pub fn print(&self) -> Result<()> {
        ops::print(&self.ctx, &self.id)
    }

    pub fn sort(&self, column_index: usize) -> Result<Table> {
        let id = Self::fresh_id();
        ops::sort_table(&self.ctx, &self.id, &id, column_index)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    /// Splits into per-partition tables by key hash, ordered by partition.
    pub fn hash_partition(
        &self,
        hash_columns: &[usize],
        num_partitions: usize,
    ) -> Result<Vec<Table>> {
        let mut parts: Vec<(usize, String)> =
            ops::hash_partition(&self.ctx, &self.id, hash_columns, num_partitions)?
                .into_iter()
                .collect();
        parts.sort_by_key(|(partition, _)| *partition);
        Ok(parts
            .into_iter()
            .map(|(_, id)| Self::wrap(&self.ctx, id))
            .collect())
    }

    pub fn join(&self, right: &Table, config: &JoinConfig) -> Result<Table> {
        let id = Self::fresh_id();
        ops::join_tables(&self.ctx, &self.id, &right.id, config, &id)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    pub fn distributed_join(&self, right: &Table, config: &JoinConfig) -> Result<Table> {
        let id = Self::fresh_id();
        ops::distributed_join(&self.ctx, &self.id, &right.id, config, &id)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    pub fn union(&self, right: &Table) -> Result<Table> {
        let id = Self::fresh_id();
        ops::union_tables(&self.ctx, &self.id, &right.id, &id)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    pub fn distributed_union(&self, right: &Table) -> Result<Table> {
        let id = Self::fresh_id();
        ops::distributed_union(&self.ctx, &self.id, &right.id, &id)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    pub fn select<F>(&self, predicate: F) -> Result<Table>
    where
        F: Fn(&Row) -> bool,
    {
        let id = Self::fresh_id();
        ops::select(&self.ctx, &self.id, &id, predicate)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    pub fn project(&self, column_indices: &[usize]) -> Result<Table> {
        let id = Self::fresh_id();
        ops::project(&self.ctx, &self.id, column_indices, &id)?;
        Ok(Self::wrap(&self.ctx, id))
    }

    /// Concatenates tables with identical schema into one table.
    pub fn merge(ctx: &Arc<Context>, tables: &[Table]) -> Result<Table> {
        let ids: Vec<String> = tables.iter().map(|t| t.id.clone()).collect();
        let id = Self::fresh_id();
        ops::merge_tables(ctx, &ids, &id)?;
        Ok(Self::wrap(ctx, id))
    }

    /// Removes the registry entry now instead of at drop.
    pub fn clear(&self) {
        self.ctx.registry().remove(&self.id);
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.ctx.registry().remove(&self.id);
    }
}
