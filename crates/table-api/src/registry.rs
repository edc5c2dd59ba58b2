//! Context-owned table registry addressed by UUID strings.
//!
//! The registry owns one reference per registered table and keeps it
//! reachable until it is removed. Ids are never reused: every registration
//! draws a fresh v4 UUID.

use std::collections::HashMap;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parking_lot::RwLock;
use table_core::{Result, TableError};
use uuid::Uuid;

/// An owned in-memory table: a schema plus its ordered batches. Logically
/// the table is the concatenation of the batches.
#[derive(Debug, Clone)]
pub struct TableData {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl TableData {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// Combines the chunks into one contiguous batch.
    pub fn combine(&self) -> Result<RecordBatch> {
        concat_batches(&self.schema, self.batches.iter())
            .map_err(|e| TableError::ExecutionError(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<HashMap<String, TableData>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `table` under a fresh UUID and returns the id.
    pub fn put(&self, table: TableData) -> String {
        let id = Uuid::new_v4().to_string();
        self.tables.write().insert(id.clone(), table);
        id
    }

    /// Registers `table` under a caller-chosen id.
    pub fn put_with_id(&self, id: impl Into<String>, table: TableData) {
        self.tables.write().insert(id.into(), table);
    }

    pub fn get(&self, id: &str) -> Option<TableData> {
        self.tables.read().get(id).cloned()
    }

    /// Like `get` but fails with `KeyError` on a missing id.
    pub fn fetch(&self, id: &str) -> Result<TableData> {
        self.get(id)
            .ok_or_else(|| TableError::KeyError(format!("No table registered under {}", id)))
    }

    /// Removes the table; returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        self.tables.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn create_test_table() -> TableData {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap();
        TableData::from_batch(batch)
    }

    #[test]
    fn test_put_get_remove() {
        let registry = TableRegistry::new();
        let id = registry.put(create_test_table());

        let table = registry.get(&id).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 1);

        assert!(registry.remove(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.remove(&id));
    }

    #[test]
    fn test_fetch_missing_is_key_error() {
        let registry = TableRegistry::new();
        assert!(matches!(
            registry.fetch("no-such-id"),
            Err(TableError::KeyError(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = TableRegistry::new();
        let a = registry.put(create_test_table());
        let b = registry.put(create_test_table());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_combine_chunks() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let one = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        )
        .unwrap();
        let two =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![3]))])
                .unwrap();

        let table = TableData::new(schema, vec![one, two]);
        let combined = table.combine().unwrap();
        assert_eq!(combined.num_rows(), 3);
    }
}
