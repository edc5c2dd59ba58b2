//! Streaming distributed join over a pair of exchanges.
//!
//! Each side of the join has its own all-to-all edge. Workers insert
//! locally produced batches into either side while polling `is_complete`;
//! the first poll after both exchanges drain runs the local join over the
//! received sides and hands the result to the callback, exactly once.

use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use table_core::{Result, TableError};
use table_ops::join::{join, JoinConfig};
use tracing::{debug, info};

use crate::all_to_all::AllToAll;
use crate::channel::Communicator;

/// Receives the joined table once both sides complete. Implemented for
/// closures taking the result batch.
pub trait JoinCallback {
    /// The return value signals whether the consumer accepted the result;
    /// refusals are only logged. Must not re-enter the operator.
    fn on_join(&mut self, result: RecordBatch) -> bool;
}

impl<F> JoinCallback for F
where
    F: FnMut(RecordBatch) -> bool,
{
    fn on_join(&mut self, result: RecordBatch) -> bool {
        self(result)
    }
}

pub struct StreamingJoin {
    left: AllToAll,
    right: AllToAll,
    left_received: Arc<Mutex<Vec<RecordBatch>>>,
    right_received: Arc<Mutex<Vec<RecordBatch>>>,
    schema: SchemaRef,
    config: JoinConfig,
    callback: Box<dyn JoinCallback>,
    joined: bool,
}

impl StreamingJoin {
    /// Both sides share `schema`; `left_edge` and `right_edge` must be two
    /// distinct live edge ids agreed on by every peer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        communicator: &dyn Communicator,
        sources: Vec<usize>,
        targets: Vec<usize>,
        left_edge: i32,
        right_edge: i32,
        config: JoinConfig,
        callback: impl JoinCallback + 'static,
        schema: SchemaRef,
    ) -> Result<Self> {
        let left_received = Arc::new(Mutex::new(Vec::new()));
        let right_received = Arc::new(Mutex::new(Vec::new()));

        let left_sink = Arc::clone(&left_received);
        let left = AllToAll::new(
            communicator,
            sources.clone(),
            targets.clone(),
            left_edge,
            move |_source: usize, batch: RecordBatch| {
                left_sink.lock().push(batch);
                true
            },
            Arc::clone(&schema),
        )?;

        let right_sink = Arc::clone(&right_received);
        let right = AllToAll::new(
            communicator,
            sources,
            targets,
            right_edge,
            move |_source: usize, batch: RecordBatch| {
                right_sink.lock().push(batch);
                true
            },
            Arc::clone(&schema),
        )?;

        Ok(Self {
            left,
            right,
            left_received,
            right_received,
            schema,
            config,
            callback: Box::new(callback),
            joined: false,
        })
    }

    pub fn left_insert(&mut self, batch: &RecordBatch, target: usize) -> Result<bool> {
        self.left.insert(batch, target)
    }

    pub fn right_insert(&mut self, batch: &RecordBatch, target: usize) -> Result<bool> {
        self.right.insert(batch, target)
    }

    /// Finishes both sides.
    pub fn finish(&mut self) {
        self.left.finish();
        self.right.finish();
    }

    /// Advances both exchanges. The first time both report done, joins the
    /// received sides locally and invokes the callback; errors along the
    /// way suppress the callback.
    pub fn is_complete(&mut self) -> Result<bool> {
        let left_done = self.left.is_complete()?;
        let right_done = self.right.is_complete()?;
        if !(left_done && right_done) {
            return Ok(false);
        }

        if !self.joined {
            let left_table = {
                let batches = self.left_received.lock();
                concat_batches(&self.schema, batches.iter())
                    .map_err(|e| TableError::ExecutionError(e.to_string()))?
            };
            let right_table = {
                let batches = self.right_received.lock();
                concat_batches(&self.schema, batches.iter())
                    .map_err(|e| TableError::ExecutionError(e.to_string()))?
            };
            let result = join(&left_table, &right_table, &self.config)?;
            info!(rows = result.num_rows(), "streaming join complete");
            if !self.callback.on_join(result) {
                debug!("join consumer refused result");
            }
            self.joined = true;
        }
        Ok(true)
    }

    /// Releases both exchanges.
    pub fn close(&mut self) {
        self.left.close();
        self.right.close();
    }
}
