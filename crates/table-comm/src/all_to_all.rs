//! All-to-all record-batch exchange with progress-driven completion.
//!
//! Every peer of an edge inserts batches for its targets and periodically
//! polls `is_complete`, which flushes queued frames, drives the transport
//! and drains received frames into the callback. A peer that has finished
//! inserting sends FIN to every target; the exchange is complete once the
//! local side finished, FIN arrived from every source and both directions
//! are fully drained. A transport error latches the exchange in a terminal
//! failed state.

use std::collections::{HashSet, VecDeque};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use table_core::{schemas_compatible, Result, TableError};
use tracing::{debug, warn};

use crate::channel::{Channel, Communicator};
use crate::frame::{decode_batch, Frame, FrameKind};

/// Receives batches delivered by an exchange. Implemented for closures
/// taking `(source, batch)`.
pub trait BatchCallback {
    /// Called once per delivered batch, from inside `is_complete`. The
    /// return value signals whether the receiver accepted the batch;
    /// refusals are only logged. Must not re-enter the same exchange.
    fn on_receive(&mut self, source: usize, batch: RecordBatch) -> bool;
}

impl<F> BatchCallback for F
where
    F: FnMut(usize, RecordBatch) -> bool,
{
    fn on_receive(&mut self, source: usize, batch: RecordBatch) -> bool {
        self(source, batch)
    }
}

/// Tuning knobs for an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOptions {
    /// Buffered outbound bytes above which `insert` reports would-block.
    /// `None` keeps buffering unbounded.
    pub high_water_mark_bytes: Option<usize>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            high_water_mark_bytes: None,
        }
    }
}

/// Frames flushed and drained per `is_complete` call, keeping the work per
/// poll bounded so callers can interleave data generation with progress.
const FRAMES_PER_POLL: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Running,
    Draining,
    Done,
    Failed,
}

enum Outbound {
    Batch {
        target: usize,
        batch: RecordBatch,
        bytes: usize,
    },
    Fin {
        target: usize,
    },
}

pub struct AllToAll {
    rank: usize,
    sources: Vec<usize>,
    targets: Vec<usize>,
    edge: i32,
    schema: SchemaRef,
    options: ExchangeOptions,
    channel: Option<Box<dyn Channel>>,
    callback: Box<dyn BatchCallback>,
    outbound: VecDeque<Outbound>,
    buffered_bytes: usize,
    fins_received: HashSet<usize>,
    state: ExchangeState,
    failure: Option<String>,
    inserted: usize,
    delivered: usize,
}

impl AllToAll {
    pub fn new(
        communicator: &dyn Communicator,
        sources: Vec<usize>,
        targets: Vec<usize>,
        edge: i32,
        callback: impl BatchCallback + 'static,
        schema: SchemaRef,
    ) -> Result<Self> {
        Self::with_options(
            communicator,
            sources,
            targets,
            edge,
            callback,
            schema,
            ExchangeOptions::default(),
        )
    }

    pub fn with_options(
        communicator: &dyn Communicator,
        sources: Vec<usize>,
        targets: Vec<usize>,
        edge: i32,
        callback: impl BatchCallback + 'static,
        schema: SchemaRef,
        options: ExchangeOptions,
    ) -> Result<Self> {
        let channel = communicator.create_channel(edge)?;
        Ok(Self {
            rank: communicator.rank(),
            sources,
            targets,
            edge,
            schema,
            options,
            channel: Some(channel),
            callback: Box::new(callback),
            outbound: VecDeque::new(),
            buffered_bytes: 0,
            fins_received: HashSet::new(),
            state: ExchangeState::Running,
            failure: None,
            inserted: 0,
            delivered: 0,
        })
    }

    pub fn edge(&self) -> i32 {
        self.edge
    }

    /// Batches accepted by `insert` so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Batches handed to the receive callback so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Queues `batch` for delivery to `target`. Returns `Ok(false)` when
    /// the outbound buffer sits above the high-water mark; drive
    /// `is_complete` and retry.
    pub fn insert(&mut self, batch: &RecordBatch, target: usize) -> Result<bool> {
        match self.state {
            ExchangeState::Running => {}
            ExchangeState::Draining | ExchangeState::Done => {
                return Err(TableError::Invalid(format!(
                    "Insert after finish on edge {}",
                    self.edge
                )))
            }
            ExchangeState::Failed => return Err(self.failure()),
        }
        if !self.targets.contains(&target) {
            return Err(TableError::Invalid(format!(
                "Rank {} is not a target of edge {}",
                target, self.edge
            )));
        }
        if !schemas_compatible(self.schema.as_ref(), batch.schema().as_ref()) {
            return Err(TableError::Invalid(
                "Batch schema does not match the exchange schema".to_string(),
            ));
        }
        if let Some(mark) = self.options.high_water_mark_bytes {
            if self.buffered_bytes >= mark {
                return Ok(false);
            }
        }

        let bytes = batch.get_array_memory_size();
        self.buffered_bytes += bytes;
        self.outbound.push_back(Outbound::Batch {
            target,
            batch: batch.clone(),
            bytes,
        });
        self.inserted += 1;
        Ok(true)
    }

    /// Marks the local side finished and queues one FIN per target behind
    /// all pending batches. Idempotent.
    pub fn finish(&mut self) {
        if self.state != ExchangeState::Running {
            return;
        }
        self.state = ExchangeState::Draining;
        let targets = self.targets.clone();
        for target in targets {
            self.outbound.push_back(Outbound::Fin { target });
        }
        debug!(edge = self.edge, "exchange finished locally");
    }

    /// Drives the exchange one bounded step. True once every peer finished
    /// and all in-flight batches were delivered.
    pub fn is_complete(&mut self) -> Result<bool> {
        match self.state {
            ExchangeState::Done => return Ok(true),
            ExchangeState::Failed => return Err(self.failure()),
            ExchangeState::Running | ExchangeState::Draining => {}
        }

        if let Err(err) = self.advance() {
            let message = err.to_string();
            warn!(edge = self.edge, error = %message, "exchange failed");
            self.state = ExchangeState::Failed;
            self.failure = Some(message);
            return Err(err);
        }

        let done = self.state == ExchangeState::Draining
            && self.outbound.is_empty()
            && self.sources.iter().all(|s| self.fins_received.contains(s));
        if done {
            self.state = ExchangeState::Done;
            debug!(
                edge = self.edge,
                inserted = self.inserted,
                delivered = self.delivered,
                "exchange complete"
            );
        }
        Ok(done)
    }

    fn advance(&mut self) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| TableError::Invalid("Exchange is closed".to_string()))?;

        for _ in 0..FRAMES_PER_POLL {
            let Some(outbound) = self.outbound.pop_front() else {
                break;
            };
            let frame = match outbound {
                Outbound::Batch {
                    target,
                    batch,
                    bytes,
                } => {
                    self.buffered_bytes -= bytes;
                    Frame::batch(self.edge, self.rank, target, &batch)?
                }
                Outbound::Fin { target } => Frame::fin(self.edge, self.rank, target),
            };
            channel.send(frame)?;
        }

        channel.progress()?;

        for _ in 0..FRAMES_PER_POLL {
            let Some(frame) = channel.poll()? else {
                break;
            };
            match frame.header.kind {
                FrameKind::Fin => {
                    self.fins_received.insert(frame.header.source);
                }
                FrameKind::Batch => {
                    let batch = decode_batch(&frame.payload)?;
                    self.delivered += 1;
                    if !self.callback.on_receive(frame.header.source, batch) {
                        debug!(
                            edge = self.edge,
                            source = frame.header.source,
                            "receiver refused batch"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn failure(&self) -> TableError {
        TableError::IoError(
            self.failure
                .clone()
                .unwrap_or_else(|| format!("Exchange on edge {} failed", self.edge)),
        )
    }

    /// Releases the transport channel.
    pub fn close(&mut self) {
        self.channel = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{LocalCommunicator, MemoryFabric};
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]))
    }

    fn create_test_batch(ids: Vec<i64>) -> RecordBatch {
        RecordBatch::try_new(test_schema(), vec![Arc::new(Int64Array::from(ids))]).unwrap()
    }

    fn drive(exchange: &mut AllToAll) {
        while !exchange.is_complete().unwrap() {}
    }

    #[test]
    fn test_self_exchange_delivers_everything() {
        let comm = LocalCommunicator;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let mut exchange = AllToAll::new(
            &comm,
            vec![0],
            vec![0],
            0,
            move |source: usize, batch: RecordBatch| {
                sink.lock().push((source, batch));
                true
            },
            test_schema(),
        )
        .unwrap();

        for start in 0..10i64 {
            assert!(exchange.insert(&create_test_batch(vec![start]), 0).unwrap());
        }
        exchange.finish();
        drive(&mut exchange);
        exchange.close();

        assert_eq!(exchange.inserted(), 10);
        assert_eq!(exchange.delivered(), 10);

        // FIFO per (source, target)
        let received = received.lock();
        for (index, (source, batch)) in received.iter().enumerate() {
            assert_eq!(*source, 0);
            let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
            assert_eq!(ids.value(0), index as i64);
        }
    }

    #[test]
    fn test_insert_after_finish_fails() {
        let comm = LocalCommunicator;
        let mut exchange = AllToAll::new(
            &comm,
            vec![0],
            vec![0],
            0,
            |_: usize, _: RecordBatch| true,
            test_schema(),
        )
        .unwrap();

        exchange.finish();
        exchange.finish(); // idempotent
        let result = exchange.insert(&create_test_batch(vec![1]), 0);
        assert!(matches!(result, Err(TableError::Invalid(_))));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let comm = LocalCommunicator;
        let mut exchange = AllToAll::new(
            &comm,
            vec![0],
            vec![0],
            0,
            |_: usize, _: RecordBatch| true,
            test_schema(),
        )
        .unwrap();

        let other = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            other,
            vec![Arc::new(arrow::array::StringArray::from(vec!["x"]))],
        )
        .unwrap();
        assert!(matches!(
            exchange.insert(&batch, 0),
            Err(TableError::Invalid(_))
        ));
    }

    #[test]
    fn test_backpressure_reports_would_block() {
        let comm = LocalCommunicator;
        let mut exchange = AllToAll::with_options(
            &comm,
            vec![0],
            vec![0],
            0,
            |_: usize, _: RecordBatch| true,
            test_schema(),
            ExchangeOptions {
                high_water_mark_bytes: Some(1),
            },
        )
        .unwrap();

        let batch = create_test_batch(vec![1, 2, 3]);
        assert!(exchange.insert(&batch, 0).unwrap());
        // buffer is now above the mark
        assert!(!exchange.insert(&batch, 0).unwrap());

        // progress drains the buffer and insert goes through again
        exchange.is_complete().unwrap();
        assert!(exchange.insert(&batch, 0).unwrap());

        exchange.finish();
        drive(&mut exchange);
        assert_eq!(exchange.delivered(), 2);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let comm = LocalCommunicator;
        let mut exchange = AllToAll::new(
            &comm,
            vec![0],
            vec![0],
            0,
            |_: usize, _: RecordBatch| true,
            test_schema(),
        )
        .unwrap();
        assert!(matches!(
            exchange.insert(&create_test_batch(vec![1]), 3),
            Err(TableError::Invalid(_))
        ));
    }

    #[test]
    fn test_two_workers_counts_match() {
        let comms = MemoryFabric::new(2);
        let mut handles = Vec::new();
        for comm in comms {
            handles.push(std::thread::spawn(move || {
                let rank = comm.rank();
                let received = Arc::new(Mutex::new(0usize));
                let sink = Arc::clone(&received);
                let mut exchange = AllToAll::new(
                    &comm,
                    vec![0, 1],
                    vec![0, 1],
                    5,
                    move |_: usize, batch: RecordBatch| {
                        *sink.lock() += batch.num_rows();
                        true
                    },
                    test_schema(),
                )
                .unwrap();

                for round in 0..4i64 {
                    let batch = create_test_batch(vec![round, round + 10]);
                    let target = (round as usize + rank) % 2;
                    while !exchange.insert(&batch, target).unwrap() {
                        exchange.is_complete().unwrap();
                    }
                    exchange.is_complete().unwrap();
                }
                exchange.finish();
                while !exchange.is_complete().unwrap() {
                    std::thread::yield_now();
                }
                exchange.close();
                let total = *received.lock();
                total
            }));
        }

        let totals: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // 2 workers x 4 rounds x 2 rows, every inserted row delivered once
        assert_eq!(totals.iter().sum::<usize>(), 16);
    }
}
