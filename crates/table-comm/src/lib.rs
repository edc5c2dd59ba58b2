//! Worker-to-worker batch exchange for the table engine.
//!
//! This crate provides the transport seam (`Communicator`/`Channel` with a
//! loopback and an in-process fabric implementation), the framed wire form
//! of batches, the `AllToAll` exchange with FIN-based completion, and the
//! `StreamingJoin` operator built on a pair of exchanges.

pub mod all_to_all;
pub mod channel;
pub mod frame;
pub mod streaming_join;

pub use all_to_all::{AllToAll, BatchCallback, ExchangeOptions};
pub use channel::{Channel, Communicator, LocalCommunicator, MemoryCommunicator, MemoryFabric};
pub use frame::{decode_batch, encode_batch, Frame, FrameHeader, FrameKind};
pub use streaming_join::{JoinCallback, StreamingJoin};

use table_core::Result;

/// Operations driven to completion by repeated progress polls.
pub trait Progressable {
    fn is_complete(&mut self) -> Result<bool>;
}

impl Progressable for AllToAll {
    fn is_complete(&mut self) -> Result<bool> {
        AllToAll::is_complete(self)
    }
}

impl Progressable for StreamingJoin {
    fn is_complete(&mut self) -> Result<bool> {
        StreamingJoin::is_complete(self)
    }
}

/// Polls `op` until it reports completion, yielding the thread between
/// polls instead of spinning.
pub fn run_until_complete(op: &mut dyn Progressable) -> Result<()> {
    while !op.is_complete()? {
        std::thread::yield_now();
    }
    Ok(())
}
