//! Execution context: group membership, the edge-id sequence and the
//! table registry.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use table_comm::{Communicator, LocalCommunicator};

use crate::registry::TableRegistry;

pub struct Context {
    communicator: Box<dyn Communicator>,
    registry: TableRegistry,
    sequence: AtomicI32,
}

impl Context {
    /// Loopback context for a group of one.
    pub fn init_local() -> Arc<Self> {
        Self::init_distributed(LocalCommunicator)
    }

    /// Context over a ranked transport group. The group is static for the
    /// lifetime of the context.
    pub fn init_distributed(communicator: impl Communicator + 'static) -> Arc<Self> {
        Arc::new(Self {
            communicator: Box::new(communicator),
            registry: TableRegistry::new(),
            sequence: AtomicI32::new(0),
        })
    }

    pub fn rank(&self) -> usize {
        self.communicator.rank()
    }

    pub fn world_size(&self) -> usize {
        self.communicator.world_size()
    }

    /// Ranks of the group, optionally including this worker.
    pub fn neighbours(&self, include_self: bool) -> Vec<usize> {
        (0..self.world_size())
            .filter(|&rank| include_self || rank != self.rank())
            .collect()
    }

    /// Monotone edge-id sequence; every concurrently-live exchange needs
    /// its own value.
    pub fn next_sequence(&self) -> i32 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn communicator(&self) -> &dyn Communicator {
        self.communicator.as_ref()
    }

    pub fn finalize(&self) {
        self.communicator.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_comm::MemoryFabric;

    #[test]
    fn test_local_context() {
        let ctx = Context::init_local();
        assert_eq!(ctx.rank(), 0);
        assert_eq!(ctx.world_size(), 1);
        assert_eq!(ctx.neighbours(true), vec![0]);
        assert!(ctx.neighbours(false).is_empty());
    }

    #[test]
    fn test_sequence_is_monotone() {
        let ctx = Context::init_local();
        let a = ctx.next_sequence();
        let b = ctx.next_sequence();
        let c = ctx.next_sequence();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_neighbours_excluding_self() {
        let comms = MemoryFabric::new(3);
        let ctx = Context::init_distributed(comms.into_iter().nth(1).unwrap());
        assert_eq!(ctx.rank(), 1);
        assert_eq!(ctx.neighbours(true), vec![0, 1, 2]);
        assert_eq!(ctx.neighbours(false), vec![0, 2]);
    }
}
