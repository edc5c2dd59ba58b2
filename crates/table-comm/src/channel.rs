//! Point-to-point transport between ranked peers.
//!
//! A `Communicator` owns the group bookkeeping and creates one `Channel`
//! per exchange edge; a `Channel` moves frames without blocking and is
//! advanced by polling `progress`. Two transports are provided: a loopback
//! for groups of one and an in-process fabric that wires ranks together
//! over `std::sync::mpsc` for SPMD worker threads.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use parking_lot::Mutex;
use table_core::{Result, TableError};

use crate::frame::Frame;

/// Non-blocking frame transport for one exchange edge.
pub trait Channel: Send {
    /// Queues `frame` for its target.
    fn send(&mut self, frame: Frame) -> Result<()>;

    /// Takes the next delivered frame, if any.
    fn poll(&mut self) -> Result<Option<Frame>>;

    /// Drives outstanding transport work.
    fn progress(&mut self) -> Result<()>;
}

/// A ranked process group able to open per-edge channels.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Opens this rank's endpoint of the edge. Every peer of the exchange
    /// must open the same edge exactly once.
    fn create_channel(&self, edge: i32) -> Result<Box<dyn Channel>>;

    fn finalize(&self) {}
}

/// Loopback transport for a group of one.
pub struct LocalCommunicator;

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn create_channel(&self, _edge: i32) -> Result<Box<dyn Channel>> {
        Ok(Box::new(LoopbackChannel {
            queue: VecDeque::new(),
        }))
    }
}

struct LoopbackChannel {
    queue: VecDeque<Frame>,
}

impl Channel for LoopbackChannel {
    fn send(&mut self, frame: Frame) -> Result<()> {
        if frame.header.target != 0 {
            return Err(TableError::IoError(format!(
                "No peer {} in a loopback group",
                frame.header.target
            )));
        }
        self.queue.push_back(frame);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Frame>> {
        Ok(self.queue.pop_front())
    }

    fn progress(&mut self) -> Result<()> {
        Ok(())
    }
}

struct EdgeMesh {
    senders: Vec<Sender<Frame>>,
    receivers: Vec<Option<Receiver<Frame>>>,
}

struct FabricInner {
    world_size: usize,
    meshes: Mutex<HashMap<i32, EdgeMesh>>,
}

/// In-process ranked group. Each edge gets its own mpsc mesh; the
/// per-sender FIFO of `std::sync::mpsc` provides the per-(source, target)
/// ordering guarantee of the exchange.
pub struct MemoryFabric;

impl MemoryFabric {
    /// Creates one communicator per rank of a `world_size` group. Move each
    /// into its worker thread.
    pub fn new(world_size: usize) -> Vec<MemoryCommunicator> {
        let inner = Arc::new(FabricInner {
            world_size,
            meshes: Mutex::new(HashMap::new()),
        });
        (0..world_size)
            .map(|rank| MemoryCommunicator {
                rank,
                fabric: Arc::clone(&inner),
            })
            .collect()
    }
}

pub struct MemoryCommunicator {
    rank: usize,
    fabric: Arc<FabricInner>,
}

impl Communicator for MemoryCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.fabric.world_size
    }

    fn create_channel(&self, edge: i32) -> Result<Box<dyn Channel>> {
        let mut meshes = self.fabric.meshes.lock();
        let world_size = self.fabric.world_size;
        let mesh = meshes.entry(edge).or_insert_with(|| {
            let mut senders = Vec::with_capacity(world_size);
            let mut receivers = Vec::with_capacity(world_size);
            for _ in 0..world_size {
                let (tx, rx) = channel();
                senders.push(tx);
                receivers.push(Some(rx));
            }
            EdgeMesh { senders, receivers }
        });
        let receiver = mesh.receivers[self.rank].take().ok_or_else(|| {
            TableError::IoError(format!(
                "Edge {} already has a channel on rank {}",
                edge, self.rank
            ))
        })?;
        Ok(Box::new(MemoryChannel {
            senders: mesh.senders.clone(),
            receiver,
        }))
    }
}

struct MemoryChannel {
    senders: Vec<Sender<Frame>>,
    receiver: Receiver<Frame>,
}

impl Channel for MemoryChannel {
    fn send(&mut self, frame: Frame) -> Result<()> {
        let target = frame.header.target;
        let sender = self
            .senders
            .get(target)
            .ok_or_else(|| TableError::IoError(format!("No peer {} in the group", target)))?;
        sender
            .send(frame)
            .map_err(|_| TableError::IoError(format!("Peer {} is gone", target)))
    }

    fn poll(&mut self) -> Result<Option<Frame>> {
        match self.receiver.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            // every sender dropped, nothing more can arrive
            Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn progress(&mut self) -> Result<()> {
        Ok(())
    }
}
