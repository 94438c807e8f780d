// src/disposal.rs

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::backend::{BusId, NodeId, SynthBackend};
use crate::transport::{Task, Transport};

/// Delay before retired audio resources are released, sized to exceed any
/// in-flight sound's natural decay.
pub const DISPOSE_GRACE: f64 = 3.0;

/// Tag for one batch of retired resources awaiting disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u64);

/// Backend resources stripped from a retired session.
#[derive(Debug, Default)]
pub struct RetiredResources {
    pub nodes: Vec<NodeId>,
    pub buses: Vec<BusId>,
}

/// Releases voice nodes and output buses after a grace period, without
/// truncating currently-sounding audio.
///
/// Disposal is best-effort and never blocks a new play: each resource is
/// disposed at most once, and flushing an unknown or already-flushed
/// batch is a no-op.
#[derive(Debug, Default)]
pub struct DisposalQueue {
    next_batch: u64,
    pending: HashMap<BatchId, RetiredResources>,
    disposed_nodes: HashSet<NodeId>,
    disposed_buses: HashSet<BusId>,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `resources` and schedule their release `grace` seconds from
    /// now.
    pub fn retire(
        &mut self,
        transport: &mut dyn Transport,
        resources: RetiredResources,
        grace: f64,
    ) -> BatchId {
        let batch = BatchId(self.next_batch);
        self.next_batch += 1;
        debug!(
            "batch {:?} retired: {} nodes, {} buses, grace {grace}s",
            batch,
            resources.nodes.len(),
            resources.buses.len()
        );
        self.pending.insert(batch, resources);
        transport.schedule_at(transport.now() + grace, Task::FlushRetired { batch });
        batch
    }

    /// Release a batch. Each resource is disposed at most once even if it
    /// was retired twice; double flushes are no-ops.
    pub fn flush(&mut self, backend: &mut dyn SynthBackend, batch: BatchId) {
        let Some(resources) = self.pending.remove(&batch) else {
            return;
        };
        for node in resources.nodes {
            if self.disposed_nodes.insert(node) {
                backend.dispose_node(node);
            }
        }
        for bus in resources.buses {
            if self.disposed_buses.insert(bus) {
                backend.dispose_bus(bus);
            }
        }
        debug!("batch {batch:?} flushed");
    }

    /// Number of batches still waiting out their grace period.
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }
}
