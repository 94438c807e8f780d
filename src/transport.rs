// src/transport.rs

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::disposal::BatchId;

/// Monotonically increasing session tag.
///
/// The sole cancellation token in the system: every scheduled task carries
/// the generation it was issued under and is a no-op once a newer
/// generation exists.
pub type Generation = u64;

/// Handle to one scheduled timer, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Work the transport delivers back to the player at a scheduled time.
///
/// Tasks are plain messages rather than closures so cancellation can be
/// re-validated by generation at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Resolution of the audio-device readiness gate.
    DeviceReady { token: Generation, ok: bool },

    /// Fire event `index` of the generation's piece.
    FireEvent { generation: Generation, index: usize },

    /// The piece ran past its last note tail; the session ended naturally.
    FinishSession { generation: Generation },

    /// A disposal grace period elapsed.
    FlushRetired { batch: BatchId },
}

/// External clock service.
///
/// The transport:
/// - fires tasks at scheduled future times, in non-decreasing time order
///   (ties resolve in registration order)
/// - supports cancellation by handle
/// - owns the single asynchronous suspension point: device readiness,
///   resolved by delivering a `Task::DeviceReady`
pub trait Transport {
    /// Current transport time in seconds.
    fn now(&self) -> f64;

    /// Register a one-shot task. Times in the past fire as soon as the
    /// transport next runs.
    fn schedule_at(&mut self, time: f64, task: Task) -> TimerHandle;

    /// Cancel a scheduled task. Cancelling an already-fired or unknown
    /// handle is a no-op.
    fn cancel(&mut self, handle: TimerHandle);

    /// Begin waiting for the audio device. Delivers
    /// `Task::DeviceReady { token, .. }` once resolved.
    fn ensure_ready(&mut self, token: Generation);
}

/// How a `VirtualTransport` resolves readiness requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Resolve successfully at the current time.
    Immediate,
    /// Hold requests until `resolve_ready` is called.
    Manual,
    /// Resolve as a device failure at the current time.
    Fail,
}

#[derive(Debug)]
struct Scheduled {
    time: f64,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

// BinaryHeap is a max-heap; order reversed so the earliest entry wins.
// Ties break toward the lower registration sequence.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

/// Deterministic in-process transport.
///
/// Drives the whole system from an explicit clock: tests and hosts pop
/// due tasks with `pop_due` and feed them to the player. No threads, no
/// timers.
#[derive(Debug)]
pub struct VirtualTransport {
    now: f64,
    next_handle: u64,
    next_seq: u64,
    queue: BinaryHeap<Scheduled>,
    /// Handles still sitting in the queue.
    queued: HashSet<TimerHandle>,
    cancelled: HashSet<TimerHandle>,
    readiness: Readiness,
    awaiting_ready: Vec<Generation>,
}

impl VirtualTransport {
    pub fn new() -> Self {
        Self::with_readiness(Readiness::Immediate)
    }

    pub fn with_readiness(readiness: Readiness) -> Self {
        Self {
            now: 0.0,
            next_handle: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            queued: HashSet::new(),
            cancelled: HashSet::new(),
            readiness,
            awaiting_ready: Vec::new(),
        }
    }

    /// Resolve all held readiness requests (only meaningful under
    /// `Readiness::Manual`).
    pub fn resolve_ready(&mut self, ok: bool) {
        let tokens = std::mem::take(&mut self.awaiting_ready);
        for token in tokens {
            let time = self.now;
            self.schedule_at(time, Task::DeviceReady { token, ok });
        }
    }

    /// Pop the next task due at or before `until`, advancing the clock to
    /// its scheduled time. Once the queue is drained the clock lands on
    /// `until`.
    pub fn pop_due(&mut self, until: f64) -> Option<Task> {
        while let Some(entry) = self.queue.peek() {
            if entry.time > until {
                break;
            }
            let entry = self.queue.pop().expect("peeked entry");
            if self.cancelled.remove(&entry.handle) {
                continue;
            }
            self.queued.remove(&entry.handle);
            if entry.time > self.now {
                self.now = entry.time;
            }
            return Some(entry.task);
        }
        if until > self.now {
            self.now = until;
        }
        None
    }

    /// Number of live (not cancelled) scheduled tasks.
    pub fn scheduled_count(&self) -> usize {
        self.queued.len()
    }

    #[cfg(test)]
    fn cancelled_len(&self) -> usize {
        self.cancelled.len()
    }
}

impl Default for VirtualTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for VirtualTransport {
    fn now(&self) -> f64 {
        self.now
    }

    fn schedule_at(&mut self, time: f64, task: Task) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled {
            time: time.max(self.now),
            seq,
            handle,
            task,
        });
        self.queued.insert(handle);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        // Only still-queued handles are recorded; cancelling a handle
        // that already fired must not accumulate state in a long-lived
        // host.
        if self.queued.remove(&handle) {
            self.cancelled.insert(handle);
        }
    }

    fn ensure_ready(&mut self, token: Generation) {
        match self.readiness {
            Readiness::Immediate => {
                let time = self.now;
                self.schedule_at(time, Task::DeviceReady { token, ok: true });
            }
            Readiness::Fail => {
                let time = self.now;
                self.schedule_at(time, Task::DeviceReady { token, ok: false });
            }
            Readiness::Manual => self.awaiting_ready.push(token),
        }
    }
}
