// src/backend.rs

use std::fmt;

use crate::params::ParamMap;

/// Handle to one synthesis node owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Handle to one output bus owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(pub u64);

/// Resolved note arguments for one trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteOn {
    /// Frequency in Hz.
    pub freq: f64,
    /// Duration in seconds, already floored at the minimum audible length.
    pub duration: f64,
    /// Absolute transport time the note fires at.
    pub time: f64,
    /// Velocity in [0, 1].
    pub velocity: f64,
}

/// Failure raised by a backend trigger.
///
/// Absorbed at the per-event boundary; one malformed event must not halt
/// the remaining piece.
#[derive(Debug, Clone)]
pub struct TriggerError(pub String);

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger failed: {}", self.0)
    }
}

impl std::error::Error for TriggerError {}

/// The opaque synthesis engine.
///
/// This crate never does DSP; it only asks the backend to create voices,
/// wire them, push parameter patches, and fire notes. The backend is the
/// single owner of all audible state.
///
/// Disposal methods must be idempotent: disposing an already-disposed
/// node or bus is a no-op, not an error.
pub trait SynthBackend {
    /// Create one synthesis node of the given voice family.
    fn create_node(&mut self, kind: &str, config: &ParamMap) -> NodeId;

    /// Wire one node's output into another node's input.
    fn connect(&mut self, source: NodeId, dest: NodeId);

    /// Wire a node's output into a bus.
    fn connect_to_bus(&mut self, node: NodeId, bus: BusId);

    /// Push a parameter patch to a node.
    fn set_params(&mut self, node: NodeId, patch: &ParamMap);

    /// Fire one note on a node.
    fn trigger(&mut self, node: NodeId, note: &NoteOn) -> Result<(), TriggerError>;

    /// Create an output bus at the given gain.
    fn create_bus(&mut self, gain: f64) -> BusId;

    /// Ramp a bus toward a gain over `seconds`. Not instantaneous, so a
    /// stop does not click.
    fn ramp_bus(&mut self, bus: BusId, gain: f64, seconds: f64);

    /// Release a node. Idempotent.
    fn dispose_node(&mut self, node: NodeId);

    /// Release a bus. Idempotent.
    fn dispose_bus(&mut self, bus: BusId);
}
