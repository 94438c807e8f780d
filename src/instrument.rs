// src/instrument.rs
//
// Instrument capability bundles.
//
// An instrument's capabilities are carried by an explicit tagged
// variant rather than optional hooks: a simple polyphonic voice
// family, or a custom multi-node voice graph with an explicit
// trigger plan.

use std::collections::HashMap;

use serde_json::Value;

use crate::backend::{BusId, NodeId, NoteOn, SynthBackend, TriggerError};
use crate::params::{NoteDefaults, ParamMap};

/// Immutable instrument configuration map passed into a play call.
///
/// Built once by the caller (registry lookup plus overrides); no ambient
/// global registry exists.
pub type InstrumentMap = HashMap<String, InstrumentSpec>;

/// Capability bundle for one instrument. Immutable once built.
#[derive(Debug, Clone)]
pub enum InstrumentSpec {
    /// One backend voice node per pool slot; no apply capability.
    SimplePoly(SimplePolySpec),

    /// A small per-voice node graph with param routing and an explicit
    /// trigger plan.
    Custom(CustomSpec),
}

#[derive(Debug, Clone)]
pub struct SimplePolySpec {
    /// Backend voice family, e.g. "synth" or "membrane".
    pub voice_kind: String,

    /// Configuration handed to the backend at voice creation.
    pub preset: ParamMap,

    pub max_polyphony: usize,
    pub defaults: NoteDefaults,
}

#[derive(Debug, Clone)]
pub struct CustomSpec {
    /// Per-voice nodes, created in order.
    pub nodes: Vec<VoiceNodeSpec>,

    /// Internal wiring as (source, dest) indices into `nodes`.
    pub edges: Vec<(usize, usize)>,

    /// Index of the node wired to the pool's output bus.
    pub output: usize,

    /// Instrument-level parameter defaults, overridable per event.
    pub base_pfields: ParamMap,

    /// Caller preset layered between base pfields and event pfields.
    pub preset: ParamMap,

    pub max_polyphony: usize,
    pub defaults: NoteDefaults,

    /// Pfields consulted (in order) for the trigger frequency before the
    /// resolved note frequency, e.g. `tuneHz` on drums.
    pub freq_fields: Vec<String>,

    /// Notes fired on the voice graph per trigger.
    pub triggers: Vec<TriggerStep>,
}

/// One node of a custom voice graph.
#[derive(Debug, Clone)]
pub struct VoiceNodeSpec {
    /// Backend node kind, e.g. "membrane", "noise", "filter", "gain".
    pub kind: String,

    /// Static configuration at creation time.
    pub config: ParamMap,

    /// Top-level pfields routed to this node when a patch is applied.
    pub listens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerStep {
    /// Index into `CustomSpec::nodes`.
    pub node: usize,
    pub duration: TriggerDuration,
}

#[derive(Debug, Clone, Copy)]
pub enum TriggerDuration {
    /// Use the (floored) event duration.
    FromEvent,
    /// Fixed excitation length, e.g. a drum hit.
    Fixed(f64),
}

/// The backend nodes composing one live voice.
#[derive(Debug, Clone)]
pub struct VoiceInstance {
    pub nodes: Vec<NodeId>,
    pub output: NodeId,
}

impl InstrumentSpec {
    pub fn max_polyphony(&self) -> usize {
        match self {
            InstrumentSpec::SimplePoly(spec) => spec.max_polyphony,
            InstrumentSpec::Custom(spec) => spec.max_polyphony,
        }
    }

    pub fn defaults(&self) -> NoteDefaults {
        match self {
            InstrumentSpec::SimplePoly(spec) => spec.defaults,
            InstrumentSpec::Custom(spec) => spec.defaults,
        }
    }

    pub fn preset(&self) -> &ParamMap {
        match self {
            InstrumentSpec::SimplePoly(spec) => &spec.preset,
            InstrumentSpec::Custom(spec) => &spec.preset,
        }
    }

    /// Instrument-level parameter defaults (the lowest merge layer).
    /// Simple voices carry their configuration in the creation preset
    /// instead.
    pub fn base_pfields(&self) -> Option<&ParamMap> {
        match self {
            InstrumentSpec::SimplePoly(_) => None,
            InstrumentSpec::Custom(spec) => Some(&spec.base_pfields),
        }
    }

    /// Whether this instrument accepts post-creation parameter patches.
    pub fn supports_apply(&self) -> bool {
        match self {
            InstrumentSpec::SimplePoly(_) => false,
            InstrumentSpec::Custom(spec) => {
                spec.nodes.iter().any(|node| !node.listens.is_empty())
            }
        }
    }

    /// Create one voice and wire it to the pool's bus.
    pub fn instantiate(&self, backend: &mut dyn SynthBackend, bus: BusId) -> VoiceInstance {
        match self {
            InstrumentSpec::SimplePoly(spec) => {
                let node = backend.create_node(&spec.voice_kind, &spec.preset);
                backend.connect_to_bus(node, bus);
                VoiceInstance {
                    nodes: vec![node],
                    output: node,
                }
            }
            InstrumentSpec::Custom(spec) => {
                let nodes: Vec<NodeId> = spec
                    .nodes
                    .iter()
                    .map(|node| backend.create_node(&node.kind, &node.config))
                    .collect();
                for &(source, dest) in &spec.edges {
                    backend.connect(nodes[source], nodes[dest]);
                }
                let output = nodes[spec.output];
                backend.connect_to_bus(output, bus);
                VoiceInstance { nodes, output }
            }
        }
    }

    /// Route a parameter patch into the voice.
    ///
    /// Each custom node receives the sub-patch of keys it listens to.
    /// Simple voices have no apply capability; callers gate on
    /// `supports_apply` and skip the diff entirely.
    pub fn apply(&self, backend: &mut dyn SynthBackend, voice: &VoiceInstance, patch: &ParamMap) {
        let InstrumentSpec::Custom(spec) = self else {
            return;
        };
        for (index, node_spec) in spec.nodes.iter().enumerate() {
            if node_spec.listens.is_empty() {
                continue;
            }
            let sub: ParamMap = patch
                .iter()
                .filter(|(key, _)| node_spec.listens.iter().any(|field| field == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if !sub.is_empty() {
                backend.set_params(voice.nodes[index], &sub);
            }
        }
    }

    /// Fire one note on the voice.
    pub fn trigger(
        &self,
        backend: &mut dyn SynthBackend,
        voice: &VoiceInstance,
        note: &NoteOn,
        params: &ParamMap,
    ) -> Result<(), TriggerError> {
        match self {
            InstrumentSpec::SimplePoly(_) => backend.trigger(voice.output, note),
            InstrumentSpec::Custom(spec) => {
                let freq = spec
                    .freq_fields
                    .iter()
                    .find_map(|field| params.get(field).and_then(Value::as_f64))
                    .unwrap_or(note.freq);
                for step in &spec.triggers {
                    let duration = match step.duration {
                        TriggerDuration::FromEvent => note.duration,
                        TriggerDuration::Fixed(seconds) => seconds,
                    };
                    backend.trigger(
                        voice.nodes[step.node],
                        &NoteOn {
                            freq,
                            duration,
                            time: note.time,
                            velocity: note.velocity,
                        },
                    )?;
                }
                Ok(())
            }
        }
    }
}
