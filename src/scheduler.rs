// src/scheduler.rs

use std::collections::HashMap;

use log::{debug, warn};

use crate::backend::{BusId, NodeId, NoteOn, SynthBackend};
use crate::event::{NoteEvent, piece_end_time};
use crate::instrument::InstrumentMap;
use crate::param_diff::ParamDiffEngine;
use crate::params::{ParamMap, floor_duration, merge_layers, resolve_freq, resolve_vel};
use crate::transport::{Generation, Task, TimerHandle, Transport};
use crate::voice_pool::VoicePool;

/// Pad after the last note tail before a session counts as finished.
pub const END_PAD: f64 = 0.5;

/// Translates one session's event list into clock tasks and drives
/// triggering at fire time.
///
/// Owns the per-session trigger state: the read-only events, the
/// instrument map, one voice pool per instrument, and the per-voice
/// param-diff baselines. All of it dies with the session.
#[derive(Debug)]
pub struct EventScheduler {
    events: Vec<NoteEvent>,
    instruments: InstrumentMap,
    pools: HashMap<String, VoicePool>,
    diff: ParamDiffEngine,
    bus: BusId,

    /// Transport time of the session start; event times are relative to it.
    origin: f64,

    /// Piece end relative to the origin.
    end_time: f64,
}

impl EventScheduler {
    pub fn new(events: Vec<NoteEvent>, instruments: InstrumentMap, bus: BusId, origin: f64) -> Self {
        let end_time = piece_end_time(&events);
        Self {
            events,
            instruments,
            pools: HashMap::new(),
            diff: ParamDiffEngine::new(),
            bus,
            origin,
            end_time,
        }
    }

    /// Piece end relative to the session origin (0 with no events).
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Register one task per event plus the end-of-piece marker.
    pub fn register(
        &self,
        transport: &mut dyn Transport,
        generation: Generation,
    ) -> Vec<TimerHandle> {
        let mut handles = Vec::with_capacity(self.events.len() + 1);
        for (index, event) in self.events.iter().enumerate() {
            handles.push(transport.schedule_at(
                self.origin + event.start,
                Task::FireEvent { generation, index },
            ));
        }
        handles.push(transport.schedule_at(
            self.origin + self.end_time + END_PAD,
            Task::FinishSession { generation },
        ));
        handles
    }

    /// Fire one event: allocate a voice, push the parameter patch if
    /// anything changed, and trigger the note.
    ///
    /// Unknown instruments skip this event only. Trigger failures are
    /// absorbed here; one malformed event never halts the piece.
    pub fn fire(&mut self, backend: &mut dyn SynthBackend, index: usize) {
        let Some(event) = self.events.get(index) else {
            return;
        };
        let Some(spec) = self.instruments.get(&event.instrument) else {
            debug!("unknown instrument {:?}; skipping event", event.instrument);
            return;
        };

        let time = self.origin + event.start;
        let duration = floor_duration(event.duration);

        let bus = self.bus;
        let pool = self
            .pools
            .entry(event.instrument.clone())
            .or_insert_with(|| VoicePool::new(event.instrument.clone(), spec.clone(), bus));
        let voice = pool.allocate(backend, time, duration);

        let empty = ParamMap::new();
        let base = spec.base_pfields().unwrap_or(&empty);
        let merged = merge_layers(base, spec.preset(), &event.pfields);

        if spec.supports_apply() {
            // Keyed by voice: a voice created by this allocation has no
            // baseline yet and receives the full configuration.
            let patch = self.diff.diff(voice.output, &merged);
            if !patch.is_empty() {
                spec.apply(backend, &voice, &patch);
                self.diff.commit(voice.output, &merged);
            }
        }

        let defaults = spec.defaults();
        let note = NoteOn {
            freq: resolve_freq(&event.pfields, &defaults),
            duration,
            time,
            velocity: resolve_vel(&event.pfields, &defaults),
        };

        if let Err(err) = spec.trigger(backend, &voice, &note, &merged) {
            warn!("{}: {err}; event dropped", event.instrument);
        }
    }

    /// Dissolve the scheduler into the backend resources it owns.
    pub fn into_retired(self) -> (Vec<NodeId>, BusId) {
        let nodes = self
            .pools
            .into_values()
            .flat_map(VoicePool::into_nodes)
            .collect();
        (nodes, self.bus)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self, instrument: &str) -> Option<&VoicePool> {
        self.pools.get(instrument)
    }
}
