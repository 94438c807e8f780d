// src/voice_pool.rs

use log::debug;

use crate::backend::{BusId, NodeId, SynthBackend};
use crate::instrument::{InstrumentSpec, VoiceInstance};

/// Floor on a voice reservation, preventing zero-length holds.
pub const MIN_VOICE_HOLD: f64 = 0.01;

/// One reusable voice and the time it next becomes free.
#[derive(Debug)]
struct VoiceSlot {
    instance: VoiceInstance,
    /// Moves forward only.
    busy_until: f64,
}

/// Per-instrument collection of voice slots.
///
/// Responsibilities:
/// - hand out a voice for a requested time/duration
/// - lazily create voices up to the polyphony cap
/// - steal the soonest-to-free voice once saturated
///
/// Does NOT:
/// - trigger notes or apply parameters
/// - outlive its owning session
#[derive(Debug)]
pub struct VoicePool {
    name: String,
    spec: InstrumentSpec,
    bus: BusId,
    slots: Vec<VoiceSlot>,
}

impl VoicePool {
    pub fn new(name: impl Into<String>, spec: InstrumentSpec, bus: BusId) -> Self {
        Self {
            name: name.into(),
            spec,
            bus,
            slots: Vec::new(),
        }
    }

    /// Resolve a voice for a note at `time` lasting `duration`.
    ///
    /// Always succeeds: reuses the first free slot, else creates a new
    /// voice under the cap, else steals the slot with the smallest
    /// `busy_until` (the voice closest to finishing).
    pub fn allocate(
        &mut self,
        backend: &mut dyn SynthBackend,
        time: f64,
        duration: f64,
    ) -> VoiceInstance {
        let index = match self.slots.iter().position(|slot| slot.busy_until <= time) {
            Some(free) => free,
            // A cap below one can never be satisfied; always keep one slot.
            None if self.slots.len() < self.spec.max_polyphony().max(1) => {
                let instance = self.spec.instantiate(backend, self.bus);
                debug!(
                    "{}: voice {} created lazily",
                    self.name,
                    self.slots.len()
                );
                self.slots.push(VoiceSlot {
                    instance,
                    busy_until: 0.0,
                });
                self.slots.len() - 1
            }
            None => {
                let victim = self
                    .slots
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.busy_until.total_cmp(&b.busy_until))
                    .map(|(index, _)| index)
                    .expect("saturated pool is non-empty");
                debug!("{}: stealing voice {victim} at t={time:.3}", self.name);
                victim
            }
        };

        let slot = &mut self.slots[index];
        let hold = time + duration.max(MIN_VOICE_HOLD);
        // busy_until never moves backward, even on a steal.
        if hold > slot.busy_until {
            slot.busy_until = hold;
        }
        slot.instance.clone()
    }

    /// Number of live voice instances.
    pub fn live_voices(&self) -> usize {
        self.slots.len()
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    /// Tear the pool down into the backend nodes it owns, for retirement.
    pub fn into_nodes(self) -> Vec<NodeId> {
        self.slots
            .into_iter()
            .flat_map(|slot| slot.instance.nodes)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::instrument::SimplePolySpec;
    use crate::params::{NoteDefaults, ParamMap};

    fn pool_with_cap(backend: &mut RecordingBackend, cap: usize) -> VoicePool {
        let bus = backend.create_bus(0.85);
        let spec = InstrumentSpec::SimplePoly(SimplePolySpec {
            voice_kind: "synth".into(),
            preset: ParamMap::new(),
            max_polyphony: cap,
            defaults: NoteDefaults {
                freq: 440.0,
                vel: 0.6,
            },
        });
        VoicePool::new("test", spec, bus)
    }

    #[test]
    fn non_overlapping_allocations_create_distinct_voices_up_to_the_cap() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 4);

        let mut outputs = Vec::new();
        for i in 0..4 {
            // Overlapping in time, so no slot is ever free.
            outputs.push(pool.allocate(&mut backend, i as f64 * 0.1, 10.0).output);
        }

        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), 4);
        assert_eq!(pool.live_voices(), 4);
    }

    #[test]
    fn free_slots_are_reused_before_creating_new_voices() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 4);

        let first = pool.allocate(&mut backend, 0.0, 0.2).output;
        // 0.3 > busy_until of 0.2, so the first slot is free again.
        let second = pool.allocate(&mut backend, 0.3, 0.2).output;

        assert_eq!(first, second);
        assert_eq!(pool.live_voices(), 1);
    }

    #[test]
    fn saturated_pool_steals_the_smallest_busy_until() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 3);

        let a = pool.allocate(&mut backend, 0.0, 1.0).output; // busy until 1.0
        let b = pool.allocate(&mut backend, 0.0, 0.5).output; // busy until 0.5
        let c = pool.allocate(&mut backend, 0.0, 2.0).output; // busy until 2.0

        // All still busy at 0.2; the voice closest to finishing loses.
        let stolen = pool.allocate(&mut backend, 0.2, 1.0).output;
        assert_eq!(stolen, b);
        assert_ne!(stolen, a);
        assert_ne!(stolen, c);
        assert_eq!(pool.live_voices(), 3);
    }

    #[test]
    fn busy_until_never_moves_backward_on_steal() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 1);

        let only = pool.allocate(&mut backend, 0.0, 1.0).output; // busy until 1.0
        // Steal with a shorter note; the reservation must not shrink.
        let again = pool.allocate(&mut backend, 0.05, 0.1).output;
        assert_eq!(only, again);

        // The reservation stayed at 1.0 despite the shorter note.
        assert_eq!(pool.slots[0].busy_until, 1.0);
    }

    #[test]
    fn a_zero_cap_still_holds_one_voice() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 0);

        let first = pool.allocate(&mut backend, 0.0, 1.0).output;
        // Overlapping note: the only slot is stolen, never a panic.
        let second = pool.allocate(&mut backend, 0.1, 1.0).output;

        assert_eq!(first, second);
        assert_eq!(pool.live_voices(), 1);
    }

    #[test]
    fn zero_length_reservations_get_the_minimum_hold() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 2);

        pool.allocate(&mut backend, 1.0, 0.0);
        assert_eq!(pool.slots[0].busy_until, 1.0 + MIN_VOICE_HOLD);
    }

    #[test]
    fn into_nodes_collects_every_voice() {
        let mut backend = RecordingBackend::new();
        let mut pool = pool_with_cap(&mut backend, 3);
        for _ in 0..3 {
            pool.allocate(&mut backend, 0.0, 10.0);
        }

        let nodes = pool.into_nodes();
        assert_eq!(nodes.len(), 3);
    }
}
