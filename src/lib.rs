// src/lib.rs
//
// Library entry point.
//
// ostinato renders a pre-computed piece of timed note events as live
// sound: voices are pooled and stolen per instrument, parameter writes
// are diffed against each instrument's last-applied configuration, and
// session lifecycle (start, stop, restart, disposal) is serialized
// through a generation counter so stale asynchronous work can never
// corrupt audible state. Synthesis itself and the audio clock are
// opaque collaborators behind the SynthBackend and Transport traits.

mod archetypes;
mod backend;
mod disposal;
mod event;
mod instrument;
mod param_diff;
mod params;
mod player;
mod scheduler;
mod transport;
mod voice_pool;

// Re-export the public surface
pub use archetypes::ArchetypeRegistry;
pub use backend::{BusId, NodeId, NoteOn, SynthBackend, TriggerError};
pub use disposal::{BatchId, DISPOSE_GRACE, DisposalQueue, RetiredResources};
pub use event::{InstrumentOverride, NoteEvent, PlaybackPayload, piece_end_time};
pub use instrument::{
    CustomSpec, InstrumentMap, InstrumentSpec, SimplePolySpec, TriggerDuration, TriggerStep,
    VoiceInstance, VoiceNodeSpec,
};
pub use param_diff::ParamDiffEngine;
pub use params::{NoteDefaults, ParamMap, RESERVED_NOTE_FIELDS};
pub use player::{MASTER_GAIN, PlayOptions, Player, PlayerPhase, STOP_RAMP};
pub use scheduler::{END_PAD, EventScheduler};
pub use transport::{Generation, Readiness, Task, TimerHandle, Transport, VirtualTransport};
pub use voice_pool::{MIN_VOICE_HOLD, VoicePool};
