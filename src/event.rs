// src/event.rs

use std::collections::HashMap;

use serde::Deserialize;

use crate::params::ParamMap;

/// One timed note in a piece.
///
/// These events:
/// - come from an external caller as part of a playback payload
/// - are read-only once handed to the scheduler
/// - die with their session
#[derive(Debug, Clone, Deserialize)]
pub struct NoteEvent {
    /// Name of the instrument this note plays on.
    pub instrument: String,

    /// Start time in seconds from the beginning of the piece (>= 0).
    pub start: f64,

    /// Note duration in seconds (> 0).
    pub duration: f64,

    /// Per-event parameter fields: reserved note fields (`freq`,
    /// `vel`/`amp`) plus arbitrary nested synthesis parameters.
    #[serde(default)]
    pub pfields: ParamMap,
}

/// Caller-supplied adjustments to a named instrument.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstrumentOverride {
    /// Built-in voice family to base this instrument on.
    pub archetype: Option<String>,

    /// Nested synthesis parameters merged over the archetype's preset.
    #[serde(default)]
    pub preset: ParamMap,

    /// Voice cap for this instrument.
    #[serde(rename = "maxPolyphony")]
    pub max_polyphony: Option<usize>,
}

/// External playback input: either a bare event list, or events plus
/// instrument overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PlaybackPayload {
    Events(Vec<NoteEvent>),
    Piece {
        events: Vec<NoteEvent>,
        #[serde(default)]
        instruments: HashMap<String, InstrumentOverride>,
    },
}

impl PlaybackPayload {
    pub fn into_parts(self) -> (Vec<NoteEvent>, HashMap<String, InstrumentOverride>) {
        match self {
            PlaybackPayload::Events(events) => (events, HashMap::new()),
            PlaybackPayload::Piece { events, instruments } => (events, instruments),
        }
    }
}

/// End of the piece: the latest `start + duration`, or 0 with no events.
pub fn piece_end_time(events: &[NoteEvent]) -> f64 {
    events
        .iter()
        .map(|event| event.start + event.duration)
        .fold(0.0, f64::max)
}
