// src/main.rs
//
// End-to-end demo: plays a short drum-and-synth piece through a backend
// that prints what it would sound like instead of making sound.

use ostinato::{
    ArchetypeRegistry, BusId, NodeId, NoteOn, ParamMap, PlayOptions, PlaybackPayload, Player,
    SynthBackend, TriggerError, VirtualTransport,
};

/// ===============================
/// Demo backend
/// ===============================

/// A SynthBackend that narrates every call on stdout.
struct PrintBackend {
    next_node: u64,
    next_bus: u64,
}

impl PrintBackend {
    fn new() -> Self {
        Self {
            next_node: 0,
            next_bus: 0,
        }
    }
}

impl SynthBackend for PrintBackend {
    fn create_node(&mut self, kind: &str, _config: &ParamMap) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        println!("create  node {:>3}  kind={kind}", id.0);
        id
    }

    fn connect(&mut self, source: NodeId, dest: NodeId) {
        println!("wire    node {:>3} -> node {}", source.0, dest.0);
    }

    fn connect_to_bus(&mut self, node: NodeId, bus: BusId) {
        println!("wire    node {:>3} -> bus {}", node.0, bus.0);
    }

    fn set_params(&mut self, node: NodeId, patch: &ParamMap) {
        println!(
            "patch   node {:>3}  {}",
            node.0,
            serde_json::Value::Object(patch.clone())
        );
    }

    fn trigger(&mut self, node: NodeId, note: &NoteOn) -> Result<(), TriggerError> {
        println!(
            "note    node {:>3}  t={:.2}  {:.1}Hz  dur={:.2}  vel={:.2}",
            node.0, note.time, note.freq, note.duration, note.velocity
        );
        Ok(())
    }

    fn create_bus(&mut self, gain: f64) -> BusId {
        let id = BusId(self.next_bus);
        self.next_bus += 1;
        println!("create  bus  {:>3}  gain={gain}", id.0);
        id
    }

    fn ramp_bus(&mut self, bus: BusId, gain: f64, seconds: f64) {
        println!("ramp    bus  {:>3}  -> {gain} over {seconds}s", bus.0);
    }

    fn dispose_node(&mut self, node: NodeId) {
        println!("dispose node {:>3}", node.0);
    }

    fn dispose_bus(&mut self, bus: BusId) {
        println!("dispose bus  {:>3}", bus.0);
    }
}

/// ===============================
/// Demo piece
/// ===============================

const PIECE: &str = r#"{
    "events": [
        { "instrument": "Kick",      "start": 0.0,  "duration": 0.2 },
        { "instrument": "HatClosed", "start": 0.25, "duration": 0.05 },
        { "instrument": "Snare",     "start": 0.5,  "duration": 0.2 },
        { "instrument": "HatClosed", "start": 0.75, "duration": 0.05 },
        { "instrument": "Kick",      "start": 1.0,  "duration": 0.2,
          "pfields": { "decay": 0.5, "click": 0.4 } },
        { "instrument": "HatOpen",   "start": 1.25, "duration": 0.3 },
        { "instrument": "Snare",     "start": 1.5,  "duration": 0.2 },
        { "instrument": "lead",      "start": 0.0,  "duration": 0.45,
          "pfields": { "freq": 220.0, "vel": 0.5 } },
        { "instrument": "lead",      "start": 0.5,  "duration": 0.45,
          "pfields": { "freq": 277.18, "vel": 0.5 } },
        { "instrument": "lead",      "start": 1.0,  "duration": 0.45,
          "pfields": { "freq": 329.63, "vel": 0.55 } },
        { "instrument": "lead",      "start": 1.5,  "duration": 0.9,
          "pfields": { "freq": 440.0, "vel": 0.6 } }
    ],
    "instruments": {
        "lead": {
            "archetype": "sine",
            "preset": { "envelope": { "release": 1.1 } },
            "maxPolyphony": 4
        }
    }
}"#;

fn main() {
    let payload: PlaybackPayload = serde_json::from_str(PIECE).expect("demo piece parses");
    let (events, overrides) = payload.into_parts();

    let registry = ArchetypeRegistry::with_builtins();
    let instruments = registry.build_instruments(&overrides);

    let mut transport = VirtualTransport::new();
    let mut backend = PrintBackend::new();
    let mut player = Player::new();

    player.play(
        &mut transport,
        &mut backend,
        events,
        instruments,
        PlayOptions {
            on_finish: Some(Box::new(|| println!("-- piece finished --"))),
        },
    );

    // Drive the virtual clock well past the piece tail and the disposal
    // grace period.
    player.pump(&mut transport, &mut backend, 30.0);

    assert!(!player.is_playing());
}
