// src/archetypes.rs
//
// Built-in instrument bank.
//
// Names and voicings follow the stock bank: general-purpose poly synths
// plus a custom multi-node drum kit. Callers resolve overrides against
// this registry into an immutable InstrumentMap before playing; there is
// no process-global instrument table.

use std::collections::HashMap;

use serde_json::json;

use crate::event::InstrumentOverride;
use crate::instrument::{
    CustomSpec, InstrumentMap, InstrumentSpec, SimplePolySpec, TriggerDuration, TriggerStep,
    VoiceNodeSpec,
};
use crate::params::{NoteDefaults, ParamMap, deep_merge, object};

/// Voice cap used when an override names no archetype and no cap.
const DEFAULT_POLYPHONY: usize = 32;

/// Read-only registry of instrument archetypes.
pub struct ArchetypeRegistry {
    specs: HashMap<String, InstrumentSpec>,
}

impl ArchetypeRegistry {
    /// Registry with the standard bank registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            specs: HashMap::new(),
        };
        register_builtin_archetypes(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, spec: InstrumentSpec) {
        self.specs.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&InstrumentSpec> {
        self.specs.get(name)
    }

    /// Resolve caller overrides into the immutable instrument map handed
    /// to a play call.
    ///
    /// Every builtin stays available under its own name; each override
    /// entry adds (or shadows) an instrument based on its named archetype,
    /// with the override preset deep-merged over the archetype preset.
    /// An unknown archetype falls back to the default poly synth.
    pub fn build_instruments(
        &self,
        overrides: &HashMap<String, InstrumentOverride>,
    ) -> InstrumentMap {
        let mut instruments: InstrumentMap = self.specs.clone();

        for (name, over) in overrides {
            let archetype = over.archetype.as_deref().unwrap_or("synth");
            let base = self
                .specs
                .get(archetype)
                .cloned()
                .unwrap_or_else(fallback_poly_synth);

            // A zero cap would leave the pool unable to hold any voice;
            // treat it as unset, like a missing field.
            let cap = over.max_polyphony.filter(|&cap| cap > 0);

            let spec = match base {
                InstrumentSpec::SimplePoly(mut spec) => {
                    spec.preset = deep_merge(&spec.preset, &over.preset);
                    if let Some(cap) = cap {
                        spec.max_polyphony = cap;
                    }
                    InstrumentSpec::SimplePoly(spec)
                }
                InstrumentSpec::Custom(mut spec) => {
                    spec.preset = deep_merge(&spec.preset, &over.preset);
                    if let Some(cap) = cap {
                        spec.max_polyphony = cap;
                    }
                    InstrumentSpec::Custom(spec)
                }
            };
            instruments.insert(name.clone(), spec);
        }

        instruments
    }
}

fn fallback_poly_synth() -> InstrumentSpec {
    InstrumentSpec::SimplePoly(SimplePolySpec {
        voice_kind: "synth".into(),
        preset: ParamMap::new(),
        max_polyphony: DEFAULT_POLYPHONY,
        defaults: NoteDefaults {
            freq: 440.0,
            vel: 0.6,
        },
    })
}

fn register_builtin_archetypes(registry: &mut ArchetypeRegistry) {
    registry.register(
        "synth",
        InstrumentSpec::SimplePoly(SimplePolySpec {
            voice_kind: "synth".into(),
            preset: object(json!({
                "oscillator": { "type": "triangle" },
                "envelope": { "attack": 0.01, "decay": 0.1, "sustain": 0.3, "release": 0.3 }
            })),
            max_polyphony: 32,
            defaults: NoteDefaults {
                freq: 440.0,
                vel: 0.6,
            },
        }),
    );

    registry.register(
        "sine",
        InstrumentSpec::SimplePoly(SimplePolySpec {
            voice_kind: "synth".into(),
            preset: object(json!({
                "oscillator": { "type": "sine" },
                "envelope": { "attack": 0.2, "decay": 0.2, "sustain": 0.5, "release": 0.8 }
            })),
            max_polyphony: 128,
            defaults: NoteDefaults {
                freq: 440.0,
                vel: 0.4,
            },
        }),
    );

    registry.register(
        "membrane",
        InstrumentSpec::SimplePoly(SimplePolySpec {
            voice_kind: "membrane".into(),
            preset: object(json!({
                "pitchDecay": 0.02,
                "octaves": 2,
                "envelope": { "attack": 0.003, "decay": 0.15, "sustain": 0.2, "release": 0.1 }
            })),
            max_polyphony: 8,
            defaults: NoteDefaults {
                freq: 900.0,
                vel: 0.85,
            },
        }),
    );

    registry.register("Kick", make_kick());
    registry.register("Snare", make_snare());
    registry.register("TomLow", make_tom(110.0));
    registry.register("TomMid", make_tom(160.0));
    registry.register("TomHigh", make_tom(220.0));
    registry.register(
        "HatClosed",
        make_metal(MetalOpts {
            frequency: 420.0,
            decay: 0.05,
            resonance: 5200.0,
            harmonicity: 5.1,
            modulation_index: 32.0,
            octaves: 1.5,
            vel: 0.55,
        }),
    );
    registry.register(
        "HatOpen",
        make_metal(MetalOpts {
            frequency: 420.0,
            decay: 0.45,
            resonance: 5200.0,
            harmonicity: 5.1,
            modulation_index: 32.0,
            octaves: 1.5,
            vel: 0.45,
        }),
    );
    registry.register(
        "Crash",
        make_metal(MetalOpts {
            frequency: 320.0,
            decay: 2.8,
            resonance: 5200.0,
            harmonicity: 3.7,
            modulation_index: 18.0,
            octaves: 2.2,
            vel: 0.55,
        }),
    );
    registry.register(
        "Ride",
        make_metal(MetalOpts {
            frequency: 280.0,
            decay: 1.7,
            resonance: 4500.0,
            harmonicity: 4.2,
            modulation_index: 12.0,
            octaves: 2.0,
            vel: 0.35,
        }),
    );
}

/// Membrane body with a high-passed noise click mixed in.
fn make_kick() -> InstrumentSpec {
    InstrumentSpec::Custom(CustomSpec {
        nodes: vec![
            VoiceNodeSpec {
                kind: "membrane".into(),
                config: object(json!({
                    "pitchDecay": 0.02,
                    "octaves": 6,
                    "oscillator": { "type": "sine" },
                    "envelope": { "attack": 0.001, "decay": 0.35, "sustain": 0, "release": 0.05 }
                })),
                listens: vec!["pitchDecay".into(), "punch".into(), "decay".into()],
            },
            VoiceNodeSpec {
                kind: "noise".into(),
                config: object(json!({
                    "noise": { "type": "white" },
                    "envelope": { "attack": 0.001, "decay": 0.015, "sustain": 0 }
                })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "filter".into(),
                config: object(json!({ "type": "highpass", "frequency": 3500, "Q": 0.7 })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 0.25 })),
                listens: vec!["click".into()],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
        ],
        // body -> bodyGain -> mix; click -> clickHP -> clickGain -> mix; mix -> output
        edges: vec![(0, 3), (1, 2), (2, 4), (3, 5), (4, 5), (5, 6)],
        output: 6,
        base_pfields: object(json!({
            "tuneHz": 52,
            "decay": 0.35,
            "pitchDecay": 0.02,
            "punch": 6,
            "click": 0.25
        })),
        preset: ParamMap::new(),
        max_polyphony: 8,
        defaults: NoteDefaults {
            freq: 52.0,
            vel: 0.9,
        },
        freq_fields: vec!["tuneHz".into()],
        triggers: vec![
            TriggerStep {
                node: 0,
                duration: TriggerDuration::Fixed(0.12),
            },
            TriggerStep {
                node: 1,
                duration: TriggerDuration::Fixed(0.03),
            },
        ],
    })
}

/// Band-passed pink noise snap over a short triangle body.
fn make_snare() -> InstrumentSpec {
    InstrumentSpec::Custom(CustomSpec {
        nodes: vec![
            VoiceNodeSpec {
                kind: "noise".into(),
                config: object(json!({
                    "noise": { "type": "pink" },
                    "envelope": { "attack": 0.001, "decay": 0.18, "sustain": 0 }
                })),
                listens: vec!["decay".into()],
            },
            VoiceNodeSpec {
                kind: "filter".into(),
                config: object(json!({ "type": "bandpass", "frequency": 1800, "Q": 0.8 })),
                listens: vec!["toneHz".into()],
            },
            VoiceNodeSpec {
                kind: "filter".into(),
                config: object(json!({ "type": "highpass", "frequency": 600, "Q": 0.7 })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "synth".into(),
                config: object(json!({
                    "oscillator": { "type": "triangle" },
                    "envelope": { "attack": 0.001, "decay": 0.08, "sustain": 0, "release": 0.02 }
                })),
                listens: vec!["decay".into()],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 0.9 })),
                listens: vec!["snap".into()],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 0.45 })),
                listens: vec!["body".into()],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
        ],
        // noise -> BP -> HP -> noiseGain -> mix; body -> bodyGain -> mix; mix -> output
        edges: vec![(0, 1), (1, 2), (2, 4), (3, 5), (4, 6), (5, 6), (6, 7)],
        output: 7,
        base_pfields: object(json!({
            "tuneHz": 190,
            "decay": 0.18,
            "snap": 0.9,
            "body": 0.45,
            "toneHz": 1800
        })),
        preset: ParamMap::new(),
        max_polyphony: 8,
        defaults: NoteDefaults {
            freq: 190.0,
            vel: 0.85,
        },
        freq_fields: vec!["tuneHz".into()],
        triggers: vec![
            TriggerStep {
                node: 3,
                duration: TriggerDuration::Fixed(0.06),
            },
            TriggerStep {
                node: 0,
                duration: TriggerDuration::Fixed(0.12),
            },
        ],
    })
}

fn make_tom(tune_hz: f64) -> InstrumentSpec {
    InstrumentSpec::Custom(CustomSpec {
        nodes: vec![
            VoiceNodeSpec {
                kind: "membrane".into(),
                config: object(json!({
                    "pitchDecay": 0.01,
                    "octaves": 4,
                    "oscillator": { "type": "sine" },
                    "envelope": { "attack": 0.001, "decay": 0.35, "sustain": 0, "release": 0.05 }
                })),
                listens: vec!["pitchDecay".into(), "punch".into(), "decay".into()],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
        ],
        edges: vec![(0, 1)],
        output: 1,
        base_pfields: object(json!({
            "tuneHz": tune_hz,
            "decay": 0.35,
            "pitchDecay": 0.01,
            "punch": 4
        })),
        preset: ParamMap::new(),
        max_polyphony: 8,
        defaults: NoteDefaults {
            freq: tune_hz,
            vel: 0.75,
        },
        freq_fields: vec!["tuneHz".into()],
        triggers: vec![TriggerStep {
            node: 0,
            duration: TriggerDuration::Fixed(0.1),
        }],
    })
}

struct MetalOpts {
    frequency: f64,
    decay: f64,
    resonance: f64,
    harmonicity: f64,
    modulation_index: f64,
    octaves: f64,
    vel: f64,
}

/// Inharmonic metal voice shared by the hats and cymbals.
fn make_metal(opts: MetalOpts) -> InstrumentSpec {
    InstrumentSpec::Custom(CustomSpec {
        nodes: vec![
            VoiceNodeSpec {
                kind: "metal".into(),
                config: object(json!({
                    "frequency": opts.frequency,
                    "envelope": { "attack": 0.001, "decay": opts.decay, "release": 0.01 },
                    "harmonicity": opts.harmonicity,
                    "modulationIndex": opts.modulation_index,
                    "resonance": opts.resonance,
                    "octaves": opts.octaves
                })),
                listens: vec![
                    "frequency".into(),
                    "decay".into(),
                    "resonance".into(),
                    "harmonicity".into(),
                    "modulationIndex".into(),
                    "octaves".into(),
                ],
            },
            VoiceNodeSpec {
                kind: "gain".into(),
                config: object(json!({ "gain": 1.0 })),
                listens: vec![],
            },
        ],
        edges: vec![(0, 1)],
        output: 1,
        base_pfields: object(json!({
            "frequency": opts.frequency,
            "decay": opts.decay,
            "resonance": opts.resonance,
            "harmonicity": opts.harmonicity,
            "modulationIndex": opts.modulation_index,
            "octaves": opts.octaves
        })),
        preset: ParamMap::new(),
        max_polyphony: 8,
        defaults: NoteDefaults {
            freq: opts.frequency,
            vel: opts.vel,
        },
        freq_fields: vec!["frequency".into()],
        triggers: vec![TriggerStep {
            node: 0,
            duration: TriggerDuration::FromEvent,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_cover_the_standard_bank() {
        let registry = ArchetypeRegistry::with_builtins();
        for name in [
            "synth", "sine", "membrane", "Kick", "Snare", "TomLow", "TomMid", "TomHigh",
            "HatClosed", "HatOpen", "Crash", "Ride",
        ] {
            assert!(registry.get(name).is_some(), "missing archetype {name}");
        }
    }

    #[test]
    fn build_without_overrides_exposes_every_builtin() {
        let registry = ArchetypeRegistry::with_builtins();
        let instruments = registry.build_instruments(&HashMap::new());
        assert!(instruments.contains_key("Kick"));
        assert!(instruments.contains_key("sine"));
    }

    #[test]
    fn override_layers_preset_and_polyphony_over_an_archetype() {
        let registry = ArchetypeRegistry::with_builtins();
        let overrides = HashMap::from([(
            "lead".to_string(),
            InstrumentOverride {
                archetype: Some("sine".into()),
                preset: object(json!({ "envelope": { "release": 1.5 } })),
                max_polyphony: Some(4),
            },
        )]);

        let instruments = registry.build_instruments(&overrides);
        let InstrumentSpec::SimplePoly(lead) = &instruments["lead"] else {
            panic!("expected a simple poly spec");
        };
        assert_eq!(lead.max_polyphony, 4);
        assert_eq!(lead.preset["envelope"]["release"], json!(1.5));
        // Untouched archetype preset keys survive the merge.
        assert_eq!(lead.preset["envelope"]["attack"], json!(0.2));
        assert_eq!(lead.preset["oscillator"]["type"], json!("sine"));
    }

    #[test]
    fn custom_archetype_overrides_keep_the_voice_graph() {
        let registry = ArchetypeRegistry::with_builtins();
        let overrides = HashMap::from([(
            "bigkick".to_string(),
            InstrumentOverride {
                archetype: Some("Kick".into()),
                preset: object(json!({ "decay": 0.6 })),
                max_polyphony: Some(2),
            },
        )]);

        let instruments = registry.build_instruments(&overrides);
        let InstrumentSpec::Custom(kick) = &instruments["bigkick"] else {
            panic!("expected a custom spec");
        };
        assert_eq!(kick.max_polyphony, 2);
        assert_eq!(kick.preset["decay"], json!(0.6));
        assert_eq!(kick.nodes.len(), 7);
    }

    #[test]
    fn zero_polyphony_override_is_treated_as_unset() {
        let registry = ArchetypeRegistry::with_builtins();
        let overrides = HashMap::from([(
            "solo".to_string(),
            InstrumentOverride {
                archetype: Some("membrane".into()),
                preset: ParamMap::new(),
                max_polyphony: Some(0),
            },
        )]);

        let instruments = registry.build_instruments(&overrides);
        let InstrumentSpec::SimplePoly(solo) = &instruments["solo"] else {
            panic!("expected a simple poly spec");
        };
        assert_eq!(solo.max_polyphony, 8);
    }

    #[test]
    fn unknown_archetype_falls_back_to_the_default_poly_synth() {
        let registry = ArchetypeRegistry::with_builtins();
        let overrides = HashMap::from([(
            "mystery".to_string(),
            InstrumentOverride {
                archetype: Some("NoSuchVoice".into()),
                preset: ParamMap::new(),
                max_polyphony: None,
            },
        )]);

        let instruments = registry.build_instruments(&overrides);
        let InstrumentSpec::SimplePoly(spec) = &instruments["mystery"] else {
            panic!("expected the fallback poly synth");
        };
        assert_eq!(spec.voice_kind, "synth");
        assert_eq!(spec.max_polyphony, DEFAULT_POLYPHONY);
    }
}
