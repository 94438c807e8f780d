// src/params.rs

use serde_json::{Map, Value};

/// A nested tree of synthesis parameters.
///
/// Leaves are JSON scalars or arrays; branches are nested maps.
/// Used for instrument presets, per-event pfields, and diff patches.
pub type ParamMap = Map<String, Value>;

/// Note fields carried per trigger rather than as voice configuration.
///
/// These never participate in parameter diffing or apply patches.
pub const RESERVED_NOTE_FIELDS: [&str; 3] = ["freq", "vel", "amp"];

/// Shortest duration a note is triggered with.
pub const MIN_NOTE_DURATION: f64 = 0.01;

/// Fallback note arguments for an instrument.
#[derive(Debug, Clone, Copy)]
pub struct NoteDefaults {
    pub freq: f64,
    pub vel: f64,
}

#[inline]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_NOTE_FIELDS.contains(&key)
}

/// Unwrap a `json!({...})` literal into a `ParamMap`.
///
/// Panics if handed a non-object value; only used on literals.
pub fn object(value: Value) -> ParamMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Deep-merge `overlay` on top of `base`.
///
/// Nested maps merge key by key; any other value in `overlay` replaces
/// the base value outright.
pub fn deep_merge(base: &ParamMap, overlay: &ParamMap) -> ParamMap {
    let mut merged = base.clone();
    for (key, value) in overlay {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(below)), Value::Object(above)) => {
                *below = deep_merge(below, above);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Merge the parameter layers for one trigger.
///
/// Precedence: event pfields > instrument preset > instrument base pfields.
pub fn merge_layers(base: &ParamMap, preset: &ParamMap, pfields: &ParamMap) -> ParamMap {
    deep_merge(&deep_merge(base, preset), pfields)
}

/// Resolve the trigger frequency from pfields, falling back to defaults.
pub fn resolve_freq(pfields: &ParamMap, defaults: &NoteDefaults) -> f64 {
    pfields
        .get("freq")
        .and_then(Value::as_f64)
        .unwrap_or(defaults.freq)
}

/// Resolve the trigger velocity from pfields, falling back to defaults.
///
/// `amp` is accepted as an alias for `vel`. The result is clamped to [0, 1].
pub fn resolve_vel(pfields: &ParamMap, defaults: &NoteDefaults) -> f64 {
    let vel = pfields
        .get("vel")
        .or_else(|| pfields.get("amp"))
        .and_then(Value::as_f64)
        .unwrap_or(defaults.vel);
    vel.clamp(0.0, 1.0)
}

/// Floor an event duration at the minimum audible length.
#[inline]
pub fn floor_duration(duration: f64) -> f64 {
    duration.max(MIN_NOTE_DURATION)
}
