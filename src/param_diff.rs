// src/param_diff.rs

use std::collections::HashMap;

use serde_json::Value;

use crate::backend::NodeId;
use crate::params::{ParamMap, is_reserved};

/// Tracks the last-applied configuration per voice and computes the
/// minimal patch needed to reach a desired configuration.
///
/// Re-issuing identical parameters on every trigger is expensive (and on
/// some voices audibly disruptive), so the apply step only runs when the
/// patch is non-empty. Baselines are keyed by voice, not instrument: a
/// freshly created voice has no baseline, so its first patch carries the
/// full configuration and it can never lag a sibling voice's writes.
///
/// Responsibilities:
/// - compute desired-vs-applied patches
/// - own the per-voice baselines
///
/// Does NOT:
/// - talk to the synthesis backend
/// - decide which voice a patch targets
#[derive(Debug, Default)]
pub struct ParamDiffEngine {
    baselines: HashMap<NodeId, ParamMap>,
}

impl ParamDiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that takes `voice` from its last-applied configuration to
    /// `desired`. Empty when nothing changed; the caller must skip the
    /// apply step in that case.
    pub fn diff(&self, voice: NodeId, desired: &ParamMap) -> ParamMap {
        match self.baselines.get(&voice) {
            Some(last) => diff_maps(desired, last, true),
            None => {
                let mut patch = desired.clone();
                patch.retain(|key, _| !is_reserved(key));
                patch
            }
        }
    }

    /// Record `desired` as the new baseline after a non-empty patch was
    /// applied. The tree is deep-copied so later mutation of the caller's
    /// maps cannot corrupt the stored baseline.
    pub fn commit(&mut self, voice: NodeId, desired: &ParamMap) {
        let mut baseline = desired.clone();
        baseline.retain(|key, _| !is_reserved(key));
        self.baselines.insert(voice, baseline);
    }

    #[cfg(test)]
    fn baseline(&self, voice: NodeId) -> Option<&ParamMap> {
        self.baselines.get(&voice)
    }
}

/// Recursive key-by-key diff of `desired` against `last`.
///
/// Scalars and arrays are included when unequal (arrays compare as whole
/// ordered values). Nested maps recurse, contributing only non-empty
/// sub-patches; if the baseline value is missing or not a map, the whole
/// desired subtree is included verbatim. Reserved note fields are skipped
/// at the top level.
fn diff_maps(desired: &ParamMap, last: &ParamMap, top_level: bool) -> ParamMap {
    let mut patch = ParamMap::new();

    for (key, want) in desired {
        if top_level && is_reserved(key) {
            continue;
        }
        match (want, last.get(key)) {
            (Value::Object(want_map), Some(Value::Object(have_map))) => {
                let sub = diff_maps(want_map, have_map, false);
                if !sub.is_empty() {
                    patch.insert(key.clone(), Value::Object(sub));
                }
            }
            (_, Some(have)) if have == want => {}
            _ => {
                patch.insert(key.clone(), want.clone());
            }
        }
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::object;
    use serde_json::json;

    const VOICE: NodeId = NodeId(7);

    fn engine_with_baseline(voice: NodeId, baseline: ParamMap) -> ParamDiffEngine {
        let mut engine = ParamDiffEngine::new();
        engine.commit(voice, &baseline);
        engine
    }

    #[test]
    fn identical_trees_diff_to_empty() {
        let params = object(json!({
            "decay": 0.35,
            "envelope": { "attack": 0.01, "curve": [0.0, 0.5, 1.0] }
        }));
        let engine = engine_with_baseline(VOICE, params.clone());

        assert!(engine.diff(VOICE, &params).is_empty());
    }

    #[test]
    fn first_diff_includes_everything_but_reserved_fields() {
        let engine = ParamDiffEngine::new();
        let desired = object(json!({ "freq": 220.0, "vel": 0.5, "decay": 0.2 }));

        let patch = engine.diff(VOICE, &desired);
        assert_eq!(patch, object(json!({ "decay": 0.2 })));
    }

    #[test]
    fn only_changed_keys_survive() {
        let engine = engine_with_baseline(
            VOICE,
            object(json!({ "snap": 0.9, "body": 0.45, "toneHz": 1800 })),
        );
        let desired = object(json!({ "snap": 0.9, "body": 0.6, "toneHz": 1800 }));

        let patch = engine.diff(VOICE, &desired);
        assert_eq!(patch, object(json!({ "body": 0.6 })));
    }

    #[test]
    fn baselines_are_independent_per_voice() {
        let desired = object(json!({ "decay": 0.6 }));
        let engine = engine_with_baseline(VOICE, desired.clone());

        // A voice that never saw a commit gets the full patch.
        assert!(engine.diff(VOICE, &desired).is_empty());
        assert_eq!(engine.diff(NodeId(8), &desired), desired);
    }

    #[test]
    fn nested_maps_diff_recursively() {
        let engine = engine_with_baseline(
            VOICE,
            object(json!({
                "oscillator": { "type": "triangle" },
                "envelope": { "attack": 0.01, "release": 0.3 }
            })),
        );
        let desired = object(json!({
            "oscillator": { "type": "triangle" },
            "envelope": { "attack": 0.01, "release": 0.8 }
        }));

        let patch = engine.diff(VOICE, &desired);
        assert_eq!(patch, object(json!({ "envelope": { "release": 0.8 } })));
    }

    #[test]
    fn non_map_baseline_is_replaced_by_whole_subtree() {
        let engine = engine_with_baseline(VOICE, object(json!({ "envelope": 0.3 })));
        let desired = object(json!({ "envelope": { "attack": 0.01 } }));

        let patch = engine.diff(VOICE, &desired);
        assert_eq!(patch, object(json!({ "envelope": { "attack": 0.01 } })));
    }

    #[test]
    fn arrays_compare_as_ordered_values() {
        let engine = engine_with_baseline(VOICE, object(json!({ "curve": [0.0, 1.0] })));

        let same = object(json!({ "curve": [0.0, 1.0] }));
        let reordered = object(json!({ "curve": [1.0, 0.0] }));

        assert!(engine.diff(VOICE, &same).is_empty());
        assert_eq!(engine.diff(VOICE, &reordered), reordered);
    }

    #[test]
    fn applying_a_patch_over_the_baseline_reproduces_desired_leaves() {
        let baseline = object(json!({
            "decay": 0.35,
            "envelope": { "attack": 0.01, "release": 0.3 },
            "punch": 6
        }));
        let desired = object(json!({
            "decay": 0.5,
            "envelope": { "attack": 0.01, "release": 0.8 },
            "punch": 6
        }));
        let engine = engine_with_baseline(VOICE, baseline.clone());

        let patch = engine.diff(VOICE, &desired);
        let reconstructed = crate::params::deep_merge(&baseline, &patch);
        assert_eq!(reconstructed, desired);
    }

    #[test]
    fn commit_deep_copies_the_baseline() {
        let mut engine = ParamDiffEngine::new();
        let mut desired = object(json!({ "decay": 0.2 }));
        engine.commit(VOICE, &desired);

        // Mutating the caller's map must not bleed into the baseline.
        desired.insert("decay".into(), json!(0.9));
        assert_eq!(
            engine.baseline(VOICE),
            Some(&object(json!({ "decay": 0.2 })))
        );
    }
}
