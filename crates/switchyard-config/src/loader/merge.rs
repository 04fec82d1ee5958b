//! Deep merge of JSON layers.

use serde_json::{Map, Value};

/// Deep-merge `overlay` into `base`. Objects merge per key; anything else
/// replaces the base value.
pub(super) fn overlay(base: &mut Value, overlay_value: &Value) {
    if let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay_value) {
        for (key, value) in overlay_map {
            match base_map.get_mut(key) {
                Some(existing) => overlay(existing, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *base = overlay_value.clone();
}

/// Deep-merge `overlay` into `base`, leaving every leaf that `locked` sets
/// untouched.
pub(super) fn overlay_unlocked(base: &mut Value, overlay_value: &Value, locked: Option<&Value>) {
    let Some(locked) = locked else {
        overlay(base, overlay_value);
        return;
    };
    let (Value::Object(locked_map), Value::Object(overlay_map)) = (locked, overlay_value) else {
        // A locked scalar (or a shape mismatch) keeps the pinned value.
        return;
    };
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    let Value::Object(base_map) = base else {
        return;
    };
    for (key, value) in overlay_map {
        let slot = base_map.entry(key.clone()).or_insert(Value::Null);
        match locked_map.get(key) {
            None => overlay(slot, value),
            Some(pinned) => overlay_unlocked(slot, value, Some(pinned)),
        }
    }
}
