//! The indicator record: a key plus an attribute bag.

use serde_json::{Map, Value};

/// An indicator's attribute bag.
///
/// Attribute names beginning with `_` are reserved for in-transit metadata
/// (e.g. the synthetic `_indicator` field the filter engine injects during
/// evaluation) and are stripped before any node hook observes the record.
pub type IndicatorValue = Map<String, Value>;

/// Remove every `_`-prefixed key from `value` in place.
///
/// Operates on an owned, already-cloned map — the caller's original value
/// must never be mutated in place while iterating it (the bug this
/// supersedes: iterating a map and deleting matched keys from it at the
/// same time is undefined behavior in the reference implementation this
/// crate is modeled on).
pub fn strip_private_keys(value: &mut IndicatorValue) {
    value.retain(|k, _| !k.starts_with('_'));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_only_underscore_prefixed_keys() {
        let mut value = match json!({"_indicator": "1.2.3.4", "score": 10, "_source": "x"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        strip_private_keys(&mut value);
        assert_eq!(value.len(), 1);
        assert_eq!(value.get("score"), Some(&json!(10)));
    }
}
