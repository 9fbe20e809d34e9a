//! Declarative conditions evaluated against an indicator record.
//!
//! A [`ConditionSpec`] is the wire/config form (`serde`-deserializable from
//! whatever a node's configuration loader produces); [`Condition`] is the
//! compiled form a [`crate::Filter`] actually evaluates. Compilation only
//! does the work that can fail ahead of time — regex compilation — so
//! evaluation itself never errors (see [`crate::FilterError`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FilterError, Result};

/// The declarative, serializable form of a single condition.
///
/// `field` is a dotted path (e.g. `"confidence"` or `"meta.source"`)
/// resolved against the record being evaluated, which always includes the
/// synthetic `_indicator` field injected for the duration of filter
/// evaluation (see [`crate::Filter::apply`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionSpec {
    /// `field` is present in the record (any value, including `null`).
    Exists { field: String },
    /// `field` is present and equal to `value`.
    Eq { field: String, value: Value },
    /// `field` is absent or not equal to `value`.
    Ne { field: String, value: Value },
    /// `field` is a number greater than `value`.
    Gt { field: String, value: f64 },
    /// `field` is a number greater than or equal to `value`.
    Gte { field: String, value: f64 },
    /// `field` is a number less than `value`.
    Lt { field: String, value: f64 },
    /// `field` is a number less than or equal to `value`.
    Lte { field: String, value: f64 },
    /// `field`'s value is one of `values`.
    In { field: String, values: Vec<Value> },
    /// `field` is a string containing `substring`, or an array containing it as an element.
    Contains { field: String, substring: String },
    /// `field` is a string matching `pattern` (a regular expression).
    Matches { field: String, pattern: String },
}

/// A compiled condition, ready for repeated evaluation.
#[derive(Debug, Clone)]
pub enum Condition {
    Exists(String),
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, f64),
    Gte(String, f64),
    Lt(String, f64),
    Lte(String, f64),
    In(String, Vec<Value>),
    Contains(String, String),
    Matches(String, regex::Regex),
}

impl Condition {
    /// Compile a declarative spec, failing only if a `matches` pattern is
    /// not a valid regex.
    pub fn compile(spec: &ConditionSpec) -> Result<Self> {
        Ok(match spec.clone() {
            ConditionSpec::Exists { field } => Condition::Exists(field),
            ConditionSpec::Eq { field, value } => Condition::Eq(field, value),
            ConditionSpec::Ne { field, value } => Condition::Ne(field, value),
            ConditionSpec::Gt { field, value } => Condition::Gt(field, value),
            ConditionSpec::Gte { field, value } => Condition::Gte(field, value),
            ConditionSpec::Lt { field, value } => Condition::Lt(field, value),
            ConditionSpec::Lte { field, value } => Condition::Lte(field, value),
            ConditionSpec::In { field, values } => Condition::In(field, values),
            ConditionSpec::Contains { field, substring } => Condition::Contains(field, substring),
            ConditionSpec::Matches { field, pattern } => {
                let re = regex::Regex::new(&pattern).map_err(|source| FilterError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                Condition::Matches(field, re)
            }
        })
    }

    /// Evaluate this condition against `record`. Total: never panics, never errors.
    pub fn eval(&self, record: &Value) -> bool {
        match self {
            Condition::Exists(field) => lookup(record, field).is_some(),
            Condition::Eq(field, value) => lookup(record, field) == Some(value),
            Condition::Ne(field, value) => lookup(record, field) != Some(value),
            Condition::Gt(field, v) => as_f64(lookup(record, field)).is_some_and(|x| x > *v),
            Condition::Gte(field, v) => as_f64(lookup(record, field)).is_some_and(|x| x >= *v),
            Condition::Lt(field, v) => as_f64(lookup(record, field)).is_some_and(|x| x < *v),
            Condition::Lte(field, v) => as_f64(lookup(record, field)).is_some_and(|x| x <= *v),
            Condition::In(field, values) => {
                lookup(record, field).is_some_and(|v| values.iter().any(|c| c == v))
            }
            Condition::Contains(field, substring) => match lookup(record, field) {
                Some(Value::String(s)) => s.contains(substring.as_str()),
                Some(Value::Array(items)) => {
                    items.iter().any(|i| i.as_str() == Some(substring.as_str()))
                }
                _ => false,
            },
            Condition::Matches(field, re) => {
                matches!(lookup(record, field), Some(Value::String(s)) if re.is_match(s))
            }
        }
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Resolve a dotted path (`"a.b.c"`) against a JSON object, one segment at
/// a time. A single segment is just a direct key lookup — the common case
/// for flat indicator attribute records.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(spec: ConditionSpec) -> Condition {
        Condition::compile(&spec).unwrap()
    }

    #[test]
    fn eq_matches_scalar_field() {
        let c = compile(ConditionSpec::Eq {
            field: "type".into(),
            value: json!("ip"),
        });
        assert!(c.eval(&json!({"type": "ip"})));
        assert!(!c.eval(&json!({"type": "domain"})));
        assert!(!c.eval(&json!({})));
    }

    #[test]
    fn gte_on_missing_field_is_false() {
        let c = compile(ConditionSpec::Gte {
            field: "score".into(),
            value: 50.0,
        });
        assert!(!c.eval(&json!({})));
        assert!(c.eval(&json!({"score": 50})));
        assert!(!c.eval(&json!({"score": 49.9})));
    }

    #[test]
    fn nested_dotted_path_resolves() {
        let c = compile(ConditionSpec::Eq {
            field: "meta.source".into(),
            value: json!("osint"),
        });
        assert!(c.eval(&json!({"meta": {"source": "osint"}})));
        assert!(!c.eval(&json!({"meta": {"source": "commercial"}})));
    }

    #[test]
    fn matches_compiles_and_evaluates_regex() {
        let c = compile(ConditionSpec::Matches {
            field: "indicator".into(),
            pattern: r"^10\.".into(),
        });
        assert!(c.eval(&json!({"indicator": "10.0.0.1"})));
        assert!(!c.eval(&json!({"indicator": "8.8.8.8"})));
    }

    #[test]
    fn invalid_regex_fails_at_compile_not_eval() {
        let err = Condition::compile(&ConditionSpec::Matches {
            field: "x".into(),
            pattern: "(".into(),
        });
        assert!(matches!(err, Err(FilterError::InvalidPattern { .. })));
    }
}
