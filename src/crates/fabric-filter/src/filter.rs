//! Named filters and ordered filter chains (`infilters`/`outfilters`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::condition::{Condition, ConditionSpec};
use crate::error::Result;

/// The terminal action a matching filter executes.
///
/// Actions are evaluated in declared order; the first terminal one wins
/// (there is currently no non-terminal action, but the type leaves room
/// for one without changing the evaluation loop's shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Let the record through (optionally transformed — currently identity).
    Accept,
    /// Suppress the record entirely.
    Drop,
}

/// Declarative, serializable form of a single named filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Filter name, for logging. Defaults to `filter_<position>` if omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Conditions, implicitly ANDed.
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    /// Actions tried in order once all conditions hold.
    pub actions: Vec<Action>,
}

/// A compiled, named filter: a conjunction of conditions plus an action list.
#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
}

impl Filter {
    fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.eval(record))
    }
}

/// The outcome of evaluating a record through a [`FilterChain`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    /// The record passes, with the (possibly absent) evaluated value.
    Accept(Option<Map<String, Value>>),
    /// The record is suppressed.
    Drop,
}

/// An ordered list of named [`Filter`]s, evaluated top to bottom.
///
/// `FilterChain::apply` is pure: it never mutates the caller's value, only
/// a defensive copy of it (see module docs on the latent mutate-while-
/// iterating bug this supersedes, noted in `DESIGN.md`).
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// Compile an ordered list of filter specs. Fails only if a condition's
    /// regex pattern doesn't compile.
    pub fn compile(specs: &[FilterSpec]) -> Result<Self> {
        let mut filters = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let name = spec.name.clone().unwrap_or_else(|| format!("filter_{i}"));
            let conditions = spec
                .conditions
                .iter()
                .map(Condition::compile)
                .collect::<Result<Vec<_>>>()?;
            filters.push(Filter {
                name,
                conditions,
                actions: spec.actions.clone(),
            });
        }
        Ok(Self { filters })
    }

    /// An empty chain: every record is accepted unchanged (the identity filter list).
    pub fn identity() -> Self {
        Self { filters: Vec::new() }
    }

    /// Evaluate `(indicator, value)` through the chain.
    ///
    /// `value` absent is still evaluated, against a record containing only
    /// the synthetic `_indicator` field. The chain never changes `indicator`
    /// itself, only whether the record is accepted and what its value is.
    pub fn apply(&self, indicator: &str, value: Option<&Map<String, Value>>) -> FilterDecision {
        let mut record = value.cloned().unwrap_or_default();
        record.insert("_indicator".to_string(), Value::String(indicator.to_string()));
        let record_value = Value::Object(record);

        for filter in &self.filters {
            if !filter.matches(&record_value) {
                continue;
            }
            trace!(filter = %filter.name, indicator, "filter matched");
            for action in &filter.actions {
                match action {
                    Action::Accept => return accept(value, record_value),
                    Action::Drop => return FilterDecision::Drop,
                }
            }
        }

        trace!(indicator, "no filter matched, default accept");
        accept(value, record_value)
    }
}

fn accept(original_value: Option<&Map<String, Value>>, mut record: Value) -> FilterDecision {
    if original_value.is_none() {
        return FilterDecision::Accept(None);
    }
    if let Value::Object(map) = &mut record {
        map.remove("_indicator");
    }
    match record {
        Value::Object(map) => FilterDecision::Accept(Some(map)),
        _ => unreachable!("record is always built as an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = FilterChain::identity();
        let value = map(json!({"score": 80}));
        assert_eq!(
            chain.apply("1.2.3.4", Some(&value)),
            FilterDecision::Accept(Some(value))
        );
        assert_eq!(chain.apply("1.2.3.4", None), FilterDecision::Accept(None));
    }

    #[test]
    fn default_is_accept_when_no_filter_matches() {
        let chain = FilterChain::compile(&[FilterSpec {
            name: None,
            conditions: vec![ConditionSpec::Gte {
                field: "score".into(),
                value: 90.0,
            }],
            actions: vec![Action::Drop],
        }])
        .unwrap();

        let value = map(json!({"score": 10}));
        assert_eq!(
            chain.apply("i", Some(&value)),
            FilterDecision::Accept(Some(value))
        );
    }

    #[test]
    fn drop_on_low_score_accept_on_high_score() {
        let chain = FilterChain::compile(&[FilterSpec {
            name: Some("score_gate".into()),
            conditions: vec![ConditionSpec::Gte {
                field: "score".into(),
                value: 50.0,
            }],
            actions: vec![Action::Accept],
        }, FilterSpec {
            name: Some("default_drop".into()),
            conditions: vec![],
            actions: vec![Action::Drop],
        }])
        .unwrap();

        let high = map(json!({"score": 80}));
        assert_eq!(chain.apply("i", Some(&high)), FilterDecision::Accept(Some(high)));

        let low = map(json!({"score": 10}));
        assert_eq!(chain.apply("i", Some(&low)), FilterDecision::Drop);
    }

    #[test]
    fn _indicator_never_leaks_into_accepted_value() {
        let chain = FilterChain::compile(&[FilterSpec {
            name: None,
            conditions: vec![ConditionSpec::Matches {
                field: "_indicator".into(),
                pattern: r"^10\.".into(),
            }],
            actions: vec![Action::Accept],
        }])
        .unwrap();

        let value = map(json!({"score": 1}));
        match chain.apply("10.0.0.1", Some(&value)) {
            FilterDecision::Accept(Some(v)) => assert!(!v.contains_key("_indicator")),
            other => panic!("expected accept, got {other:?}"),
        }
    }

    proptest::proptest! {
        #[test]
        fn identity_chain_is_identity_on_any_value(score in proptest::num::i64::ANY) {
            let chain = FilterChain::identity();
            let value = map(json!({"score": score}));
            let decision = chain.apply("ind", Some(&value));
            prop_assert_eq!(decision, FilterDecision::Accept(Some(value)));
        }
    }
}
