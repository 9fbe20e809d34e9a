//! # fabric-filter — declarative condition/filter evaluation
//!
//! Every node's configuration carries two ordered [`FilterChain`]s
//! (`infilters`, `outfilters`). Each [`Filter`] is a named conjunction of
//! [`Condition`]s plus an ordered [`Action`] list; the first filter whose
//! conditions all hold decides the record's fate via its first terminal
//! action. No filter matching is a default accept.
//!
//! The engine is pure: [`FilterChain::apply`] never mutates the caller's
//! value, only a defensive copy (augmented with a synthetic `_indicator`
//! field for the duration of evaluation, then stripped before the record
//! is returned).

pub mod condition;
pub mod error;
pub mod filter;

pub use condition::{Condition, ConditionSpec};
pub use error::{FilterError, Result};
pub use filter::{Action, Filter, FilterChain, FilterDecision, FilterSpec};
