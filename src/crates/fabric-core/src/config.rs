//! Node configuration — immutable after construction.

use fabric_filter::FilterSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node's configuration.
///
/// Deliberately agnostic to how it was produced — a future config-file
/// loader (JSON, YAML, TOML) is out of scope for this crate; it only needs
/// to hand the runtime a `NodeConfig`. `params` is an open bag for
/// node-specific settings the core doesn't interpret.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Filters applied to records entering the node (`update`/`withdraw`).
    #[serde(default)]
    pub infilters: Vec<FilterSpec>,
    /// Filters applied to records leaving the node (`emit_update`/`emit_withdraw`).
    #[serde(default)]
    pub outfilters: Vec<FilterSpec>,
    /// Node-type-specific settings, uninterpreted by the core.
    #[serde(default)]
    pub params: Map<String, Value>,
}
