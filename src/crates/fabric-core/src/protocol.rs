//! Wire payload shapes for the three data-path topics.
//!
//! Any real transport plugged in behind [`crate::fabric::Fabric`] exchanges
//! these JSON-like records on the `update`, `withdraw` and `checkpoint`
//! topics of a node's pub channel.

use crate::record::IndicatorValue;
use serde::{Deserialize, Serialize};

/// `update` topic payload: `{ indicator, value }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub indicator: String,
    pub value: Option<IndicatorValue>,
}

/// `withdraw` topic payload: `{ indicator, value }` (`value` usually absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawMessage {
    pub indicator: String,
    pub value: Option<IndicatorValue>,
}

/// `checkpoint` topic payload: `{ value }`, where `value` is the marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMessage {
    pub value: String,
}

/// `get` RPC params: `{ indicator }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
    pub indicator: String,
}

/// `get_range` RPC params, all optional — a node interprets what it supports.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetRangeParams {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub from_key: Option<String>,
    #[serde(default)]
    pub to_key: Option<String>,
}

/// One row of a `get_all`/`get_range` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub indicator: String,
    pub value: IndicatorValue,
}

/// The seven RPC/sub-channel method names a node's RPC surface allows.
///
/// `Update`/`Withdraw`/`Checkpoint` are also reachable over a subscription;
/// `Get`/`GetAll`/`GetRange`/`Length` are RPC-only read queries whose
/// semantics are node-specific (spec.md §6) and default to "not implemented"
/// on [`crate::node::FlowTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataPathMethod {
    Update,
    Withdraw,
    Checkpoint,
    Get,
    GetAll,
    GetRange,
    Length,
}

/// The three topics carried on a pub/sub channel (spec.md §4.5).
pub const SUB_CHANNEL_METHODS: [DataPathMethod; 3] = [
    DataPathMethod::Update,
    DataPathMethod::Withdraw,
    DataPathMethod::Checkpoint,
];

/// The full RPC allow-list every node exposes to peers (spec.md §6).
pub const RPC_METHODS: [DataPathMethod; 7] = [
    DataPathMethod::Update,
    DataPathMethod::Withdraw,
    DataPathMethod::Checkpoint,
    DataPathMethod::Get,
    DataPathMethod::GetAll,
    DataPathMethod::GetRange,
    DataPathMethod::Length,
];

impl DataPathMethod {
    /// The wire/topic name, as it would appear as a pub/sub topic or RPC method.
    pub fn name(self) -> &'static str {
        match self {
            DataPathMethod::Update => "update",
            DataPathMethod::Withdraw => "withdraw",
            DataPathMethod::Checkpoint => "checkpoint",
            DataPathMethod::Get => "get",
            DataPathMethod::GetAll => "get_all",
            DataPathMethod::GetRange => "get_range",
            DataPathMethod::Length => "length",
        }
    }

    /// Parse a wire name back into a method, if it names one of the seven.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "update" => DataPathMethod::Update,
            "withdraw" => DataPathMethod::Withdraw,
            "checkpoint" => DataPathMethod::Checkpoint,
            "get" => DataPathMethod::Get,
            "get_all" => DataPathMethod::GetAll,
            "get_range" => DataPathMethod::GetRange,
            "length" => DataPathMethod::Length,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DataPathMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
