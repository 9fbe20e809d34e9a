//! # fabric-core — node runtime and checkpoint-barrier coordination
//!
//! This crate is the hard part of the indicator dataflow fabric (spec.md
//! §1): the per-node lifecycle state machine, the data-path protocol
//! (`update`/`withdraw`/`checkpoint`), the checkpoint barrier that aligns
//! many upstream inputs into one quiesced consistent cut, and the
//! abstract fabric adapter every node is built against.
//!
//! Concrete messaging transports, concrete node bodies (miners,
//! processors, outputs), the chassis process supervisor, and config-file
//! parsing are external collaborators — this crate only specifies the
//! contracts a node expects of them ([`fabric::Fabric`], [`chassis::Chassis`])
//! and the contract a node offers in return ([`node::FlowTransformer`]).
//!
//! ```text
//! external feed -> source node -> [processing nodes] -> output node -> external sink
//!                        \_____________ management bus (chassis) ______________/
//! ```

pub mod chassis;
pub mod config;
pub mod error;
pub mod fabric;
pub mod node;
pub mod protocol;
pub mod record;
pub mod state;

pub use chassis::Chassis;
pub use config::NodeConfig;
pub use error::{FabricError, FabricResult, NodeError, NotImplemented, Result};
pub use fabric::{Fabric, LocalFabric, NodeHandler, Publisher};
pub use node::{Emitter, FlowTransformer, MgmtCheckpointOutcome, Node, StateInfo, DEFAULT_RPC_TIMEOUT};
pub use protocol::{
    CheckpointMessage, DataPathMethod, GetParams, GetRangeParams, IndicatorRow, UpdateMessage,
    WithdrawMessage, RPC_METHODS, SUB_CHANNEL_METHODS,
};
pub use record::{strip_private_keys, IndicatorValue};
pub use state::NodeState;
