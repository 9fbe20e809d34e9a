//! Error taxonomy for the node runtime and the fabric adapter.
//!
//! [`FabricError`] covers the transport/RPC layer (timeouts, unknown
//! channels, method isolation); [`NodeError`] covers the node runtime
//! itself, including the protocol violations the spec requires to be
//! fatal. A `NodeError` returned from a data-path or barrier method means
//! the node has observed a programming error by one of its peers and must
//! not be driven further — the caller (the owning chassis, out of scope
//! for this crate) is responsible for halting it and notifying operators.

use thiserror::Error;

use crate::state::NodeState;

/// Result type for fabric adapter operations.
pub type FabricResult<T> = std::result::Result<T, FabricError>;

/// Result type for node runtime operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors from the fabric adapter (pub/sub + RPC substrate).
#[derive(Error, Debug, Clone)]
pub enum FabricError {
    /// No endpoint is registered at this RPC destination.
    #[error("no endpoint registered at {0:?}")]
    NoEndpoint(String),

    /// The method is not on the destination's RPC allow-list.
    #[error("method {method:?} is not allowed on endpoint {endpoint:?}")]
    MethodNotAllowed { endpoint: String, method: String },

    /// The RPC did not complete before its timeout elapsed.
    #[error("rpc to {destination:?} timed out after {timeout_ms}ms")]
    Timeout { destination: String, timeout_ms: u64 },

    /// The remote endpoint's handler returned an error.
    #[error("rpc to {destination:?} failed: {message}")]
    Remote { destination: String, message: String },

    /// The transport itself is down; every registered failure listener is notified.
    #[error("fabric transport failure: {0}")]
    Transport(String),
}

/// Errors from the node runtime: the lifecycle state machine, the
/// data-path protocol, and the checkpoint barrier.
#[derive(Error, Debug)]
pub enum NodeError {
    /// An operation was attempted outside the state(s) it is legal in.
    ///
    /// This is the uniform treatment spec.md's error table calls for: any
    /// data-path or lifecycle operation outside its legal state(s) halts
    /// the node (see `DESIGN.md` for why this crate treats `update` and
    /// `withdraw` as fatal here too, rather than the silent no-op the
    /// reference implementation used).
    #[error("{node}: {op} is illegal in state {state:?}")]
    IllegalState {
        node: String,
        op: &'static str,
        state: NodeState,
    },

    /// `update`/`withdraw` arrived from a source that already sent its
    /// checkpoint marker for the in-progress barrier.
    #[error("{node}: received {op} from already-checkpointed source {source:?}")]
    SourceAlreadyCheckpointed {
        node: String,
        source: String,
        op: &'static str,
    },

    /// Two distinct markers were observed for the same barrier.
    #[error(
        "{node}: divergent checkpoint marker from {source:?}: have {existing:?}, received {received:?}"
    )]
    DivergentCheckpoint {
        node: String,
        source: String,
        existing: String,
        received: String,
    },

    /// A read-only query has no implementation on this node type.
    #[error("{node}: {query} is not implemented")]
    NotImplemented { node: String, query: &'static str },

    /// The checkpoint store failed to load or persist a marker.
    #[error("{0}: checkpoint store error: {1}")]
    CheckpointStore(String, #[source] fabric_checkpoint::CheckpointStoreError),

    /// The filter chain in this node's configuration failed to compile.
    #[error("{0}: filter configuration error: {1}")]
    Filter(String, #[source] fabric_filter::FilterError),

    /// A fabric-level failure (timeout, isolation violation, transport drop).
    #[error("{0}")]
    Fabric(#[from] FabricError),
}

/// A capability hook with no override on the concrete node type.
///
/// Returned by [`crate::node::FlowTransformer`]'s default `get`/`get_all`/
/// `get_range`/`length` implementations; the node runtime attaches its own
/// name before surfacing this as [`NodeError::NotImplemented`].
#[derive(Debug, Clone, Copy)]
pub struct NotImplemented(pub &'static str);
