//! The node (flow transformer) runtime: the lifecycle state machine (C4),
//! the data-path protocol (C5), and the checkpoint barrier (C6).
//!
//! A concrete node type implements [`FlowTransformer`] — the capability
//! set the reference implementation expressed as subclass overrides
//! (`filtered_update`, `filtered_withdraw`, `rebuild`, `reset`, `get`,
//! `get_all`, `get_range`, `length`) — and is driven by a [`Node`], which
//! owns the lifecycle state, the compiled filter chains, the input/output
//! channels, and the checkpoint marker.
//!
//! Concurrency model (spec.md §5): every data-path, lifecycle, and
//! management-bus method takes `&self` and serializes through a single
//! internal `tokio::sync::Mutex` over the mutable state — the node never
//! observes two of its own methods in progress simultaneously, without
//! needing a dedicated actor task and mailbox. The lock is always
//! released before a [`FlowTransformer`] hook runs, so a hook calling back
//! into `emit_update`/`emit_withdraw` (a fresh, separate lock acquisition)
//! can never deadlock against the call that invoked it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

use fabric_checkpoint::CheckpointStore;
use fabric_filter::{FilterChain, FilterDecision};

use crate::config::NodeConfig;
use crate::error::{NodeError, NotImplemented, Result};
use crate::fabric::{Fabric, NodeHandler, Publisher};
use crate::protocol::{
    CheckpointMessage, DataPathMethod, GetParams, GetRangeParams, IndicatorRow, UpdateMessage,
    WithdrawMessage, RPC_METHODS, SUB_CHANNEL_METHODS,
};
use crate::record::{strip_private_keys, IndicatorValue};
use crate::state::NodeState;

/// The default RPC timeout (spec.md §5): 30 seconds.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// The snapshot returned by `mgmt:state_info` (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct StateInfo {
    pub checkpoint: Option<String>,
    pub state: NodeState,
    pub is_source: bool,
}

/// The outcome of `mgmt:checkpoint` (spec.md §4.4): a source persists and
/// propagates immediately; a non-source node has nothing to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtCheckpointOutcome {
    Ok,
    Ignored,
}

/// The emit-side of a node: what a [`FlowTransformer`] hook can push
/// downstream, decoupled from the concrete `Node<T>` it's attached to so
/// hooks don't need a circular reference back to their own node.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Apply outfilters and, if accepted, publish `update` (spec.md §4.5).
    async fn emit_update(&self, indicator: &str, value: Option<IndicatorValue>) -> Result<()>;

    /// Apply outfilters and, if accepted, publish `withdraw` (spec.md §4.5).
    async fn emit_withdraw(&self, indicator: &str, value: Option<IndicatorValue>) -> Result<()>;

    /// Publish `checkpoint` unconditionally if an output exists (spec.md §4.5).
    async fn emit_checkpoint(&self, marker: &str) -> Result<()>;
}

/// The capability set a concrete flow transformer implements.
///
/// Default implementations of the four read-only queries return
/// [`NotImplemented`], matching spec.md §7's "not-implemented query" error
/// kind for node types that don't back a queryable store.
#[async_trait]
pub trait FlowTransformer: Send + Sync + 'static {
    /// A record that passed infilters (or had none to begin with).
    async fn filtered_update(
        &self,
        emitter: &dyn Emitter,
        source: &str,
        indicator: &str,
        value: Option<IndicatorValue>,
    );

    /// A state-release signal: either a genuine withdraw, or an update
    /// that infilters dropped (spec.md §4.5's asymmetry — this call is
    /// never itself filterable).
    async fn filtered_withdraw(
        &self,
        emitter: &dyn Emitter,
        source: &str,
        indicator: &str,
        value: Option<IndicatorValue>,
    );

    /// Discard accumulated state in response to `mgmt:rebuild`. Default: no-op.
    async fn rebuild(&self) {}

    /// Discard accumulated state in response to `mgmt:reset`. Default: no-op.
    async fn reset(&self) {}

    async fn get(&self, _source: &str, _indicator: &str) -> std::result::Result<Option<IndicatorValue>, NotImplemented> {
        Err(NotImplemented("get"))
    }

    async fn get_all(&self, _source: &str) -> std::result::Result<Vec<(String, IndicatorValue)>, NotImplemented> {
        Err(NotImplemented("get_all"))
    }

    async fn get_range(
        &self,
        _source: &str,
        _index: Option<&str>,
        _from_key: Option<&str>,
        _to_key: Option<&str>,
    ) -> std::result::Result<Vec<(String, IndicatorValue)>, NotImplemented> {
        Err(NotImplemented("get_range"))
    }

    async fn length(&self, _source: &str) -> std::result::Result<usize, NotImplemented> {
        Err(NotImplemented("length"))
    }
}

struct Inner {
    state: NodeState,
    inputs: Vec<String>,
    output: Option<Arc<dyn Publisher>>,
    inputs_checkpoint: HashMap<String, String>,
    last_checkpoint: Option<String>,
}

/// A flow transformer node: the lifecycle state machine, data-path
/// protocol, and checkpoint barrier wrapped around a [`FlowTransformer`]
/// implementation.
pub struct Node<T: FlowTransformer> {
    name: String,
    handler: T,
    checkpoint_store: Arc<dyn CheckpointStore>,
    infilters: FilterChain,
    outfilters: FilterChain,
    inner: Mutex<Inner>,
}

impl<T: FlowTransformer> Node<T> {
    /// Construct a node in `READY` state, recovering its prior checkpoint
    /// marker (a one-shot disk-to-memory handoff, spec.md §4.2) before it
    /// does anything else — mirrors `BaseFT.__init__`/`read_checkpoint`.
    pub async fn new(
        name: impl Into<String>,
        config: &NodeConfig,
        handler: T,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let name = name.into();
        let infilters = FilterChain::compile(&config.infilters)
            .map_err(|e| NodeError::Filter(name.clone(), e))?;
        let outfilters = FilterChain::compile(&config.outfilters)
            .map_err(|e| NodeError::Filter(name.clone(), e))?;

        let last_checkpoint = checkpoint_store
            .load(&name)
            .await
            .map_err(|e| NodeError::CheckpointStore(name.clone(), e))?;

        Ok(Self {
            infilters,
            outfilters,
            checkpoint_store,
            inner: Mutex::new(Inner {
                state: NodeState::Ready,
                inputs: Vec::new(),
                output: None,
                inputs_checkpoint: HashMap::new(),
                last_checkpoint,
            }),
            handler,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access to the concrete node type, for callers that need to drive
    /// it directly in tests or inspect accumulated state.
    pub fn handler(&self) -> &T {
        &self.handler
    }

    // ---- lifecycle (C4) -------------------------------------------------

    /// `READY -- connect() --> CONNECTED` (spec.md §4.4).
    ///
    /// Registers a sub channel per input, a pub channel if `has_output`,
    /// and this node's RPC channel, mirroring `BaseFT.connect`.
    pub async fn connect(
        self: &Arc<Self>,
        fabric: &dyn Fabric,
        inputs: Vec<String>,
        has_output: bool,
    ) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            self.require_state(inner.state, NodeState::Ready, "connect")?;
        }

        for input in &inputs {
            debug!(node = %self.name, source = %input, "requesting sub channel");
            fabric
                .request_sub_channel(input, self.clone(), &SUB_CHANNEL_METHODS)
                .await?;
        }

        let output = if has_output {
            Some(fabric.request_pub_channel(&self.name).await?)
        } else {
            None
        };

        fabric
            .request_rpc_server_channel(&self.name, self.clone(), &RPC_METHODS)
            .await?;

        let mut inner = self.inner.lock().await;
        inner.inputs = inputs;
        inner.output = output;
        inner.inputs_checkpoint = HashMap::new();
        inner.state = NodeState::Connected;
        Ok(())
    }

    /// `CONNECTED -- mgmt:initialize --> INIT`.
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.require_state(inner.state, NodeState::Connected, "initialize")?;
        inner.state = NodeState::Init;
        Ok(())
    }

    /// `INIT -- start() --> STARTED`.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.require_state(inner.state, NodeState::Init, "start")?;
        inner.state = NodeState::Started;
        Ok(())
    }

    /// `{IDLE, STARTED} -- stop() --> STOPPED`.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.require_states(inner.state, &[NodeState::Idle, NodeState::Started], "stop")?;
        inner.state = NodeState::Stopped;
        Ok(())
    }

    /// `INIT -- mgmt:rebuild --> REBUILDING -- (hook) --> INIT`.
    pub async fn rebuild(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            self.require_state(inner.state, NodeState::Init, "rebuild")?;
            inner.state = NodeState::Rebuilding;
        }
        self.handler.rebuild().await;
        let mut inner = self.inner.lock().await;
        inner.inputs_checkpoint.clear();
        inner.state = NodeState::Init;
        Ok(())
    }

    /// `INIT -- mgmt:reset --> RESET -- (hook) --> INIT`.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            self.require_state(inner.state, NodeState::Init, "reset")?;
            inner.state = NodeState::Reset;
        }
        self.handler.reset().await;
        let mut inner = self.inner.lock().await;
        inner.inputs_checkpoint.clear();
        inner.state = NodeState::Init;
        Ok(())
    }

    /// `mgmt:state_info` (spec.md §4.4).
    pub async fn state_info(&self) -> StateInfo {
        let inner = self.inner.lock().await;
        StateInfo {
            checkpoint: inner.last_checkpoint.clone(),
            state: inner.state,
            is_source: inner.inputs.is_empty(),
        }
    }

    /// `mgmt:checkpoint(marker)`: meaningful only on a source node (empty
    /// `inputs`); a non-source node ignores it, per spec.md §4.4.
    pub async fn mgmt_checkpoint(&self, marker: &str) -> Result<MgmtCheckpointOutcome> {
        {
            let inner = self.inner.lock().await;
            if !inner.inputs.is_empty() {
                return Ok(MgmtCheckpointOutcome::Ignored);
            }
        }

        self.persist_and_emit_checkpoint(marker).await?;
        let mut inner = self.inner.lock().await;
        inner.state = NodeState::Idle;
        Ok(MgmtCheckpointOutcome::Ok)
    }

    // ---- data path (C5) ---------------------------------------------------

    /// `update(source, indicator, value)` — legal in STARTED/CHECKPOINT only.
    pub async fn update(
        &self,
        source: &str,
        indicator: &str,
        mut value: Option<IndicatorValue>,
    ) -> Result<()> {
        self.check_data_path_preconditions(source, "update").await?;

        if let Some(v) = value.as_mut() {
            strip_private_keys(v);
        }

        match self.infilters.apply(indicator, value.as_ref()) {
            FilterDecision::Accept(filtered) => {
                self.handler
                    .filtered_update(self, source, indicator, filtered)
                    .await;
            }
            FilterDecision::Drop => {
                // The record no longer matches; anything previously
                // forwarded downstream is stale and must be released
                // (spec.md §4.5's asymmetry). The open question in
                // spec.md §9 about passing the *unfiltered* value here is
                // kept as specified — see DESIGN.md.
                self.handler
                    .filtered_withdraw(self, source, indicator, value)
                    .await;
            }
        }
        Ok(())
    }

    /// `withdraw(source, indicator, value)` — legal in STARTED/CHECKPOINT
    /// only. Infilters are never applied: a withdraw must propagate
    /// unconditionally or downstream state leaks forever (spec.md §4.5).
    pub async fn withdraw(
        &self,
        source: &str,
        indicator: &str,
        mut value: Option<IndicatorValue>,
    ) -> Result<()> {
        self.check_data_path_preconditions(source, "withdraw").await?;

        if let Some(v) = value.as_mut() {
            strip_private_keys(v);
        }

        self.handler
            .filtered_withdraw(self, source, indicator, value)
            .await;
        Ok(())
    }

    /// `checkpoint(source, marker)` — the barrier alignment step (C6).
    ///
    /// The divergence check, the insert, and the completeness decision must
    /// happen under the *same* lock acquisition: releasing the lock between
    /// the check and the insert would let two concurrent `checkpoint` calls
    /// from different upstreams both pass the check while the map is still
    /// empty, then both insert distinct markers with no divergence ever
    /// observed (spec.md §3/§4.6 step 2).
    pub async fn checkpoint(&self, source: &str, marker: &str) -> Result<()> {
        let barrier_complete = {
            let mut inner = self.inner.lock().await;
            if !inner.state.accepts_data_path() {
                return Err(NodeError::IllegalState {
                    node: self.name.clone(),
                    op: "checkpoint",
                    state: inner.state,
                });
            }
            for existing in inner.inputs_checkpoint.values() {
                if existing != marker {
                    return Err(NodeError::DivergentCheckpoint {
                        node: self.name.clone(),
                        source: source.to_string(),
                        existing: existing.clone(),
                        received: marker.to_string(),
                    });
                }
            }

            inner.inputs_checkpoint.insert(source.to_string(), marker.to_string());
            let complete = inner.inputs_checkpoint.len() == inner.inputs.len();
            inner.state = if complete { NodeState::Idle } else { NodeState::Checkpoint };
            complete
        };

        if !barrier_complete {
            return Ok(());
        }

        self.persist_and_emit_checkpoint(marker).await
    }

    /// Shared tail of the barrier completing, whether from the data path
    /// (C6) or `mgmt:checkpoint` on a source (spec.md §4.4).
    async fn persist_and_emit_checkpoint(&self, marker: &str) -> Result<()> {
        self.checkpoint_store
            .store(&self.name, marker)
            .await
            .map_err(|e| NodeError::CheckpointStore(self.name.clone(), e))?;

        {
            let mut inner = self.inner.lock().await;
            inner.last_checkpoint = Some(marker.to_string());
        }

        self.emit_checkpoint(marker).await
    }

    async fn check_data_path_preconditions(&self, source: &str, op: &'static str) -> Result<()> {
        let inner = self.inner.lock().await;
        if !inner.state.accepts_data_path() {
            return Err(NodeError::IllegalState {
                node: self.name.clone(),
                op,
                state: inner.state,
            });
        }
        if inner.inputs_checkpoint.contains_key(source) {
            return Err(NodeError::SourceAlreadyCheckpointed {
                node: self.name.clone(),
                source: source.to_string(),
                op,
            });
        }
        Ok(())
    }

    // ---- read-only queries --------------------------------------------

    pub async fn get(&self, source: &str, indicator: &str) -> Result<Option<IndicatorValue>> {
        self.handler
            .get(source, indicator)
            .await
            .map_err(|NotImplemented(q)| NodeError::NotImplemented { node: self.name.clone(), query: q })
    }

    pub async fn get_all(&self, source: &str) -> Result<Vec<(String, IndicatorValue)>> {
        self.handler
            .get_all(source)
            .await
            .map_err(|NotImplemented(q)| NodeError::NotImplemented { node: self.name.clone(), query: q })
    }

    pub async fn get_range(
        &self,
        source: &str,
        index: Option<&str>,
        from_key: Option<&str>,
        to_key: Option<&str>,
    ) -> Result<Vec<(String, IndicatorValue)>> {
        self.handler
            .get_range(source, index, from_key, to_key)
            .await
            .map_err(|NotImplemented(q)| NodeError::NotImplemented { node: self.name.clone(), query: q })
    }

    pub async fn length(&self, source: &str) -> Result<usize> {
        self.handler
            .length(source)
            .await
            .map_err(|NotImplemented(q)| NodeError::NotImplemented { node: self.name.clone(), query: q })
    }

    // ---- RPC --------------------------------------------------------------

    /// `do_rpc`: an outbound call to a peer, suspending this call only
    /// (spec.md §5) — the node's own inbox is not blocked by this await
    /// since there is no separate inbox; callers overlap only to the
    /// extent they each acquire the lock independently.
    pub async fn do_rpc(
        &self,
        fabric: &dyn Fabric,
        destination: &str,
        method: DataPathMethod,
        params: Value,
        timeout: Duration,
    ) -> std::result::Result<Value, crate::error::FabricError> {
        fabric.send_rpc(&self.name, destination, method, params, timeout).await
    }

    fn require_state(&self, actual: NodeState, expected: NodeState, op: &'static str) -> Result<()> {
        if actual != expected {
            return Err(NodeError::IllegalState { node: self.name.clone(), op, state: actual });
        }
        Ok(())
    }

    fn require_states(&self, actual: NodeState, expected: &[NodeState], op: &'static str) -> Result<()> {
        if !expected.contains(&actual) {
            return Err(NodeError::IllegalState { node: self.name.clone(), op, state: actual });
        }
        Ok(())
    }
}

#[async_trait]
impl<T: FlowTransformer> Emitter for Node<T> {
    async fn emit_update(&self, indicator: &str, value: Option<IndicatorValue>) -> Result<()> {
        let output = { self.inner.lock().await.output.clone() };
        let Some(output) = output else { return Ok(()) };

        match self.outfilters.apply(indicator, value.as_ref()) {
            FilterDecision::Drop => Ok(()),
            FilterDecision::Accept(value) => {
                let payload = serde_json::to_value(UpdateMessage { indicator: indicator.to_string(), value })
                    .expect("UpdateMessage always serializes");
                output.publish(DataPathMethod::Update, payload).await?;
                Ok(())
            }
        }
    }

    async fn emit_withdraw(&self, indicator: &str, value: Option<IndicatorValue>) -> Result<()> {
        let output = { self.inner.lock().await.output.clone() };
        let Some(output) = output else { return Ok(()) };

        match self.outfilters.apply(indicator, value.as_ref()) {
            FilterDecision::Drop => Ok(()),
            FilterDecision::Accept(value) => {
                let payload = serde_json::to_value(WithdrawMessage { indicator: indicator.to_string(), value })
                    .expect("WithdrawMessage always serializes");
                output.publish(DataPathMethod::Withdraw, payload).await?;
                Ok(())
            }
        }
    }

    async fn emit_checkpoint(&self, marker: &str) -> Result<()> {
        let output = { self.inner.lock().await.output.clone() };
        let Some(output) = output else { return Ok(()) };

        let payload = serde_json::to_value(CheckpointMessage { value: marker.to_string() })
            .expect("CheckpointMessage always serializes");
        output.publish(DataPathMethod::Checkpoint, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: FlowTransformer> NodeHandler for Node<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(
        &self,
        method: DataPathMethod,
        source: &str,
        params: Value,
    ) -> std::result::Result<Value, crate::error::FabricError> {
        let result = match method {
            DataPathMethod::Update => {
                let msg: UpdateMessage = serde_json::from_value(params).unwrap_or(UpdateMessage {
                    indicator: String::new(),
                    value: None,
                });
                self.update(source, &msg.indicator, msg.value).await.map(|_| Value::Null)
            }
            DataPathMethod::Withdraw => {
                let msg: WithdrawMessage = serde_json::from_value(params).unwrap_or(WithdrawMessage {
                    indicator: String::new(),
                    value: None,
                });
                self.withdraw(source, &msg.indicator, msg.value).await.map(|_| Value::Null)
            }
            DataPathMethod::Checkpoint => {
                let msg: CheckpointMessage = serde_json::from_value(params).unwrap_or(CheckpointMessage {
                    value: String::new(),
                });
                self.checkpoint(source, &msg.value).await.map(|_| Value::Null)
            }
            DataPathMethod::Get => {
                let msg: GetParams = serde_json::from_value(params).unwrap_or(GetParams { indicator: String::new() });
                self.get(source, &msg.indicator)
                    .await
                    .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
            }
            DataPathMethod::GetAll => self.get_all(source).await.map(|rows| rows_to_value(rows)),
            DataPathMethod::GetRange => {
                let msg: GetRangeParams = serde_json::from_value(params).unwrap_or_default();
                self.get_range(
                    source,
                    msg.index.as_deref(),
                    msg.from_key.as_deref(),
                    msg.to_key.as_deref(),
                )
                .await
                .map(rows_to_value)
            }
            DataPathMethod::Length => self
                .length(source)
                .await
                .map(|n| serde_json::json!({ "length": n })),
        };

        result.map_err(|e| {
            error!(node = %self.name, op = %method, %e, "node runtime error");
            crate::error::FabricError::Remote { destination: self.name.clone(), message: e.to_string() }
        })
    }
}

fn rows_to_value(rows: Vec<(String, IndicatorValue)>) -> Value {
    let rows: Vec<IndicatorRow> = rows
        .into_iter()
        .map(|(indicator, value)| IndicatorRow { indicator, value })
        .collect();
    serde_json::to_value(rows).expect("IndicatorRow always serializes")
}
