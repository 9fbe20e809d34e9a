//! End-to-end scenarios from spec.md §8, wired through [`LocalFabric`]
//! rather than calling node methods directly — these exercise the actual
//! pub/sub dispatch path a real transport would carry.

use std::sync::Arc;

use async_trait::async_trait;
use fabric_checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use fabric_core::{
    DataPathMethod, Emitter, FabricResult, FlowTransformer, LocalFabric, MgmtCheckpointOutcome,
    Node, NodeConfig, NodeError, NodeHandler, NodeState,
};
use fabric_filter::{Action, ConditionSpec, FilterSpec};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

/// Forwards whatever it receives, unchanged, to its own output.
struct Passthrough;

#[async_trait]
impl FlowTransformer for Passthrough {
    async fn filtered_update(&self, emitter: &dyn Emitter, _source: &str, indicator: &str, value: Option<Map<String, Value>>) {
        emitter.emit_update(indicator, value).await.expect("emit_update");
    }

    async fn filtered_withdraw(&self, emitter: &dyn Emitter, _source: &str, indicator: &str, value: Option<Map<String, Value>>) {
        emitter.emit_withdraw(indicator, value).await.expect("emit_withdraw");
    }
}

/// A node with no inputs never has its hooks invoked by `update`/`withdraw`
/// dispatch (spec.md §3 "a node with zero inputs is a source") — its own
/// concrete body calls `emit_update`/`mgmt_checkpoint` directly.
struct Source;

#[async_trait]
impl FlowTransformer for Source {
    async fn filtered_update(&self, _emitter: &dyn Emitter, _source: &str, _indicator: &str, _value: Option<Map<String, Value>>) {
        unreachable!("a source node has no inputs to dispatch update from")
    }

    async fn filtered_withdraw(&self, _emitter: &dyn Emitter, _source: &str, _indicator: &str, _value: Option<Map<String, Value>>) {
        unreachable!("a source node has no inputs to dispatch withdraw from")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Update(String, Option<Map<String, Value>>),
    Checkpoint(String),
}

/// Stands in for "an external subscriber observing a node's output" — used
/// to assert the order `update`/`checkpoint` arrive on a pub channel,
/// without needing a full downstream `Node`.
struct Recorder {
    name: String,
    events: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl NodeHandler for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, method: DataPathMethod, _source: &str, params: Value) -> FabricResult<Value> {
        let event = match method {
            DataPathMethod::Update => Event::Update(
                params["indicator"].as_str().unwrap().to_string(),
                params["value"].as_object().cloned(),
            ),
            DataPathMethod::Checkpoint => Event::Checkpoint(params["value"].as_str().unwrap().to_string()),
            _ => panic!("unexpected method on recorder: {method}"),
        };
        self.events.lock().await.push(event);
        Ok(Value::Null)
    }
}

fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => panic!("expected object"),
    }
}

async fn recorder_subscribed_to(fabric: &LocalFabric, source: &str) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(Recorder { name: format!("recorder-of-{source}"), events: events.clone() });
    fabric
        .request_sub_channel(
            source,
            handler,
            &[DataPathMethod::Update, DataPathMethod::Withdraw, DataPathMethod::Checkpoint],
        )
        .await
        .unwrap();
    events
}

async fn new_source(name: &str, checkpoint_store: Arc<dyn CheckpointStore>) -> Arc<Node<Source>> {
    Arc::new(Node::new(name, &NodeConfig::default(), Source, checkpoint_store).await.unwrap())
}

async fn new_passthrough(name: &str, checkpoint_store: Arc<dyn CheckpointStore>) -> Arc<Node<Passthrough>> {
    Arc::new(Node::new(name, &NodeConfig::default(), Passthrough, checkpoint_store).await.unwrap())
}

/// Scenario 1: single-input alignment. A -> B.
#[tokio::test]
async fn single_input_alignment() {
    let fabric = LocalFabric::new();
    let chkp_dir = tempfile::tempdir().unwrap();
    let chkp_store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(chkp_dir.path()));

    let a = new_source("A", Arc::new(InMemoryCheckpointStore::new())).await;
    a.connect(&fabric, vec![], true).await.unwrap();
    a.initialize().await.unwrap();
    a.start().await.unwrap();

    let b = new_passthrough("B", chkp_store).await;
    b.connect(&fabric, vec!["A".to_string()], true).await.unwrap();
    b.initialize().await.unwrap();
    b.start().await.unwrap();

    let recorder = recorder_subscribed_to(&fabric, "B").await;

    a.emit_update("1.2.3.4", Some(obj(json!({"t": "ip"})))).await.unwrap();
    let outcome = a.mgmt_checkpoint("cp-1").await.unwrap();
    assert_eq!(outcome, MgmtCheckpointOutcome::Ok);

    let events = recorder.lock().await;
    assert_eq!(
        *events,
        vec![
            Event::Update("1.2.3.4".to_string(), Some(obj(json!({"t": "ip"})))),
            Event::Checkpoint("cp-1".to_string()),
        ]
    );

    assert_eq!(b.state_info().await.checkpoint.as_deref(), Some("cp-1"));
    assert_eq!(tokio::fs::read_to_string(chkp_dir.path().join("B.chkp")).await.unwrap().trim(), "cp-1");
}

/// Scenario 2: two-input barrier. A, B -> C.
#[tokio::test]
async fn two_input_barrier_aligns_on_both_sources() {
    let fabric = LocalFabric::new();

    let a = new_source("A", Arc::new(InMemoryCheckpointStore::new())).await;
    a.connect(&fabric, vec![], true).await.unwrap();
    a.initialize().await.unwrap();
    a.start().await.unwrap();

    let b = new_source("B", Arc::new(InMemoryCheckpointStore::new())).await;
    b.connect(&fabric, vec![], true).await.unwrap();
    b.initialize().await.unwrap();
    b.start().await.unwrap();

    let c = new_passthrough("C", Arc::new(InMemoryCheckpointStore::new())).await;
    c.connect(&fabric, vec!["A".to_string(), "B".to_string()], true).await.unwrap();
    c.initialize().await.unwrap();
    c.start().await.unwrap();

    let recorder = recorder_subscribed_to(&fabric, "C").await;

    a.emit_update("x", Some(obj(json!({})))).await.unwrap();
    assert_eq!(c.state_info().await.state, NodeState::Started);

    a.mgmt_checkpoint("cp-7").await.unwrap();
    assert_eq!(c.state_info().await.state, NodeState::Checkpoint);

    b.mgmt_checkpoint("cp-7").await.unwrap();
    assert_eq!(c.state_info().await.state, NodeState::Idle);

    let events = recorder.lock().await;
    assert_eq!(
        *events,
        vec![Event::Update("x".to_string(), Some(obj(json!({})))), Event::Checkpoint("cp-7".to_string())]
    );
}

/// Scenario 3: divergent markers from two upstreams is fatal.
#[tokio::test]
async fn divergent_checkpoint_markers_halt_the_downstream_node() {
    let fabric = LocalFabric::new();

    let a = new_source("A", Arc::new(InMemoryCheckpointStore::new())).await;
    a.connect(&fabric, vec![], true).await.unwrap();
    a.initialize().await.unwrap();
    a.start().await.unwrap();

    let b = new_source("B", Arc::new(InMemoryCheckpointStore::new())).await;
    b.connect(&fabric, vec![], true).await.unwrap();
    b.initialize().await.unwrap();
    b.start().await.unwrap();

    let c = new_passthrough("C", Arc::new(InMemoryCheckpointStore::new())).await;
    c.connect(&fabric, vec!["A".to_string(), "B".to_string()], true).await.unwrap();
    c.initialize().await.unwrap();
    c.start().await.unwrap();

    a.mgmt_checkpoint("cp-7").await.unwrap();
    assert_eq!(c.state_info().await.state, NodeState::Checkpoint);

    let err = b.mgmt_checkpoint("cp-8").await.unwrap_err();
    assert!(err.to_string().contains("divergent") || err.to_string().contains("Divergent"));
}

/// Scenario 4: an update that fails infilters produces a downstream withdraw.
#[tokio::test]
async fn filter_induced_withdraw() {
    let config = NodeConfig {
        infilters: vec![
            FilterSpec {
                name: Some("score_gate".to_string()),
                conditions: vec![ConditionSpec::Gte { field: "score".to_string(), value: 50.0 }],
                actions: vec![Action::Accept],
            },
            FilterSpec {
                name: Some("default_drop".to_string()),
                conditions: vec![],
                actions: vec![Action::Drop],
            },
        ],
        outfilters: vec![],
        params: Map::new(),
    };

    #[derive(Default)]
    struct Observed {
        updates: Vec<(String, Option<Map<String, Value>>)>,
        withdraws: Vec<(String, Option<Map<String, Value>>)>,
    }

    struct Observer(Arc<Mutex<Observed>>);

    #[async_trait]
    impl FlowTransformer for Observer {
        async fn filtered_update(&self, _emitter: &dyn Emitter, _source: &str, indicator: &str, value: Option<Map<String, Value>>) {
            self.0.lock().await.updates.push((indicator.to_string(), value));
        }
        async fn filtered_withdraw(&self, _emitter: &dyn Emitter, _source: &str, indicator: &str, value: Option<Map<String, Value>>) {
            self.0.lock().await.withdraws.push((indicator.to_string(), value));
        }
    }

    let observed = Arc::new(Mutex::new(Observed::default()));
    let node = Arc::new(
        Node::new("N", &config, Observer(observed.clone()), Arc::new(InMemoryCheckpointStore::new()))
            .await
            .unwrap(),
    );
    let fabric = LocalFabric::new();
    node.connect(&fabric, vec!["up".to_string()], false).await.unwrap();
    node.initialize().await.unwrap();
    node.start().await.unwrap();

    node.update("up", "i", Some(obj(json!({"score": 80})))).await.unwrap();
    node.update("up", "i", Some(obj(json!({"score": 10})))).await.unwrap();

    let observed = observed.lock().await;
    assert_eq!(observed.updates, vec![("i".to_string(), Some(obj(json!({"score": 80}))))]);
    assert_eq!(observed.withdraws, vec![("i".to_string(), Some(obj(json!({"score": 10}))))]);
}

/// Scenario 5: a data-path message arriving from an already-checkpointed
/// source is fatal — covered inline as part of the two-input barrier
/// scenario's natural continuation.
#[tokio::test]
async fn late_update_from_checkpointed_source_is_fatal() {
    let fabric = LocalFabric::new();

    let c = Arc::new(
        Node::new("C", &NodeConfig::default(), Passthrough, Arc::new(InMemoryCheckpointStore::new()))
            .await
            .unwrap(),
    );
    c.connect(&fabric, vec!["A".to_string(), "B".to_string()], false).await.unwrap();
    c.initialize().await.unwrap();
    c.start().await.unwrap();

    c.checkpoint("A", "cp").await.unwrap();
    let err = c.update("A", "x", None).await.unwrap_err();
    assert!(matches!(err, NodeError::SourceAlreadyCheckpointed { .. }));
}

/// Scenario 6: recovery after a crash — the marker persists and the
/// on-disk entry is gone after the one-shot load.
#[tokio::test]
async fn recovery_after_crash() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path()));
    store.store("N", "cp-3").await.unwrap();

    let node = Node::new("N", &NodeConfig::default(), Passthrough, store).await.unwrap();

    assert_eq!(node.state_info().await.checkpoint.as_deref(), Some("cp-3"));
    assert!(!dir.path().join("N.chkp").exists());
}
