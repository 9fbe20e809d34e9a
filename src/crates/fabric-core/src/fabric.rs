//! The fabric adapter (spec.md §4.3) — an abstract bridge over an ordered
//! pub/sub + RPC transport, plus [`LocalFabric`], an in-process
//! implementation sufficient to drive the whole protocol (and the
//! end-to-end scenarios of spec.md §8) without a real transport.
//!
//! The concrete messaging substrate is explicitly out of scope (spec.md
//! §1 Non-goals) — any transport that honors [`Fabric`]'s guarantees
//! (per-publisher FIFO, method-allow-list isolation, one failure
//! notification per listener) satisfies the contract a node depends on.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::error::{FabricError, FabricResult};
use crate::protocol::DataPathMethod;

/// A node's side of the fabric: whatever the adapter dispatches a
/// `update`/`withdraw`/`checkpoint`/`get`/`get_all`/`get_range`/`length`
/// call to, over either a subscription or an RPC channel.
///
/// `source` is the name of the channel the call arrived on: the upstream
/// publisher for a subscription delivery, or the calling node's name for
/// an RPC.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// This handler's own node identity, for logging.
    fn name(&self) -> &str;

    /// Handle one dispatched call. Errors propagate back to the RPC caller
    /// (as [`FabricError::Remote`]) or are logged and dropped for a
    /// subscription delivery, matching the fire-and-forget nature of pub/sub.
    async fn dispatch(&self, method: DataPathMethod, source: &str, params: Value) -> FabricResult<Value>;
}

/// A handle to a node's published channel: `publish` delivers to every
/// current subscriber of the channel it was requested for, in emission
/// order (per-publisher FIFO, spec.md §4.3).
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: DataPathMethod, payload: Value) -> FabricResult<()>;
}

/// The abstract pub/sub + RPC substrate a node runtime is built on.
///
/// Mirrors `minemeld.fabric.Fabric` (see `original_source`), generalized
/// from its single `comm` backend into a trait so a real transport can be
/// substituted without touching `fabric-core::node`.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Register `handler` to receive RPCs addressed to `name`, restricted
    /// to `allowed_methods`.
    async fn request_rpc_server_channel(
        &self,
        name: &str,
        handler: Arc<dyn NodeHandler>,
        allowed_methods: &[DataPathMethod],
    ) -> FabricResult<()>;

    /// Obtain a publisher for `name`'s own pub channel.
    async fn request_pub_channel(&self, name: &str) -> FabricResult<Arc<dyn Publisher>>;

    /// Subscribe `handler` to `source_name`'s publications, restricted to
    /// `allowed_methods`.
    async fn request_sub_channel(
        &self,
        source_name: &str,
        handler: Arc<dyn NodeHandler>,
        allowed_methods: &[DataPathMethod],
    ) -> FabricResult<()>;

    /// Call `method` on `destination` with `params`, as `source`.
    async fn send_rpc(
        &self,
        source: &str,
        destination: &str,
        method: DataPathMethod,
        params: Value,
        timeout: Duration,
    ) -> FabricResult<Value>;

    /// Register a callback invoked exactly once per transport-fatal failure.
    fn add_failure_listener(&self, listener: Arc<dyn Fn(FabricError) + Send + Sync>);

    async fn start(&self) -> FabricResult<()>;
    async fn stop(&self) -> FabricResult<()>;
}

struct Subscriber {
    handler: Arc<dyn NodeHandler>,
    allowed: HashSet<DataPathMethod>,
}

#[derive(Default)]
struct Channel {
    subscribers: Vec<Subscriber>,
}

struct RpcEndpoint {
    handler: Arc<dyn NodeHandler>,
    allowed: HashSet<DataPathMethod>,
}

struct LocalPublisher {
    name: String,
    channels: Arc<RwLock<HashMap<String, Arc<Mutex<Channel>>>>>,
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, topic: DataPathMethod, payload: Value) -> FabricResult<()> {
        let channel = {
            let channels = self.channels.read().await;
            channels.get(&self.name).cloned()
        };
        let Some(channel) = channel else {
            return Ok(());
        };

        // Held for the whole publish call so a single publisher's messages
        // reach every subscriber in emission order even if two publish
        // calls race (per-publisher FIFO, spec.md §4.3/§5).
        let channel = channel.lock().await;
        for subscriber in &channel.subscribers {
            if !subscriber.allowed.contains(&topic) {
                continue;
            }
            trace!(channel = %self.name, topic = %topic, subscriber = subscriber.handler.name(), "delivering");
            if let Err(err) = subscriber.handler.dispatch(topic, &self.name, payload.clone()).await {
                warn!(channel = %self.name, subscriber = subscriber.handler.name(), %err, "subscriber rejected delivery");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// In-process [`Fabric`] implementation backed by `tokio` synchronization
/// primitives: pub channels are per-name subscriber lists guarded by a
/// mutex (FIFO delivery), RPC destinations are a name→handler map.
///
/// Sufficient to exercise the full node protocol in tests without a real
/// transport, which is explicitly out of scope (spec.md §1).
#[derive(Default)]
pub struct LocalFabric {
    channels: Arc<RwLock<HashMap<String, Arc<Mutex<Channel>>>>>,
    rpc_endpoints: RwLock<HashMap<String, RpcEndpoint>>,
    // Plain std mutex: `add_failure_listener` is a synchronous trait method
    // (spec.md §4.3), so this list is never touched from inside an `.await`.
    failure_listeners: StdMutex<Vec<Arc<dyn Fn(FabricError) + Send + Sync>>>,
}

impl LocalFabric {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel_for(&self, name: &str) -> Arc<Mutex<Channel>> {
        if let Some(existing) = self.channels.read().await.get(name) {
            return existing.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Channel::default())))
            .clone()
    }

    /// Simulate a transport-fatal condition: every registered listener is
    /// invoked exactly once (spec.md §4.3 "Failure propagation").
    pub fn simulate_failure(&self, error: FabricError) {
        let listeners = self.failure_listeners.lock().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener(error.clone());
        }
    }
}

#[async_trait]
impl Fabric for LocalFabric {
    async fn request_rpc_server_channel(
        &self,
        name: &str,
        handler: Arc<dyn NodeHandler>,
        allowed_methods: &[DataPathMethod],
    ) -> FabricResult<()> {
        let mut endpoints = self.rpc_endpoints.write().await;
        endpoints.insert(
            name.to_string(),
            RpcEndpoint {
                handler,
                allowed: allowed_methods.iter().copied().collect(),
            },
        );
        Ok(())
    }

    async fn request_pub_channel(&self, name: &str) -> FabricResult<Arc<dyn Publisher>> {
        // Force the channel to exist so an early subscriber (registered
        // before this node calls request_pub_channel) still finds it.
        let _ = self.channel_for(name).await;
        Ok(Arc::new(LocalPublisher {
            name: name.to_string(),
            channels: self.channels.clone(),
        }))
    }

    async fn request_sub_channel(
        &self,
        source_name: &str,
        handler: Arc<dyn NodeHandler>,
        allowed_methods: &[DataPathMethod],
    ) -> FabricResult<()> {
        let channel = self.channel_for(source_name).await;
        let mut channel = channel.lock().await;
        channel.subscribers.push(Subscriber {
            handler,
            allowed: allowed_methods.iter().copied().collect(),
        });
        Ok(())
    }

    async fn send_rpc(
        &self,
        source: &str,
        destination: &str,
        method: DataPathMethod,
        params: Value,
        timeout: Duration,
    ) -> FabricResult<Value> {
        let endpoint = {
            let endpoints = self.rpc_endpoints.read().await;
            let Some(endpoint) = endpoints.get(destination) else {
                return Err(FabricError::NoEndpoint(destination.to_string()));
            };
            if !endpoint.allowed.contains(&method) {
                return Err(FabricError::MethodNotAllowed {
                    endpoint: destination.to_string(),
                    method: method.name().to_string(),
                });
            }
            endpoint.handler.clone()
        };

        match tokio::time::timeout(timeout, endpoint.dispatch(method, source, params)).await {
            Ok(result) => result,
            Err(_) => Err(FabricError::Timeout {
                destination: destination.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn add_failure_listener(&self, listener: Arc<dyn Fn(FabricError) + Send + Sync>) {
        let mut listeners = self.failure_listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push(listener);
    }

    async fn start(&self) -> FabricResult<()> {
        Ok(())
    }

    async fn stop(&self) -> FabricResult<()> {
        Ok(())
    }
}
