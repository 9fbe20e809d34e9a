//! The chassis interface a node expects from its owning process supervisor.
//!
//! The concrete chassis — the thing that instantiates nodes, owns the
//! fabric, and drives the management bus — is out of scope (spec.md §1);
//! this crate specifies only the narrow surface a node relies on, per the
//! "cyclic back-reference" design note (spec.md §9): the chassis exposes
//! this interface, and a node exposes itself to the chassis on `connect`
//! (by registering as a [`crate::fabric::NodeHandler`]). Neither owns the
//! other's storage; node lifetime is governed by the chassis.

use async_trait::async_trait;

use crate::fabric::Fabric;

/// What a node needs from its owning chassis, beyond the fabric itself.
#[async_trait]
pub trait Chassis: Send + Sync {
    /// The shared fabric instance, read-only to every node in the process
    /// (spec.md §3 Ownership).
    fn fabric(&self) -> &dyn Fabric;

    /// Register this node's management-bus channel so the chassis can
    /// drive its lifecycle (`initialize`, `start`, `stop`, `rebuild`,
    /// `reset`, `checkpoint`, `state_info`). The concrete mgmt-bus wire
    /// format is a chassis/packaging concern, out of scope here; a node
    /// simply needs the chassis to know it exists.
    async fn request_mgmtbus_channel(&self, node_name: &str);

    /// Called by the fabric adapter on a transport-fatal condition. The
    /// node is not responsible for recovery (spec.md §7); this just
    /// escalates to the process supervisor.
    fn fabric_failed(&self);
}
