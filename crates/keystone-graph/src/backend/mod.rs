//! Uniform storage contract and its concrete adapters.
//!
//! Every adapter offers read-your-writes to its caller and reports transient
//! failures as `StorageUnavailable`, distinct from `NotFound`.

#[cfg(test)]
pub(crate) mod conformance;
mod embedded;
mod memory;
mod networked;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use keystone_core::config::{BackendConfig, BackendKind};
use keystone_core::{Edge, EdgeFilter, NewEdge, NewNode, Node, NodeId, NodeQuery, OrgId, Props, Result};

pub use embedded::EmbeddedBackend;
pub use memory::MemoryBackend;
pub use networked::NetworkedBackend;

/// What an adapter can do beyond the base contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    pub name: &'static str,
    /// Cursor-bounded range queries served by storage. When false, ordered
    /// sets are always materialized in full before pagination.
    pub range_queries: bool,
}

/// Storage contract shared by every adapter.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// Insert a node. Fails with `InvalidArgument` if the id is taken.
    async fn create_node(&self, draft: NewNode) -> Result<Node>;

    /// Fetch a node; with `owner` set, nodes of other owners are absent.
    async fn get_node(&self, id: &NodeId, owner: Option<&OrgId>) -> Result<Option<Node>>;

    /// Replace a node's properties and bump `updated_at`.
    async fn update_node(&self, id: &NodeId, properties: Props) -> Result<Node>;

    /// Remove a node and every edge touching it.
    async fn delete_node(&self, id: &NodeId) -> Result<()>;

    /// Matching nodes in creation order.
    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>>;

    /// Link two existing nodes. Re-creating `(source, target, role)` returns
    /// the stored edge unchanged.
    async fn create_edge(&self, draft: NewEdge) -> Result<Edge>;

    /// Matching edges in creation order.
    async fn query_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>>;

    async fn delete_edge(&self, source: &NodeId, target: &NodeId, role: &str) -> Result<()>;

    /// Release underlying resources. Idempotent.
    async fn close(&self) -> Result<()>;
}

pub type SharedBackend = Arc<dyn BackendAdapter>;

/// Open the adapter named by `config.backend`.
pub async fn open_backend(config: &BackendConfig) -> Result<SharedBackend> {
    let backend: SharedBackend = match config.kind()? {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Embedded => Arc::new(EmbeddedBackend::open(config.embedded_path()).await?),
        BackendKind::Networked => Arc::new(NetworkedBackend::connect(config).await?),
    };
    tracing::info!(backend = backend.capabilities().name, "Backend opened");
    Ok(backend)
}

/// Order `nodes` to follow `ids`, dropping ids with no node.
pub(crate) fn order_by_ids(ids: &[NodeId], nodes: Vec<Node>) -> Vec<Node> {
    let mut by_id: std::collections::HashMap<NodeId, Node> =
        nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
