//! In-process adapter backed by hash maps under a `parking_lot` lock.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use keystone_core::types::edge_key;
use keystone_core::{
    Edge, EdgeFilter, KeystoneError, NewEdge, NewNode, Node, NodeId, NodeQuery, OrgId, Props,
    Result,
};

use super::{BackendAdapter, BackendCapabilities};

#[derive(Default)]
struct State {
    nodes: HashMap<NodeId, Node>,
    /// Edges keyed by sort value, which gives creation order for free.
    edges: BTreeMap<i64, Edge>,
    /// `edge_key` -> sort value.
    edge_index: HashMap<String, i64>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(KeystoneError::StorageUnavailable(
                "memory backend is closed".into(),
            ));
        }
        Ok(())
    }
}

/// Volatile adapter for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackendAdapter for MemoryBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "memory",
            range_queries: false,
        }
    }

    async fn create_node(&self, draft: NewNode) -> Result<Node> {
        let node = Node::new(draft);
        let mut state = self.state.write();
        state.ensure_open()?;
        if state.nodes.contains_key(&node.id) {
            return Err(KeystoneError::InvalidArgument(format!(
                "node id {} already exists",
                node.id
            )));
        }
        tracing::debug!(id = %node.id, type_name = %node.type_name, "memory: create_node");
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: &NodeId, owner: Option<&OrgId>) -> Result<Option<Node>> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state
            .nodes
            .get(id)
            .filter(|n| owner.map_or(true, |o| &n.owner_id == o))
            .cloned())
    }

    async fn update_node(&self, id: &NodeId, properties: Props) -> Result<Node> {
        let mut state = self.state.write();
        state.ensure_open()?;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| KeystoneError::node_not_found(id.as_str()))?;
        node.properties = properties;
        node.updated_at = Utc::now();
        tracing::debug!(id = %id, "memory: update_node");
        Ok(node.clone())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let mut state = self.state.write();
        state.ensure_open()?;
        if state.nodes.remove(id).is_none() {
            return Err(KeystoneError::node_not_found(id.as_str()));
        }
        let severed: Vec<i64> = state
            .edges
            .iter()
            .filter(|(_, e)| &e.source_id == id || &e.target_id == id)
            .map(|(sort, _)| *sort)
            .collect();
        for sort in &severed {
            if let Some(edge) = state.edges.remove(sort) {
                state.edge_index.remove(&edge.key());
            }
        }
        tracing::debug!(id = %id, severed = severed.len(), "memory: delete_node");
        Ok(())
    }

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>> {
        let state = self.state.read();
        state.ensure_open()?;
        let mut nodes: Vec<Node> = match &query.ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.nodes.get(id))
                .filter(|n| query.matches(n))
                .cloned()
                .collect(),
            None => state
                .nodes
                .values()
                .filter(|n| query.matches(n))
                .cloned()
                .collect(),
        };
        nodes.sort_by_key(|n| n.sort_value);
        nodes.dedup_by(|a, b| a.id == b.id);
        Ok(nodes)
    }

    async fn create_edge(&self, draft: NewEdge) -> Result<Edge> {
        let mut state = self.state.write();
        state.ensure_open()?;
        for endpoint in [&draft.source_id, &draft.target_id] {
            if !state.nodes.contains_key(endpoint) {
                return Err(KeystoneError::node_not_found(endpoint.as_str()));
            }
        }
        let key = edge_key(&draft.source_id, &draft.target_id, &draft.role);
        if let Some(existing) = state
            .edge_index
            .get(&key)
            .and_then(|sort| state.edges.get(sort))
        {
            return Ok(existing.clone());
        }
        let edge = Edge::new(draft);
        tracing::debug!(edge = %key, "memory: create_edge");
        state.edge_index.insert(key, edge.sort_value);
        state.edges.insert(edge.sort_value, edge.clone());
        Ok(edge)
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state
            .edges
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn delete_edge(&self, source: &NodeId, target: &NodeId, role: &str) -> Result<()> {
        let key = edge_key(source, target, role);
        let mut state = self.state.write();
        state.ensure_open()?;
        let sort = state
            .edge_index
            .remove(&key)
            .ok_or_else(|| KeystoneError::edge_not_found(key.clone()))?;
        state.edges.remove(&sort);
        tracing::debug!(edge = %key, "memory: delete_edge");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.closed {
            *state = State {
                closed: true,
                ..State::default()
            };
            tracing::info!("Memory backend closed");
        }
        Ok(())
    }
}
