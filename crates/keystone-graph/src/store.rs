//! Capability-checked access to nodes and edges.
//!
//! Every entry point takes a [`CurrentViewer`] and rejects out-of-scope
//! access with `Unauthorized` instead of filtering it away. Write safety is
//! left to the adapter; there are no per-node locks here.

use std::collections::HashMap;
use std::sync::Arc;

use keystone_core::{AccessPolicy, CurrentViewer, KeystoneError, Node, NodeId, Result, TypeFilter};

use crate::backend::{BackendCapabilities, SharedBackend};

/// Access policy per node type; unknown types are private.
#[derive(Debug, Clone, Default)]
pub struct TypePolicies {
    policies: HashMap<String, AccessPolicy>,
}

impl TypePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_name: impl Into<String>, policy: AccessPolicy) -> Self {
        self.insert(type_name, policy);
        self
    }

    pub fn insert(&mut self, type_name: impl Into<String>, policy: AccessPolicy) {
        self.policies.insert(type_name.into(), policy);
    }

    pub fn get(&self, type_name: &str) -> AccessPolicy {
        self.policies.get(type_name).copied().unwrap_or_default()
    }

    /// Combined policy for a query over several types: public only if every
    /// type is public, self-referential if any type is.
    pub fn for_filter(&self, types: &TypeFilter) -> AccessPolicy {
        match types {
            TypeFilter::Any => AccessPolicy::private(),
            TypeFilter::OneOf(names) if names.is_empty() => AccessPolicy::private(),
            TypeFilter::OneOf(names) => AccessPolicy {
                public_read: names.iter().all(|n| self.get(n).public_read),
                self_referential: names.iter().any(|n| self.get(n).self_referential),
            },
        }
    }
}

/// The graph store. Clone is cheap (inner Arcs).
#[derive(Clone)]
pub struct GraphStore {
    backend: SharedBackend,
    policies: Arc<TypePolicies>,
}

impl GraphStore {
    pub fn new(backend: SharedBackend) -> Self {
        Self::with_policies(backend, TypePolicies::default())
    }

    pub fn with_policies(backend: SharedBackend, policies: TypePolicies) -> Self {
        Self {
            backend,
            policies: Arc::new(policies),
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    /// Whether traversal results can be paginated by the backend itself.
    pub fn range_queries_supported(&self) -> bool {
        self.backend.capabilities().range_queries
    }

    pub fn policy(&self, type_name: &str) -> AccessPolicy {
        self.policies.get(type_name)
    }

    pub fn policies(&self) -> &TypePolicies {
        &self.policies
    }

    /// Fetch a node without capability checks, mapping absence to `NotFound`.
    pub(crate) async fn load(&self, id: &NodeId) -> Result<Node> {
        self.backend
            .get_node(id, None)
            .await?
            .ok_or_else(|| KeystoneError::node_not_found(id.as_str()))
    }

    /// Fetch a node the viewer may read.
    pub(crate) async fn load_readable(&self, viewer: &CurrentViewer, id: &NodeId) -> Result<Node> {
        viewer.ensure_active()?;
        let node = self.load(id).await?;
        viewer.check_read(&node, self.policy(&node.type_name))?;
        Ok(node)
    }

    /// Fetch a node the viewer may modify.
    pub(crate) async fn load_writable(&self, viewer: &CurrentViewer, id: &NodeId) -> Result<Node> {
        viewer.ensure_active()?;
        let node = self.load(id).await?;
        viewer.check_write(&node, self.policy(&node.type_name))?;
        Ok(node)
    }

    pub(crate) fn can_read(&self, viewer: &CurrentViewer, node: &Node) -> bool {
        viewer.can_read(node, self.policy(&node.type_name))
    }
}
