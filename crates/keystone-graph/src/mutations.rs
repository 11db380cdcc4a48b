//! Write operations on the graph store.
//!
//! Nodes keep their `id` and `owner_id` for life; updates merge into the
//! stored properties. Edges are created or deleted, never changed.

use keystone_core::{
    CurrentViewer, Edge, NewEdge, NewNode, Node, NodeId, OrgId, Props, Result,
};

use crate::store::GraphStore;

impl GraphStore {
    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node owned by the viewer's org.
    pub async fn create_node(
        &self,
        viewer: &CurrentViewer,
        type_name: &str,
        properties: Props,
    ) -> Result<Node> {
        let owner = viewer.default_owner()?;
        self.create_node_owned(viewer, type_name, owner, properties).await
    }

    /// Create a node under an explicit owner. Only omni viewers may name an
    /// owner other than their own org.
    pub async fn create_node_owned(
        &self,
        viewer: &CurrentViewer,
        type_name: &str,
        owner: OrgId,
        properties: Props,
    ) -> Result<Node> {
        viewer.check_owner(&owner)?;
        let node = self
            .backend()
            .create_node(NewNode {
                id: None,
                type_name: type_name.to_string(),
                owner_id: owner,
                properties,
            })
            .await?;
        tracing::debug!(node = %node, viewer = %viewer, "Node created");
        Ok(node)
    }

    /// Create a node with a caller-chosen id.
    pub async fn create_node_with_id(
        &self,
        viewer: &CurrentViewer,
        id: NodeId,
        type_name: &str,
        owner: OrgId,
        properties: Props,
    ) -> Result<Node> {
        viewer.check_owner(&owner)?;
        self.backend()
            .create_node(NewNode {
                id: Some(id),
                type_name: type_name.to_string(),
                owner_id: owner,
                properties,
            })
            .await
    }

    /// Merge `patch` into the node's properties. A `null` value stores null;
    /// it does not remove the key.
    pub async fn update_node(&self, viewer: &CurrentViewer, id: &NodeId, patch: Props) -> Result<Node> {
        let node = self.load_writable(viewer, id).await?;
        let mut properties = node.properties;
        properties.extend(patch);
        let updated = self.backend().update_node(id, properties).await?;
        tracing::debug!(node = %updated, viewer = %viewer, "Node updated");
        Ok(updated)
    }

    /// Delete a node and sever every edge touching it.
    pub async fn delete_node(&self, viewer: &CurrentViewer, id: &NodeId) -> Result<()> {
        let node = self.load_writable(viewer, id).await?;
        self.backend().delete_node(id).await?;
        tracing::debug!(node = %node, viewer = %viewer, "Node deleted");
        Ok(())
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Link `source` to `target` under `role`. The viewer must be able to
    /// modify the source and read the target. Idempotent per
    /// `(source, target, role)`.
    pub async fn create_edge(
        &self,
        viewer: &CurrentViewer,
        source: &NodeId,
        target: &NodeId,
        role: &str,
    ) -> Result<Edge> {
        self.load_writable(viewer, source).await?;
        self.load_readable(viewer, target).await?;
        let edge = self
            .backend()
            .create_edge(NewEdge {
                source_id: source.clone(),
                target_id: target.clone(),
                role: role.to_string(),
                owner_id: viewer.edge_owner(),
                created_by: viewer.person_id().cloned(),
            })
            .await?;
        tracing::debug!(edge = %edge.key(), viewer = %viewer, "Edge created");
        Ok(edge)
    }

    pub async fn delete_edge(
        &self,
        viewer: &CurrentViewer,
        source: &NodeId,
        target: &NodeId,
        role: &str,
    ) -> Result<()> {
        self.load_writable(viewer, source).await?;
        self.backend().delete_edge(source, target, role).await?;
        tracing::debug!(source = %source, target = %target, role, viewer = %viewer, "Edge deleted");
        Ok(())
    }

    /// Create a node of `type_name` in the source's org and link it from
    /// `source` under `role`.
    pub async fn create_target_node(
        &self,
        viewer: &CurrentViewer,
        source: &NodeId,
        type_name: &str,
        properties: Props,
        role: &str,
    ) -> Result<Node> {
        let parent = self.load_writable(viewer, source).await?;
        let node = self
            .create_node_owned(viewer, type_name, parent.owner_id, properties)
            .await?;
        let linked = self.create_edge(viewer, source, &node.id, role).await;
        self.keep_if_linked(node, linked).await
    }

    /// Create a node of `type_name` in the target's org and link it to
    /// `target` under `role`.
    pub async fn create_source_node(
        &self,
        viewer: &CurrentViewer,
        target: &NodeId,
        type_name: &str,
        properties: Props,
        role: &str,
    ) -> Result<Node> {
        let anchor = self.load_writable(viewer, target).await?;
        let node = self
            .create_node_owned(viewer, type_name, anchor.owner_id, properties)
            .await?;
        let linked = self.create_edge(viewer, &node.id, target, role).await;
        self.keep_if_linked(node, linked).await
    }

    /// A freshly created node whose link failed is removed again.
    async fn keep_if_linked(&self, node: Node, linked: Result<Edge>) -> Result<Node> {
        let Err(e) = linked else {
            return Ok(node);
        };
        tracing::warn!(error = %e, node = %node, "Linking new node failed; removing it");
        if let Err(cleanup) = self.backend().delete_node(&node.id).await {
            tracing::warn!(error = %cleanup, node = %node, "Orphaned node left behind");
        }
        Err(e)
    }
}
