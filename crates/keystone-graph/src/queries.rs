//! Read operations on the graph store.

use std::collections::HashSet;

use keystone_core::{
    CurrentViewer, Edge, EdgeFilter, KeystoneError, Node, NodeId, NodeQuery, PropFilter, Result,
    TypeFilter,
};

use crate::store::GraphStore;

impl GraphStore {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a node by id. Absent ids fail with `NotFound`; nodes outside the
    /// viewer's scope fail with `Unauthorized`.
    pub async fn get_node(&self, viewer: &CurrentViewer, id: &NodeId) -> Result<Node> {
        tracing::debug!(id = %id, viewer = %viewer, "get_node");
        self.load_readable(viewer, id).await
    }

    /// Like [`get_node`](Self::get_node) but absence yields `None`.
    /// `Unauthorized` still propagates.
    pub async fn find_node(&self, viewer: &CurrentViewer, id: &NodeId) -> Result<Option<Node>> {
        match self.get_node(viewer, id).await {
            Ok(node) => Ok(Some(node)),
            Err(KeystoneError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── Node Queries ─────────────────────────────────────────────

    /// Nodes of the given type(s) matching `props`, in creation order, scoped
    /// to what the viewer may read.
    pub async fn query_nodes(
        &self,
        viewer: &CurrentViewer,
        types: impl Into<TypeFilter>,
        props: PropFilter,
    ) -> Result<Vec<Node>> {
        let types = types.into();
        let policy = self.policies().for_filter(&types);
        let scope = viewer.read_scope(policy)?;
        let query = NodeQuery::of_type(types)
            .with_props(props)
            .owned_by(scope.clone());
        let mut nodes = self.backend().query_nodes(&query).await?;

        // A self-referential type also reaches the viewer's own node, which
        // may live outside the viewer's org.
        if policy.self_referential && scope.is_some() {
            if let Some(person) = viewer.person_id() {
                let own_id = NodeId::from(person.as_str());
                if !nodes.iter().any(|n| n.id == own_id) {
                    if let Some(own) = self.backend().get_node(&own_id, None).await? {
                        let unscoped = NodeQuery {
                            owner_id: None,
                            ..query.clone()
                        };
                        if unscoped.matches(&own) && self.can_read(viewer, &own) {
                            nodes.push(own);
                            nodes.sort_by_key(|n| n.sort_value);
                        }
                    }
                }
            }
        }

        tracing::debug!(count = nodes.len(), viewer = %viewer, "query_nodes");
        Ok(nodes)
    }

    /// Load `ids` in the given order, keeping only nodes the viewer may read.
    pub(crate) async fn readable_nodes(
        &self,
        viewer: &CurrentViewer,
        ids: &[NodeId],
        types: &TypeFilter,
        props: &PropFilter,
    ) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = NodeQuery::of_type(types.clone())
            .with_props(props.clone())
            .with_ids(ids.to_vec());
        let found = self.backend().query_nodes(&query).await?;
        let visible = found
            .into_iter()
            .filter(|n| self.can_read(viewer, n))
            .collect();
        Ok(crate::backend::order_by_ids(ids, visible))
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Edges matching `filter`, in creation order.
    ///
    /// With a source or target in the filter, that node must be readable and
    /// only edges whose other endpoint is live and readable are returned.
    /// Without either, the query is scoped to edges the viewer's org created.
    pub async fn query_edges(&self, viewer: &CurrentViewer, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        viewer.ensure_active()?;

        if filter.source_id.is_none() && filter.target_id.is_none() {
            let scope = viewer.edge_scope()?;
            if scope.is_none() && !viewer.is_omni() {
                return Err(KeystoneError::Unauthorized(
                    "edge listing requires an org scope".into(),
                ));
            }
            let scoped = EdgeFilter {
                owner_id: scope.or_else(|| filter.owner_id.clone()),
                ..filter.clone()
            };
            return self.backend().query_edges(&scoped).await;
        }

        for anchor in [&filter.source_id, &filter.target_id].into_iter().flatten() {
            self.load_readable(viewer, anchor).await?;
        }

        let edges = self.backend().query_edges(filter).await?;
        let others: Vec<NodeId> = edges
            .iter()
            .map(|e| other_end(filter, e).clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let visible: HashSet<NodeId> = self
            .readable_nodes(viewer, &others, &TypeFilter::Any, &PropFilter::default())
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();

        Ok(edges
            .into_iter()
            .filter(|e| visible.contains(other_end(filter, e)))
            .collect())
    }
}

/// The endpoint of `edge` not pinned by `filter`.
fn other_end<'a>(filter: &EdgeFilter, edge: &'a Edge) -> &'a NodeId {
    if filter.source_id.is_some() {
        &edge.target_id
    } else {
        &edge.source_id
    }
}
