//! Edge-following queries: descendants, ancestors, sources, and targets.
//!
//! The root node must be readable by the viewer (`Unauthorized` otherwise).
//! Neighbours the viewer cannot read, and edges whose far endpoint no longer
//! exists, are left out. Results follow edge-creation order; an empty result
//! is not an error.

use std::collections::HashSet;

use keystone_core::{CurrentViewer, EdgeFilter, Node, NodeId, PropFilter, Result, TypeFilter};

use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Follow edges source -> target.
    Out,
    /// Follow edges target -> source.
    In,
}

impl GraphStore {
    // ── Single Hop ───────────────────────────────────────────────

    /// Nodes of `types` that `id` links to, optionally via `role`.
    pub async fn descendants_by_type(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
    ) -> Result<Vec<Node>> {
        self.descendants_within(viewer, id, types, role, 1).await
    }

    /// Nodes of `types` linking to `id`, optionally via `role`.
    pub async fn ancestors_by_type(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
    ) -> Result<Vec<Node>> {
        self.ancestors_within(viewer, id, types, role, 1).await
    }

    /// Nodes with an edge pointing at `id`, filtered by type, role and
    /// properties.
    pub async fn source_instances(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
        props: &PropFilter,
    ) -> Result<Vec<Node>> {
        self.one_hop(viewer, id, &types.into(), role, props, Direction::In)
            .await
    }

    /// Nodes `id` points at, filtered by type, role and properties.
    pub async fn target_instances(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
        props: &PropFilter,
    ) -> Result<Vec<Node>> {
        self.one_hop(viewer, id, &types.into(), role, props, Direction::Out)
            .await
    }

    // ── Multi Hop ────────────────────────────────────────────────

    /// Breadth-first walk along outgoing edges up to `depth` hops. Each node
    /// is expanded at most once, so cycles terminate.
    pub async fn descendants_within(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
        depth: usize,
    ) -> Result<Vec<Node>> {
        self.walk(viewer, id, &types.into(), role, depth, Direction::Out)
            .await
    }

    /// Breadth-first walk along incoming edges up to `depth` hops.
    pub async fn ancestors_within(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: impl Into<TypeFilter>,
        role: Option<&str>,
        depth: usize,
    ) -> Result<Vec<Node>> {
        self.walk(viewer, id, &types.into(), role, depth, Direction::In)
            .await
    }

    // ── Internals ────────────────────────────────────────────────

    /// Ids adjacent to `id` in `direction`, in edge-creation order, without
    /// repeats.
    async fn neighbour_ids(
        &self,
        id: &NodeId,
        role: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<NodeId>> {
        let filter = match direction {
            Direction::Out => EdgeFilter::from_source(id),
            Direction::In => EdgeFilter::to_target(id),
        }
        .with_role(role);
        let edges = self.backend().query_edges(&filter).await?;

        let mut seen = HashSet::new();
        Ok(edges
            .into_iter()
            .map(|e| match direction {
                Direction::Out => e.target_id,
                Direction::In => e.source_id,
            })
            .filter(|n| seen.insert(n.clone()))
            .collect())
    }

    async fn one_hop(
        &self,
        viewer: &CurrentViewer,
        id: &NodeId,
        types: &TypeFilter,
        role: Option<&str>,
        props: &PropFilter,
        direction: Direction,
    ) -> Result<Vec<Node>> {
        self.load_readable(viewer, id).await?;
        let ids = self.neighbour_ids(id, role, direction).await?;
        let nodes = self.readable_nodes(viewer, &ids, types, props).await?;
        tracing::debug!(root = %id, ?direction, count = nodes.len(), "one_hop");
        Ok(nodes)
    }

    async fn walk(
        &self,
        viewer: &CurrentViewer,
        root: &NodeId,
        types: &TypeFilter,
        role: Option<&str>,
        depth: usize,
        direction: Direction,
    ) -> Result<Vec<Node>> {
        self.load_readable(viewer, root).await?;

        let mut visited: HashSet<NodeId> = HashSet::from([root.clone()]);
        let mut frontier = vec![root.clone()];
        let mut results = Vec::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut level = Vec::new();
            for current in &frontier {
                for next in self.neighbour_ids(current, role, direction).await? {
                    if visited.insert(next.clone()) {
                        level.push(next);
                    }
                }
            }

            let reached = self
                .readable_nodes(viewer, &level, &TypeFilter::Any, &PropFilter::default())
                .await?;
            frontier = reached.iter().map(|n| n.id.clone()).collect();
            results.extend(reached.into_iter().filter(|n| types.matches(&n.type_name)));
        }

        tracing::debug!(root = %root, ?direction, depth, count = results.len(), "walk");
        Ok(results)
    }
}
