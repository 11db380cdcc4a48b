//! Neo4j adapter.
//!
//! Nodes are stored as `(:KeystoneNode)` with their properties serialized in
//! `props_json`; edges are `[:LINK {role}]` relationships, merged on
//! `(source, target, role)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use parking_lot::RwLock;

use keystone_core::config::BackendConfig;
use keystone_core::types::{edge_key, next_sort_value};
use keystone_core::{
    Edge, EdgeFilter, KeystoneError, NewEdge, NewNode, Node, NodeId, NodeQuery, OrgId, PersonId,
    Props, Result, TypeFilter,
};

use super::{BackendAdapter, BackendCapabilities};

const NODE_RETURN: &str = "RETURN n.id AS id, n.type_name AS type_name, n.owner_id AS owner_id,
       n.props_json AS props_json, n.created_at AS created_at,
       n.updated_at AS updated_at, n.sort_value AS sort_value";

const EDGE_RETURN: &str = "RETURN a.id AS source_id, b.id AS target_id, r.role AS role,
       r.owner_id AS owner_id, r.created_by AS created_by,
       r.created_at AS created_at, r.sort_value AS sort_value";

/// Pooled Neo4j connection. The pool is dropped on `close`.
pub struct NetworkedBackend {
    graph: RwLock<Option<Graph>>,
    uri: String,
}

impl NetworkedBackend {
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let uri = config.networked_uri().to_string();
        let neo_config = ConfigBuilder::default()
            .uri(&uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(KeystoneError::storage)?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(KeystoneError::storage)?;

        graph
            .run(query(
                "CREATE CONSTRAINT keystone_node_id IF NOT EXISTS
                 FOR (n:KeystoneNode) REQUIRE n.id IS UNIQUE",
            ))
            .await
            .map_err(KeystoneError::storage)?;

        tracing::info!(uri = %uri, "Connected to Neo4j");
        Ok(Self {
            graph: RwLock::new(Some(graph)),
            uri,
        })
    }

    fn graph(&self) -> Result<Graph> {
        self.graph.read().clone().ok_or_else(|| {
            KeystoneError::StorageUnavailable("networked backend is closed".into())
        })
    }

    async fn run(&self, q: Query) -> Result<()> {
        self.graph()?.run(q).await.map_err(KeystoneError::storage)
    }

    async fn query_rows(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph()?.execute(q).await.map_err(KeystoneError::storage)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(KeystoneError::storage)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn query_one(&self, q: Query) -> Result<Option<Row>> {
        let mut stream = self.graph()?.execute(q).await.map_err(KeystoneError::storage)?;
        stream.next().await.map_err(KeystoneError::storage)
    }
}

// ── Row Mapping ──────────────────────────────────────────────────

fn field<T>(row: &Row, key: &str) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    row.get::<T>(key)
        .map_err(|e| KeystoneError::Serialization(format!("column {key}: {e}")))
}

fn time_field(row: &Row, key: &str) -> Result<DateTime<Utc>> {
    let text: String = field(row, key)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| KeystoneError::Serialization(format!("column {key}: {e}")))
}

fn node_from_row(row: &Row) -> Result<Node> {
    let props_json: String = field(row, "props_json")?;
    Ok(Node {
        id: NodeId(field(row, "id")?),
        type_name: field(row, "type_name")?,
        owner_id: OrgId(field(row, "owner_id")?),
        properties: serde_json::from_str(&props_json)?,
        created_at: time_field(row, "created_at")?,
        updated_at: time_field(row, "updated_at")?,
        sort_value: field(row, "sort_value")?,
    })
}

fn edge_from_row(row: &Row) -> Result<Edge> {
    let created_by: String = field(row, "created_by")?;
    Ok(Edge {
        source_id: NodeId(field(row, "source_id")?),
        target_id: NodeId(field(row, "target_id")?),
        role: field(row, "role")?,
        owner_id: OrgId(field(row, "owner_id")?),
        created_by: (!created_by.is_empty()).then_some(PersonId(created_by)),
        created_at: time_field(row, "created_at")?,
        sort_value: field(row, "sort_value")?,
    })
}

#[async_trait]
impl BackendAdapter for NetworkedBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "networked",
            range_queries: false,
        }
    }

    // ── Nodes ────────────────────────────────────────────────────

    async fn create_node(&self, draft: NewNode) -> Result<Node> {
        let node = Node::new(draft);
        let props_json = serde_json::to_string(&node.properties)?;
        let q = query(
            "MERGE (n:KeystoneNode {id: $id})
             ON CREATE SET
               n.type_name = $type_name, n.owner_id = $owner_id,
               n.props_json = $props_json, n.created_at = $now,
               n.updated_at = $now, n.sort_value = $sort_value,
               n.fresh = true
             WITH n, coalesce(n.fresh, false) AS created
             REMOVE n.fresh
             RETURN created",
        )
        .param("id", node.id.as_str())
        .param("type_name", node.type_name.clone())
        .param("owner_id", node.owner_id.as_str())
        .param("props_json", props_json)
        .param("now", node.created_at.to_rfc3339())
        .param("sort_value", node.sort_value);

        let created = match self.query_one(q).await? {
            Some(row) => field::<bool>(&row, "created")?,
            None => false,
        };
        if !created {
            return Err(KeystoneError::InvalidArgument(format!(
                "node id {} already exists",
                node.id
            )));
        }
        tracing::debug!(id = %node.id, type_name = %node.type_name, "networked: create_node");
        Ok(node)
    }

    async fn get_node(&self, id: &NodeId, owner: Option<&OrgId>) -> Result<Option<Node>> {
        let q = query(&format!("MATCH (n:KeystoneNode {{id: $id}}) {NODE_RETURN}"))
            .param("id", id.as_str());
        let node = match self.query_one(q).await? {
            Some(row) => Some(node_from_row(&row)?),
            None => None,
        };
        Ok(node.filter(|n| owner.map_or(true, |o| &n.owner_id == o)))
    }

    async fn update_node(&self, id: &NodeId, properties: Props) -> Result<Node> {
        let q = query(&format!(
            "MATCH (n:KeystoneNode {{id: $id}})
             SET n.props_json = $props_json, n.updated_at = $now
             {NODE_RETURN}"
        ))
        .param("id", id.as_str())
        .param("props_json", serde_json::to_string(&properties)?)
        .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => {
                tracing::debug!(id = %id, "networked: update_node");
                node_from_row(&row)
            }
            None => Err(KeystoneError::node_not_found(id.as_str())),
        }
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let q = query(
            "MATCH (n:KeystoneNode {id: $id})
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("id", id.as_str());
        let deleted = match self.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        if deleted == 0 {
            return Err(KeystoneError::node_not_found(id.as_str()));
        }
        tracing::debug!(id = %id, "networked: delete_node");
        Ok(())
    }

    async fn query_nodes(&self, query_spec: &NodeQuery) -> Result<Vec<Node>> {
        let mut clauses = Vec::new();
        if let TypeFilter::OneOf(types) = &query_spec.types {
            if types.is_empty() {
                return Ok(Vec::new());
            }
            clauses.push("n.type_name IN $types");
        }
        if query_spec.owner_id.is_some() {
            clauses.push("n.owner_id = $owner_id");
        }
        if query_spec.ids.is_some() {
            clauses.push("n.id IN $ids");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let mut q = query(&format!(
            "MATCH (n:KeystoneNode) {where_clause}
             {NODE_RETURN}
             ORDER BY n.sort_value"
        ));
        if let TypeFilter::OneOf(types) = &query_spec.types {
            q = q.param("types", types.clone());
        }
        if let Some(owner) = &query_spec.owner_id {
            q = q.param("owner_id", owner.as_str());
        }
        if let Some(ids) = &query_spec.ids {
            q = q.param(
                "ids",
                ids.iter().map(|id| id.0.clone()).collect::<Vec<String>>(),
            );
        }

        let mut nodes = Vec::new();
        for row in self.query_rows(q).await? {
            let node = node_from_row(&row)?;
            if query_spec.props.matches(&node.properties) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    // ── Edges ────────────────────────────────────────────────────

    async fn create_edge(&self, draft: NewEdge) -> Result<Edge> {
        let key = edge_key(&draft.source_id, &draft.target_id, &draft.role);
        let q = query(&format!(
            "OPTIONAL MATCH (a:KeystoneNode {{id: $source_id}})
             OPTIONAL MATCH (b:KeystoneNode {{id: $target_id}})
             WITH a, b
             WHERE a IS NOT NULL AND b IS NOT NULL
             MERGE (a)-[r:LINK {{role: $role}}]->(b)
             ON CREATE SET
               r.owner_id = $owner_id, r.created_by = $created_by,
               r.created_at = $now, r.sort_value = $sort_value
             {EDGE_RETURN}"
        ))
        .param("source_id", draft.source_id.as_str())
        .param("target_id", draft.target_id.as_str())
        .param("role", draft.role.clone())
        .param("owner_id", draft.owner_id.as_str())
        .param(
            "created_by",
            draft
                .created_by
                .as_ref()
                .map(|p| p.0.clone())
                .unwrap_or_default(),
        )
        .param("now", Utc::now().to_rfc3339())
        .param("sort_value", next_sort_value());

        match self.query_one(q).await? {
            Some(row) => {
                tracing::debug!(edge = %key, "networked: create_edge");
                edge_from_row(&row)
            }
            None => {
                let missing = if self.get_node(&draft.source_id, None).await?.is_none() {
                    &draft.source_id
                } else {
                    &draft.target_id
                };
                Err(KeystoneError::node_not_found(missing.as_str()))
            }
        }
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let mut clauses = Vec::new();
        if filter.source_id.is_some() {
            clauses.push("a.id = $source_id");
        }
        if filter.target_id.is_some() {
            clauses.push("b.id = $target_id");
        }
        if filter.role.is_some() {
            clauses.push("r.role = $role");
        }
        if filter.owner_id.is_some() {
            clauses.push("r.owner_id = $owner_id");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let mut q = query(&format!(
            "MATCH (a:KeystoneNode)-[r:LINK]->(b:KeystoneNode) {where_clause}
             {EDGE_RETURN}
             ORDER BY r.sort_value"
        ));
        if let Some(source) = &filter.source_id {
            q = q.param("source_id", source.as_str());
        }
        if let Some(target) = &filter.target_id {
            q = q.param("target_id", target.as_str());
        }
        if let Some(role) = &filter.role {
            q = q.param("role", role.clone());
        }
        if let Some(owner) = &filter.owner_id {
            q = q.param("owner_id", owner.as_str());
        }

        self.query_rows(q).await?.iter().map(edge_from_row).collect()
    }

    async fn delete_edge(&self, source: &NodeId, target: &NodeId, role: &str) -> Result<()> {
        let key = edge_key(source, target, role);
        let q = query(
            "MATCH (a:KeystoneNode {id: $source_id})-[r:LINK {role: $role}]->(b:KeystoneNode {id: $target_id})
             DELETE r
             RETURN count(r) AS cnt",
        )
        .param("source_id", source.as_str())
        .param("target_id", target.as_str())
        .param("role", role);
        let deleted = match self.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        if deleted == 0 {
            return Err(KeystoneError::edge_not_found(key));
        }
        tracing::debug!(edge = %key, "networked: delete_edge");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.graph.write().take().is_some() {
            tracing::info!(uri = %self.uri, "Neo4j connection pool released");
        }
        Ok(())
    }
}

impl NetworkedBackend {
    /// Remove every Keystone node and edge. Test helper for shared servers.
    pub async fn purge(&self) -> Result<()> {
        self.run(query("MATCH (n:KeystoneNode) DETACH DELETE n")).await
    }
}
