//! Single-file adapter on SQLite.
//!
//! Writes are serialized through one connection behind a mutex; every call
//! runs on the blocking pool so async callers never stall the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use keystone_core::types::edge_key;
use keystone_core::{
    Edge, EdgeFilter, KeystoneError, NewEdge, NewNode, Node, NodeId, NodeQuery, OrgId, PersonId,
    Props, Result, TypeFilter,
};

use super::{BackendAdapter, BackendCapabilities};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id              TEXT PRIMARY KEY,
        type            TEXT NOT NULL,
        owner_id        TEXT NOT NULL,
        properties_json TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        sort_value      INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS edges (
        source_id  TEXT NOT NULL,
        target_id  TEXT NOT NULL,
        role       TEXT NOT NULL,
        owner_id   TEXT NOT NULL,
        created_by TEXT,
        created_at TEXT NOT NULL,
        sort_value INTEGER NOT NULL,
        PRIMARY KEY (source_id, target_id, role)
    );
    CREATE INDEX IF NOT EXISTS idx_nodes_type_owner ON nodes(type, owner_id);
    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id, sort_value);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id, sort_value);
"#;

const NODE_COLUMNS: &str =
    "id, type, owner_id, properties_json, created_at, updated_at, sort_value";
const EDGE_COLUMNS: &str =
    "source_id, target_id, role, owner_id, created_by, created_at, sort_value";

/// SQLite-backed adapter. `:memory:` opens a private in-memory database.
pub struct EmbeddedBackend {
    conn: Arc<Mutex<Option<Connection>>>,
    path: String,
}

impl EmbeddedBackend {
    pub async fn open(path: &str) -> Result<Self> {
        let owned = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = if owned == ":memory:" {
                Connection::open_in_memory()
            } else {
                Connection::open(&owned)
            }
            .map_err(KeystoneError::storage)?;
            conn.execute_batch(SCHEMA).map_err(KeystoneError::storage)?;
            Ok(conn)
        })
        .await
        .map_err(KeystoneError::storage)??;

        tracing::info!(path = %path, "Opened embedded backend");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            let conn = guard.as_mut().ok_or_else(|| {
                KeystoneError::StorageUnavailable("embedded backend is closed".into())
            })?;
            op(conn)
        })
        .await
        .map_err(KeystoneError::storage)?
    }
}

// ── Row Mapping ──────────────────────────────────────────────────

fn parse_time(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    let props_json: String = row.get(3)?;
    let properties: Props = serde_json::from_str(&props_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Node {
        id: NodeId(row.get(0)?),
        type_name: row.get(1)?,
        owner_id: OrgId(row.get(2)?),
        properties,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
        sort_value: row.get(6)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        source_id: NodeId(row.get(0)?),
        target_id: NodeId(row.get(1)?),
        role: row.get(2)?,
        owner_id: OrgId(row.get(3)?),
        created_by: row.get::<_, Option<String>>(4)?.map(PersonId),
        created_at: parse_time(&row.get::<_, String>(5)?)?,
        sort_value: row.get(6)?,
    })
}

fn load_node(conn: &Connection, id: &str) -> Result<Option<Node>> {
    conn.query_row(
        &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
        params![id],
        node_from_row,
    )
    .optional()
    .map_err(KeystoneError::storage)
}

fn load_edge(conn: &Connection, source: &str, target: &str, role: &str) -> Result<Option<Edge>> {
    conn.query_row(
        &format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE source_id = ?1 AND target_id = ?2 AND role = ?3"
        ),
        params![source, target, role],
        edge_from_row,
    )
    .optional()
    .map_err(KeystoneError::storage)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl BackendAdapter for EmbeddedBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "embedded",
            range_queries: false,
        }
    }

    async fn create_node(&self, draft: NewNode) -> Result<Node> {
        let node = Node::new(draft);
        tracing::debug!(id = %node.id, type_name = %node.type_name, "embedded: create_node");
        self.with_conn(move |conn| {
            let props_json = serde_json::to_string(&node.properties)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO nodes (id, type, owner_id, properties_json, created_at, updated_at, sort_value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        node.id.as_str(),
                        node.type_name,
                        node.owner_id.as_str(),
                        props_json,
                        node.created_at.to_rfc3339(),
                        node.updated_at.to_rfc3339(),
                        node.sort_value,
                    ],
                )
                .map_err(KeystoneError::storage)?;
            if inserted == 0 {
                return Err(KeystoneError::InvalidArgument(format!(
                    "node id {} already exists",
                    node.id
                )));
            }
            Ok(node)
        })
        .await
    }

    async fn get_node(&self, id: &NodeId, owner: Option<&OrgId>) -> Result<Option<Node>> {
        let id = id.clone();
        let owner = owner.cloned();
        self.with_conn(move |conn| {
            Ok(load_node(conn, id.as_str())?
                .filter(|n| owner.as_ref().map_or(true, |o| &n.owner_id == o)))
        })
        .await
    }

    async fn update_node(&self, id: &NodeId, properties: Props) -> Result<Node> {
        let id = id.clone();
        tracing::debug!(id = %id, "embedded: update_node");
        self.with_conn(move |conn| {
            let props_json = serde_json::to_string(&properties)?;
            let changed = conn
                .execute(
                    "UPDATE nodes SET properties_json = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.as_str(), props_json, Utc::now().to_rfc3339()],
                )
                .map_err(KeystoneError::storage)?;
            if changed == 0 {
                return Err(KeystoneError::node_not_found(id.as_str()));
            }
            load_node(conn, id.as_str())?.ok_or_else(|| KeystoneError::node_not_found(id.as_str()))
        })
        .await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(KeystoneError::storage)?;
            let severed = tx
                .execute(
                    "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
                    params![id.as_str()],
                )
                .map_err(KeystoneError::storage)?;
            let deleted = tx
                .execute("DELETE FROM nodes WHERE id = ?1", params![id.as_str()])
                .map_err(KeystoneError::storage)?;
            if deleted == 0 {
                return Err(KeystoneError::node_not_found(id.as_str()));
            }
            tx.commit().map_err(KeystoneError::storage)?;
            tracing::debug!(id = %id, severed, "embedded: delete_node");
            Ok(())
        })
        .await
    }

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1 = 1");
            let mut args: Vec<String> = Vec::new();
            if let TypeFilter::OneOf(types) = &query.types {
                if types.is_empty() {
                    return Ok(Vec::new());
                }
                sql.push_str(&format!(" AND type IN ({})", placeholders(types.len())));
                args.extend(types.iter().cloned());
            }
            if let Some(owner) = &query.owner_id {
                sql.push_str(" AND owner_id = ?");
                args.push(owner.0.clone());
            }
            if let Some(ids) = &query.ids {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                sql.push_str(&format!(" AND id IN ({})", placeholders(ids.len())));
                args.extend(ids.iter().map(|id| id.0.clone()));
            }
            sql.push_str(" ORDER BY sort_value");

            let mut stmt = conn.prepare(&sql).map_err(KeystoneError::storage)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), node_from_row)
                .map_err(KeystoneError::storage)?;
            let mut nodes = Vec::new();
            for row in rows {
                let node = row.map_err(KeystoneError::storage)?;
                if query.props.matches(&node.properties) {
                    nodes.push(node);
                }
            }
            Ok(nodes)
        })
        .await
    }

    async fn create_edge(&self, draft: NewEdge) -> Result<Edge> {
        self.with_conn(move |conn| {
            for endpoint in [&draft.source_id, &draft.target_id] {
                if load_node(conn, endpoint.as_str())?.is_none() {
                    return Err(KeystoneError::node_not_found(endpoint.as_str()));
                }
            }
            if let Some(existing) = load_edge(
                conn,
                draft.source_id.as_str(),
                draft.target_id.as_str(),
                &draft.role,
            )? {
                return Ok(existing);
            }
            let edge = Edge::new(draft);
            conn.execute(
                "INSERT INTO edges (source_id, target_id, role, owner_id, created_by, created_at, sort_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    edge.source_id.as_str(),
                    edge.target_id.as_str(),
                    edge.role,
                    edge.owner_id.as_str(),
                    edge.created_by.as_ref().map(|p| p.as_str()),
                    edge.created_at.to_rfc3339(),
                    edge.sort_value,
                ],
            )
            .map_err(KeystoneError::storage)?;
            tracing::debug!(edge = %edge.key(), "embedded: create_edge");
            Ok(edge)
        })
        .await
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = format!("SELECT {EDGE_COLUMNS} FROM edges WHERE 1 = 1");
            let mut args: Vec<String> = Vec::new();
            let columns = [
                ("source_id", filter.source_id.as_ref().map(|v| v.0.clone())),
                ("target_id", filter.target_id.as_ref().map(|v| v.0.clone())),
                ("role", filter.role.clone()),
                ("owner_id", filter.owner_id.as_ref().map(|v| v.0.clone())),
            ];
            for (column, value) in columns {
                if let Some(value) = value {
                    sql.push_str(&format!(" AND {column} = ?"));
                    args.push(value);
                }
            }
            sql.push_str(" ORDER BY sort_value");

            let mut stmt = conn.prepare(&sql).map_err(KeystoneError::storage)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), edge_from_row)
                .map_err(KeystoneError::storage)?;
            let edges = rows
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(KeystoneError::storage)?;
            Ok(edges)
        })
        .await
    }

    async fn delete_edge(&self, source: &NodeId, target: &NodeId, role: &str) -> Result<()> {
        let key = edge_key(source, target, role);
        let (source, target, role) = (source.clone(), target.clone(), role.to_string());
        self.with_conn(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM edges WHERE source_id = ?1 AND target_id = ?2 AND role = ?3",
                    params![source.as_str(), target.as_str(), role],
                )
                .map_err(KeystoneError::storage)?;
            if deleted == 0 {
                return Err(KeystoneError::edge_not_found(key));
            }
            tracing::debug!(edge = %key, "embedded: delete_edge");
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| KeystoneError::storage(e))?;
            tracing::info!(path = %self.path, "Embedded backend closed");
        }
        Ok(())
    }
}
