//! Core graph records shared by the store, the adapters, and the compiler.
//!
//! A [`Node`] is a typed, owner-scoped property bag; an [`Edge`] is a
//! directed, role-labelled link between two node ids.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared properties of a node, keyed by field name.
pub type Props = serde_json::Map<String, serde_json::Value>;

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Globally unique node identifier, unique across all node types.
    NodeId
);
opaque_id!(
    /// Tenant scope: the organization that owns a node.
    OrgId
);
opaque_id!(
    /// An authenticated person.
    PersonId
);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl OrgId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

// ── Ordering ──────────────────────────────────────────────────────

static LAST_SORT_VALUE: AtomicI64 = AtomicI64::new(0);

/// Monotonic creation-order key: the current time in microseconds, bumped
/// past the previous value when two records are created in the same tick.
pub fn next_sort_value() -> i64 {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_SORT_VALUE.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_SORT_VALUE.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

// ── Records ───────────────────────────────────────────────────────

/// A typed record in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub owner_id: OrgId,
    pub type_name: String,
    pub properties: Props,
    pub sort_value: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build a fresh record; adapters call this from `create_node`.
    pub fn new(draft: NewNode) -> Self {
        let now = Utc::now();
        Self {
            id: draft.id.unwrap_or_default(),
            owner_id: draft.owner_id,
            type_name: draft.type_name,
            properties: draft.properties,
            sort_value: next_sort_value(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.type_name, self.id, self.owner_id)
    }
}

/// Input to `create_node`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    /// Caller-chosen id; a UUID is generated when absent.
    pub id: Option<NodeId>,
    pub type_name: String,
    pub owner_id: OrgId,
    pub properties: Props,
}

/// A directed, role-labelled link. Edges are never mutated, only created or
/// deleted; `(source_id, target_id, role)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub role: String,
    /// Org of the principal that created the edge (empty for omni writes).
    pub owner_id: OrgId,
    pub created_by: Option<PersonId>,
    pub sort_value: i64,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(draft: NewEdge) -> Self {
        Self {
            source_id: draft.source_id,
            target_id: draft.target_id,
            role: draft.role,
            owner_id: draft.owner_id,
            created_by: draft.created_by,
            sort_value: next_sort_value(),
            created_at: Utc::now(),
        }
    }

    /// Stable textual key, used in logs and `NotFound` errors.
    pub fn key(&self) -> String {
        edge_key(&self.source_id, &self.target_id, &self.role)
    }
}

pub fn edge_key(source: &NodeId, target: &NodeId, role: &str) -> String {
    format!("{source}->{target}:{role}")
}

/// Input to `create_edge`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEdge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub role: String,
    pub owner_id: OrgId,
    pub created_by: Option<PersonId>,
}

// ── Filters ───────────────────────────────────────────────────────

/// Property equality filter: every pair must match exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropFilter(pub Props);

impl PropFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, props: &Props) -> bool {
        self.0.iter().all(|(k, v)| props.get(k) == Some(v))
    }
}

/// One type name, or a set of them (a type plus its subtypes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    OneOf(Vec<String>),
}

impl TypeFilter {
    pub fn exact(name: impl Into<String>) -> Self {
        Self::OneOf(vec![name.into()])
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(names) => names.iter().any(|n| n == type_name),
        }
    }
}

impl From<&str> for TypeFilter {
    fn from(value: &str) -> Self {
        Self::exact(value)
    }
}

impl From<String> for TypeFilter {
    fn from(value: String) -> Self {
        Self::exact(value)
    }
}

impl From<Vec<String>> for TypeFilter {
    fn from(value: Vec<String>) -> Self {
        Self::OneOf(value)
    }
}

/// Node query issued against an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeQuery {
    pub types: TypeFilter,
    pub props: PropFilter,
    /// `None` means unscoped; only omni viewers produce unscoped queries.
    pub owner_id: Option<OrgId>,
    /// Restrict to these ids when present.
    pub ids: Option<Vec<NodeId>>,
}

impl NodeQuery {
    pub fn of_type(types: impl Into<TypeFilter>) -> Self {
        Self {
            types: types.into(),
            props: PropFilter::default(),
            owner_id: None,
            ids: None,
        }
    }

    pub fn with_props(mut self, props: PropFilter) -> Self {
        self.props = props;
        self
    }

    pub fn owned_by(mut self, owner: Option<OrgId>) -> Self {
        self.owner_id = owner;
        self
    }

    pub fn with_ids(mut self, ids: Vec<NodeId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if !self.types.matches(&node.type_name) {
            return false;
        }
        if let Some(owner) = &self.owner_id {
            if &node.owner_id != owner {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&node.id) {
                return false;
            }
        }
        self.props.matches(&node.properties)
    }
}

/// Edge lookup; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    pub source_id: Option<NodeId>,
    pub target_id: Option<NodeId>,
    pub role: Option<String>,
    pub owner_id: Option<OrgId>,
}

impl EdgeFilter {
    pub fn from_source(source: &NodeId) -> Self {
        Self {
            source_id: Some(source.clone()),
            ..Default::default()
        }
    }

    pub fn to_target(target: &NodeId) -> Self {
        Self {
            target_id: Some(target.clone()),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: Option<&str>) -> Self {
        self.role = role.map(str::to_string);
        self
    }

    pub fn owned_by(mut self, owner: Option<OrgId>) -> Self {
        self.owner_id = owner;
        self
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        self.source_id.as_ref().map_or(true, |s| s == &edge.source_id)
            && self.target_id.as_ref().map_or(true, |t| t == &edge.target_id)
            && self.role.as_ref().map_or(true, |r| r == &edge.role)
            && self.owner_id.as_ref().map_or(true, |o| o == &edge.owner_id)
    }
}
