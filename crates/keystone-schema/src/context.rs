//! Per-request context handed to resolvers and mutations.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use keystone_core::{CurrentViewer, KeystoneError, Node, NodeId, Props, Result};
use keystone_graph::GraphStore;

use crate::schema::Schema;

/// Field or mutation arguments, as the API layer parsed them.
pub type Arguments = Props;

/// What a resolver sees besides its source node: the caller's capability,
/// the store, and the assembled schema when one exists.
#[derive(Clone)]
pub struct RequestContext {
    pub viewer: CurrentViewer,
    pub store: GraphStore,
    pub schema: Option<Arc<Schema>>,
}

impl RequestContext {
    pub fn new(viewer: CurrentViewer, store: GraphStore) -> Self {
        Self {
            viewer,
            store,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Type names a query for `type_name` should match: the type and, when
    /// a schema is attached, every subtype.
    pub fn type_names(&self, type_name: &str) -> Vec<String> {
        match &self.schema {
            Some(schema) => schema.possible_type_names(type_name),
            None => vec![type_name.to_string()],
        }
    }
}

/// Computes a field value for a node.
pub type FieldResolver =
    Arc<dyn Fn(Node, Arguments, RequestContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Runs a mutation and returns the affected node.
pub type MutationHandler =
    Arc<dyn Fn(Arguments, RequestContext) -> BoxFuture<'static, Result<Node>> + Send + Sync>;

pub fn field_resolver<F, Fut>(f: F) -> FieldResolver
where
    F: Fn(Node, Arguments, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |node, args, ctx| f(node, args, ctx).boxed())
}

pub fn mutation_handler<F, Fut>(f: F) -> MutationHandler
where
    F: Fn(Arguments, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Node>> + Send + 'static,
{
    Arc::new(move |args, ctx| f(args, ctx).boxed())
}

// ── Argument Access ──────────────────────────────────────────────

/// Required string argument.
pub fn string_arg(args: &Arguments, name: &str) -> Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KeystoneError::InvalidArgument(format!("missing argument \"{name}\"")))
}

/// Required id argument.
pub fn id_arg(args: &Arguments, name: &str) -> Result<NodeId> {
    string_arg(args, name).map(NodeId::from)
}
