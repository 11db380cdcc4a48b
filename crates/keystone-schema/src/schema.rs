//! Schema assembly: the set of compiled types reachable from the registered
//! classes, their subtype relations, and an SDL rendering.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use keystone_core::connection::{paginate_array, Connection, ConnectionArgs};
use keystone_core::{CurrentViewer, KeystoneError, Node, PropFilter, Result, TypeFilter};
use keystone_graph::{GraphStore, SharedBackend, TypePolicies};

use crate::class::{ClassRef, NodeClass};
use crate::compiled::{CompiledMutation, CompiledType, MutationKind};
use crate::compiler::Compiler;
use crate::context::RequestContext;
use crate::spec::Cardinality;

pub struct Schema {
    /// In discovery order, each compiled type once.
    types: Vec<Arc<CompiledType>>,
    by_name: HashMap<&'static str, Arc<CompiledType>>,
    /// Type name -> the type and every subtype.
    possible: HashMap<&'static str, Vec<String>>,
    policies: TypePolicies,
}

impl Schema {
    /// Assemble with the process-wide compiler.
    pub fn builder() -> SchemaBuilder<'static> {
        SchemaBuilder::new(Compiler::global())
    }

    pub fn builder_with(compiler: &Compiler) -> SchemaBuilder<'_> {
        SchemaBuilder::new(compiler)
    }

    pub fn types(&self) -> &[Arc<CompiledType>] {
        &self.types
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<CompiledType>> {
        self.by_name.get(type_name)
    }

    /// The type itself plus every type that extends it. Unknown names map
    /// to themselves.
    pub fn possible_type_names(&self, type_name: &str) -> Vec<String> {
        self.possible
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| vec![type_name.to_string()])
    }

    /// The compiled type a stored node belongs to.
    pub fn resolve_type(&self, node: &Node) -> Result<&Arc<CompiledType>> {
        self.by_name
            .get(node.type_name.as_str())
            .ok_or_else(|| KeystoneError::NotFound {
                kind: "type",
                id: node.type_name.clone(),
            })
    }

    /// Access policies of every type, for the graph store.
    pub fn policies(&self) -> &TypePolicies {
        &self.policies
    }

    /// A graph store over `backend` that enforces this schema's policies.
    pub fn store(&self, backend: SharedBackend) -> GraphStore {
        GraphStore::with_policies(backend, self.policies.clone())
    }

    pub fn context(self: &Arc<Self>, viewer: CurrentViewer, store: GraphStore) -> RequestContext {
        RequestContext::new(viewer, store).with_schema(Arc::clone(self))
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Nodes of `type_name` or any subtype, each still carrying its
    /// concrete `type_name`.
    pub async fn query_nodes(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        props: PropFilter,
    ) -> Result<Vec<Node>> {
        let types = TypeFilter::OneOf(self.possible_type_names(type_name));
        ctx.store.query_nodes(&ctx.viewer, types, props).await
    }

    /// [`query_nodes`](Self::query_nodes) windowed as a connection.
    pub async fn query_connection(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        props: PropFilter,
        args: &ConnectionArgs,
    ) -> Result<Connection<Node>> {
        let nodes = self.query_nodes(ctx, type_name, props).await?;
        paginate_array(nodes, args)
    }

    // ── SDL ──────────────────────────────────────────────────────

    /// Render the schema. Types something extends become interfaces.
    pub fn to_sdl(&self) -> String {
        let extended: HashSet<&str> = self
            .types
            .iter()
            .flat_map(|t| t.interfaces.iter().copied())
            .collect();
        let mut ordered: Vec<&Arc<CompiledType>> = self.types.iter().collect();
        ordered.sort_by_key(|t| t.name);

        let mut out = String::from("scalar JSON\nscalar Date\n");

        for t in &ordered {
            for field in t.fields.iter().filter(|f| f.enum_scope == t.name) {
                if let Some(enum_name) = field.enum_type_name() {
                    let _ = writeln!(out, "\nenum {enum_name} {{");
                    for member in &field.spec.enum_values {
                        let _ = writeln!(out, "  {member}");
                    }
                    out.push_str("}\n");
                }
            }
        }

        let mut connections = BTreeSet::new();
        for t in &ordered {
            let keyword = if extended.contains(t.name) {
                "interface"
            } else {
                "type"
            };
            let _ = write!(out, "\n{keyword} {}", t.name);
            if !t.interfaces.is_empty() {
                let _ = write!(out, " implements {}", t.interfaces.join(" & "));
            }
            out.push_str(" {\n");
            for field in &t.fields {
                let args = render_args(field.spec.args.iter().map(|a| a.sdl()));
                let _ = writeln!(out, "  {}{args}: {}", field.name(), field.sdl_type());
            }
            for relation in &t.relations {
                let target = relation.target.name();
                match relation.cardinality {
                    Cardinality::One => {
                        let _ = writeln!(out, "  {}: {target}", relation.name);
                    }
                    Cardinality::Many => {
                        connections.insert(target);
                        let _ = writeln!(
                            out,
                            "  {}(first: Int, after: String, last: Int, before: String): {target}Connection!",
                            relation.name
                        );
                    }
                }
            }
            out.push_str("}\n");
        }

        out.push_str("\ntype Query {\n");
        for t in &ordered {
            let _ = writeln!(out, "  {}(id: ID!): {}", lower_first(t.name), t.name);
            let _ = writeln!(
                out,
                "  all{0}(first: Int, after: String, last: Int, before: String): {0}Connection!",
                t.name
            );
            connections.insert(t.name);
        }
        out.push_str("}\n");

        for target in &connections {
            let _ = write!(
                out,
                "\ntype {target}Connection {{\n  edges: [{target}Edge]\n  pageInfo: PageInfo!\n}}\n\
                 \ntype {target}Edge {{\n  node: {target}\n  cursor: String!\n}}\n"
            );
        }
        if !connections.is_empty() {
            out.push_str(
                "\ntype PageInfo {\n  hasNextPage: Boolean!\n  hasPreviousPage: Boolean!\n  startCursor: String\n  endCursor: String\n}\n",
            );
        }

        let mutations: Vec<(&CompiledType, &CompiledMutation)> = ordered
            .iter()
            .flat_map(|t| {
                let t: &CompiledType = t;
                t.mutations.iter().map(move |m| (t, m))
            })
            .collect();
        if !mutations.is_empty() {
            out.push_str("\ntype Mutation {\n");
            for (t, m) in mutations {
                let args = render_args(m.args.iter().map(|a| {
                    // Generated mutations take the field's enum type.
                    let enum_name = match m.kind {
                        MutationKind::Custom => None,
                        _ => t.field(&a.name).and_then(|f| f.enum_type_name()),
                    };
                    match enum_name {
                        Some(enum_name) => {
                            format!("{}: {enum_name}{}", a.name, if a.nullable { "" } else { "!" })
                        }
                        None => a.sdl(),
                    }
                }));
                let _ = writeln!(out, "  {}{args}: {}!", m.name, t.name);
            }
            out.push_str("}\n");
        }
        out
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn render_args(args: impl Iterator<Item = String>) -> String {
    let args: Vec<String> = args.collect();
    if args.is_empty() {
        String::new()
    } else {
        format!("({})", args.join(", "))
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.types.iter().map(|t| t.name).collect();
        f.debug_struct("Schema").field("types", &names).finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────

/// Collects root classes; [`build`](Self::build) compiles them and every
/// class they reach through parents, relations and `created_by`.
pub struct SchemaBuilder<'c> {
    compiler: &'c Compiler,
    roots: Vec<ClassRef>,
}

impl<'c> SchemaBuilder<'c> {
    fn new(compiler: &'c Compiler) -> Self {
        Self {
            compiler,
            roots: Vec::new(),
        }
    }

    pub fn register<T: NodeClass>(self) -> Self {
        self.register_class(ClassRef::of::<T>())
    }

    pub fn register_class(mut self, class: ClassRef) -> Self {
        self.roots.push(class);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut pending: Vec<ClassRef> = self.roots.into_iter().rev().collect();
        let mut seen: HashSet<*const CompiledType> = HashSet::new();
        let mut types: Vec<Arc<CompiledType>> = Vec::new();
        let mut by_name: HashMap<&'static str, Arc<CompiledType>> = HashMap::new();

        while let Some(class) = pending.pop() {
            let compiled = self.compiler.compile(class)?;
            if !seen.insert(Arc::as_ptr(&compiled)) {
                continue;
            }
            if by_name.contains_key(compiled.name) {
                return Err(KeystoneError::SpecValidation(format!(
                    "two classes are named {}",
                    compiled.name
                )));
            }

            if let Some(parent) = class.parent() {
                pending.push(parent);
            }
            for relation in &compiled.relations {
                pending.push(relation.target);
            }
            for mutation in &compiled.mutations {
                if let Some(created_by) = mutation.created_by() {
                    pending.push(created_by.parent);
                }
            }
            by_name.insert(compiled.name, Arc::clone(&compiled));
            types.push(compiled);
        }

        let mut possible: HashMap<&'static str, Vec<String>> = HashMap::new();
        let mut policies = TypePolicies::new();
        for t in &types {
            for name in std::iter::once(t.name).chain(t.interfaces.iter().copied()) {
                possible.entry(name).or_default().push(t.name.to_string());
            }
            policies.insert(t.name, t.access);
        }

        tracing::info!(types = types.len(), "Schema assembled");
        Ok(Schema {
            types,
            by_name,
            possible,
            policies,
        })
    }
}
