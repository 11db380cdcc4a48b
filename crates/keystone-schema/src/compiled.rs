//! Compiled node types: the merged field list, relation resolvers, and the
//! mutation table of one class.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use keystone_core::connection::{paginate_traversal, ConnectionArgs};
use keystone_core::{AccessPolicy, KeystoneError, Node, NodeId, PropFilter, Props, Result, TypeFilter};

use crate::class::ClassRef;
use crate::compiler::Compiler;
use crate::context::{id_arg, Arguments, MutationHandler, RequestContext};
use crate::spec::{ArgSpec, Cardinality, CreatedBy, Direction, FieldSpec, RelationSpec, ScalarKind};

/// A scalar field plus the class that declared it.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub spec: FieldSpec,
    pub declared_by: &'static str,
    /// Type whose name prefixes the generated enum. Overrides keep the
    /// ancestor's enum so subtypes stay compatible with their interfaces.
    pub enum_scope: &'static str,
}

impl CompiledField {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Fields with a custom resolver have no stored value.
    pub fn is_computed(&self) -> bool {
        self.spec.resolver.is_some()
    }

    /// SDL name of the generated enum type, for enum fields.
    pub fn enum_type_name(&self) -> Option<String> {
        (self.spec.kind == ScalarKind::Enum)
            .then(|| format!("{}_{}_Enum", self.enum_scope, self.spec.name))
    }

    pub fn sdl_type(&self) -> String {
        let base = self
            .enum_type_name()
            .unwrap_or_else(|| self.spec.kind.sdl_name().to_string());
        if self.spec.nullable {
            base
        } else {
            format!("{base}!")
        }
    }

    fn check(&self, owner: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            if self.spec.nullable {
                return Ok(());
            }
            return Err(KeystoneError::InvalidArgument(format!(
                "{owner}.{} may not be null",
                self.spec.name
            )));
        }
        if !self.spec.kind.accepts(value, &self.spec.enum_values) {
            return Err(KeystoneError::InvalidArgument(format!(
                "{owner}.{} expects {}, got {value}",
                self.spec.name, self.spec.kind
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Custom,
}

/// One entry of the mutation table.
#[derive(Clone)]
pub struct CompiledMutation {
    pub name: String,
    pub kind: MutationKind,
    pub args: Vec<ArgSpec>,
    pub(crate) handler: Option<MutationHandler>,
    pub(crate) created_by: Option<CreatedBy>,
}

impl CompiledMutation {
    /// Whether a declared override replaces the generated behaviour.
    pub fn is_overridden(&self) -> bool {
        self.kind != MutationKind::Custom && self.handler.is_some()
    }

    pub fn created_by(&self) -> Option<&CreatedBy> {
        self.created_by.as_ref()
    }
}

impl fmt::Debug for CompiledMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMutation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("created_by", &self.created_by)
            .finish()
    }
}

/// The output of compiling one class. Produced once per class and shared by
/// reference.
#[derive(Debug)]
pub struct CompiledType {
    pub name: &'static str,
    pub class: ClassRef,
    pub parent: Option<Arc<CompiledType>>,
    /// Ancestor type names, nearest first.
    pub interfaces: Vec<&'static str>,
    /// `id` first, then inherited fields, then the class's own.
    pub fields: Vec<CompiledField>,
    pub relations: Vec<RelationSpec>,
    pub mutations: Vec<CompiledMutation>,
    pub access: AccessPolicy,
    pub is_abstract: bool,
}

impl CompiledType {
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn mutation(&self, name: &str) -> Option<&CompiledMutation> {
        self.mutations.iter().find(|m| m.name == name)
    }

    /// True for this type and every type it extends.
    pub fn implements(&self, type_name: &str) -> bool {
        self.name == type_name || self.interfaces.iter().any(|i| *i == type_name)
    }

    // ── Resolvers ────────────────────────────────────────────────

    /// Resolve `name` on `node`. Scalars read `node.properties` unless a
    /// custom resolver exists; relations traverse edges with the declared
    /// role. A missing stored value or an unlinked `one` relation resolves
    /// to null.
    pub async fn resolve_field(
        &self,
        node: &Node,
        name: &str,
        args: Arguments,
        ctx: &RequestContext,
    ) -> Result<Value> {
        match name {
            "id" => return Ok(Value::String(node.id.to_string())),
            "__typename" => return Ok(Value::String(node.type_name.clone())),
            _ => {}
        }
        if let Some(field) = self.field(name) {
            return match &field.spec.resolver {
                Some(resolver) => resolver(node.clone(), args, ctx.clone()).await,
                None => Ok(node.property(name).cloned().unwrap_or(Value::Null)),
            };
        }
        if let Some(relation) = self.relation(name) {
            return self.resolve_relation(node, relation, &args, ctx).await;
        }
        Err(KeystoneError::InvalidArgument(format!(
            "{} has no field \"{name}\"",
            self.name
        )))
    }

    async fn resolve_relation(
        &self,
        node: &Node,
        relation: &RelationSpec,
        args: &Arguments,
        ctx: &RequestContext,
    ) -> Result<Value> {
        let related = self.linked(ctx, &node.id, relation).await?;
        match relation.cardinality {
            Cardinality::One => match related.into_iter().next() {
                Some(first) => Ok(serde_json::to_value(first)?),
                None => Ok(Value::Null),
            },
            Cardinality::Many => {
                let connection = paginate_traversal(
                    related,
                    &ConnectionArgs::from_json(args),
                    ctx.store.range_queries_supported(),
                )?;
                Ok(serde_json::to_value(connection)?)
            }
        }
    }

    /// Nodes reached from `id` over the relation's role and direction.
    async fn linked(
        &self,
        ctx: &RequestContext,
        id: &NodeId,
        relation: &RelationSpec,
    ) -> Result<Vec<Node>> {
        let types = TypeFilter::OneOf(ctx.type_names(relation.target.name()));
        let role = Some(relation.role.as_str());
        let props = PropFilter::default();
        match relation.direction {
            Direction::Out => {
                ctx.store
                    .target_instances(&ctx.viewer, id, types, role, &props)
                    .await
            }
            Direction::In => {
                ctx.store
                    .source_instances(&ctx.viewer, id, types, role, &props)
                    .await
            }
        }
    }

    // ── Relation Helpers ─────────────────────────────────────────

    /// Nodes linked to `id` through the relation `name`, oldest link first.
    pub async fn find_related(
        &self,
        ctx: &RequestContext,
        id: &NodeId,
        name: &str,
    ) -> Result<Vec<Node>> {
        let relation = self.declared_relation(name)?;
        self.load_own(ctx, id).await?;
        self.linked(ctx, id, relation).await
    }

    /// Create a node of the relation's target type in the org of `id` and
    /// link it under the relation's role, in the relation's direction.
    pub async fn create_related(
        &self,
        ctx: &RequestContext,
        id: &NodeId,
        name: &str,
        props: Props,
    ) -> Result<Node> {
        let relation = self.declared_relation(name)?;
        self.load_own(ctx, id).await?;
        let target = related_type(ctx, relation)?;
        target.ensure_concrete()?;
        target.validate_props(&props, true)?;
        match relation.direction {
            Direction::Out => {
                ctx.store
                    .create_target_node(&ctx.viewer, id, target.name, props, &relation.role)
                    .await
            }
            Direction::In => {
                ctx.store
                    .create_source_node(&ctx.viewer, id, target.name, props, &relation.role)
                    .await
            }
        }
    }

    /// Remove the links of relation `name` from `id`, or only the link to
    /// `only` when given. With `delete_node` the unlinked nodes are deleted
    /// too. Returns how many links were removed.
    pub async fn delete_related(
        &self,
        ctx: &RequestContext,
        id: &NodeId,
        name: &str,
        only: Option<&NodeId>,
        delete_node: bool,
    ) -> Result<usize> {
        let relation = self.declared_relation(name)?;
        self.load_own(ctx, id).await?;
        let related = self.linked(ctx, id, relation).await?;

        let mut removed = 0;
        for node in related.iter().filter(|n| only.map_or(true, |o| &n.id == o)) {
            let (source, target) = match relation.direction {
                Direction::Out => (id, &node.id),
                Direction::In => (&node.id, id),
            };
            ctx.store
                .delete_edge(&ctx.viewer, source, target, &relation.role)
                .await?;
            if delete_node {
                ctx.store.delete_node(&ctx.viewer, &node.id).await?;
            }
            removed += 1;
        }
        tracing::debug!(node = %id, relation = name, removed, delete_node, "Relation cleared");
        Ok(removed)
    }

    fn declared_relation(&self, name: &str) -> Result<&RelationSpec> {
        self.relation(name).ok_or_else(|| {
            KeystoneError::InvalidArgument(format!("{} has no relation \"{name}\"", self.name))
        })
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Run the mutation `name` from this type's table.
    pub async fn run_mutation(
        &self,
        name: &str,
        mut args: Arguments,
        ctx: &RequestContext,
    ) -> Result<Node> {
        let mutation = self.mutation(name).ok_or_else(|| {
            KeystoneError::InvalidArgument(format!("{} has no mutation \"{name}\"", self.name))
        })?;
        if mutation.kind == MutationKind::Custom {
            for arg in &mutation.args {
                arg.check(&mutation.name, &args)?;
            }
        }
        if let Some(handler) = &mutation.handler {
            tracing::debug!(mutation = name, viewer = %ctx.viewer, "Running declared mutation");
            return handler(args, ctx.clone()).await;
        }

        match mutation.kind {
            MutationKind::Create => match &mutation.created_by {
                Some(created_by) => {
                    let parent_id = id_arg(&args, "parentId")?;
                    args.remove("parentId");
                    self.create_under(ctx, created_by, &parent_id, args).await
                }
                None => self.create(ctx, args).await,
            },
            MutationKind::Update => {
                let id = id_arg(&args, "id")?;
                args.remove("id");
                self.update(ctx, &id, args).await
            }
            MutationKind::Delete => {
                let id = id_arg(&args, "id")?;
                let node = self.load_own(ctx, &id).await?;
                ctx.store.delete_node(&ctx.viewer, &id).await?;
                Ok(node)
            }
            MutationKind::Custom => Err(KeystoneError::NotImplemented(format!(
                "mutation {name} has no handler"
            ))),
        }
    }

    /// Create a node of this type in the viewer's org.
    pub async fn create(&self, ctx: &RequestContext, props: Props) -> Result<Node> {
        self.ensure_concrete()?;
        self.validate_props(&props, true)?;
        ctx.store.create_node(&ctx.viewer, self.name, props).await
    }

    /// Create a node of this type under `parent_id`, in the parent's org.
    async fn create_under(
        &self,
        ctx: &RequestContext,
        created_by: &CreatedBy,
        parent_id: &NodeId,
        props: Props,
    ) -> Result<Node> {
        self.ensure_concrete()?;
        self.validate_props(&props, true)?;
        let parent = ctx.store.get_node(&ctx.viewer, parent_id).await?;
        if !ctx
            .type_names(created_by.parent.name())
            .contains(&parent.type_name)
        {
            return Err(KeystoneError::InvalidArgument(format!(
                "parent {parent_id} is a {}, expected {}",
                parent.type_name,
                created_by.parent.name()
            )));
        }
        ctx.store
            .create_target_node(&ctx.viewer, parent_id, self.name, props, &created_by.role)
            .await
    }

    /// Validate and merge `patch` into the node's properties.
    pub async fn update(&self, ctx: &RequestContext, id: &NodeId, patch: Props) -> Result<Node> {
        self.load_own(ctx, id).await?;
        self.validate_props(&patch, false)?;
        ctx.store.update_node(&ctx.viewer, id, patch).await
    }

    /// Set one declared field, re-validating it against the compiled field
    /// list.
    pub async fn set_field(
        &self,
        ctx: &RequestContext,
        id: &NodeId,
        name: &str,
        value: Value,
    ) -> Result<Node> {
        let mut patch = Props::new();
        patch.insert(name.to_string(), value);
        self.update(ctx, id, patch).await
    }

    /// Check `props` against the declared fields. With `require_all`, every
    /// stored non-null field must be present.
    pub fn validate_props(&self, props: &Props, require_all: bool) -> Result<()> {
        for (key, value) in props {
            let field = match self.field(key) {
                Some(field) if key == "id" => {
                    return Err(KeystoneError::InvalidArgument(format!(
                        "{}.{} is read-only",
                        self.name,
                        field.name()
                    )))
                }
                Some(field) => field,
                None if self.relation(key).is_some() => {
                    return Err(KeystoneError::InvalidArgument(format!(
                        "{}.{key} is a relation; link it with an edge",
                        self.name
                    )))
                }
                None => {
                    return Err(KeystoneError::InvalidArgument(format!(
                        "{} has no field \"{key}\"",
                        self.name
                    )))
                }
            };
            if field.is_computed() {
                return Err(KeystoneError::InvalidArgument(format!(
                    "{}.{key} is computed and cannot be written",
                    self.name
                )));
            }
            field.check(self.name, value)?;
        }

        if require_all {
            let missing = self.fields.iter().find(|f| {
                f.name() != "id"
                    && !f.spec.nullable
                    && !f.is_computed()
                    && !props.contains_key(f.name())
            });
            if let Some(field) = missing {
                return Err(KeystoneError::InvalidArgument(format!(
                    "{}.{} is required",
                    self.name,
                    field.name()
                )));
            }
        }
        Ok(())
    }

    fn ensure_concrete(&self) -> Result<()> {
        if self.is_abstract {
            return Err(KeystoneError::InvalidArgument(format!(
                "{} is abstract and cannot be instantiated",
                self.name
            )));
        }
        Ok(())
    }

    /// Load `id` and check it is an instance of this type or a subtype.
    async fn load_own(&self, ctx: &RequestContext, id: &NodeId) -> Result<Node> {
        let node = ctx.store.get_node(&ctx.viewer, id).await?;
        if !ctx.type_names(self.name).contains(&node.type_name) {
            return Err(KeystoneError::InvalidArgument(format!(
                "node {id} is a {}, not a {}",
                node.type_name, self.name
            )));
        }
        Ok(node)
    }
}

/// Compiled type of a relation's target, from the attached schema when there
/// is one.
fn related_type(ctx: &RequestContext, relation: &RelationSpec) -> Result<Arc<CompiledType>> {
    match ctx.schema.as_ref().and_then(|s| s.get(relation.target.name())) {
        Some(compiled) => Ok(Arc::clone(compiled)),
        None => Compiler::global().compile(relation.target),
    }
}
