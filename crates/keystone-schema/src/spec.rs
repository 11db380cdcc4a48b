//! Declarations a node class makes about itself.
//!
//! [`SpecBuilder`] accumulates field, relation, and mutation declarations
//! into an immutable [`NodeSpec`]. Declaration mistakes are recorded, not
//! raised, and surface as `SpecValidation` when the class is compiled.

use std::fmt;
use std::future::Future;

use serde_json::Value;

use keystone_core::{KeystoneError, Node, Result};

use crate::class::{ClassRef, NodeClass};
use crate::context::{
    field_resolver, mutation_handler, Arguments, FieldResolver, MutationHandler, RequestContext,
};

/// Names no declaration may take.
pub const RESERVED_NAMES: &[&str] = &["id", "__typename"];

// ── Scalars ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Id,
    String,
    Int,
    Float,
    Boolean,
    Json,
    /// RFC 3339 timestamp carried as a string.
    Date,
    /// One of a declared member list.
    Enum,
}

impl ScalarKind {
    /// Name of the scalar in rendered SDL. Enums are named per field.
    pub fn sdl_name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Json => "JSON",
            Self::Date => "Date",
            Self::Enum => "String",
        }
    }

    /// Whether a non-null `value` is a valid instance of this kind.
    pub fn accepts(&self, value: &Value, enum_values: &[String]) -> bool {
        match self {
            Self::Id | Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Json => true,
            Self::Date => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Enum => value
                .as_str()
                .is_some_and(|s| enum_values.iter().any(|m| m == s)),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Date => "date",
            Self::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// A typed argument on a field or mutation. Arguments are nullable unless
/// built with [`ArgSpec::required`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    pub fn required(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, kind)
        }
    }

    pub(crate) fn sdl(&self) -> String {
        let bang = if self.nullable { "" } else { "!" };
        format!("{}: {}{bang}", self.name, self.kind.sdl_name())
    }

    /// Check this argument's value in `args`. Arguments carry no member
    /// list, so an enum argument only has to be a string.
    pub fn check(&self, mutation: &str, args: &Arguments) -> Result<()> {
        let value = match args.get(&self.name) {
            None | Some(Value::Null) if self.nullable => return Ok(()),
            None | Some(Value::Null) => {
                return Err(KeystoneError::InvalidArgument(format!(
                    "{mutation} requires argument \"{}\"",
                    self.name
                )))
            }
            Some(value) => value,
        };
        let accepted = match self.kind {
            ScalarKind::Enum => value.is_string(),
            kind => kind.accepts(value, &[]),
        };
        if !accepted {
            return Err(KeystoneError::InvalidArgument(format!(
                "{mutation} argument \"{}\" expects {}, got {value}",
                self.name, self.kind
            )));
        }
        Ok(())
    }
}

// ── Declarations ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub enum_values: Vec<String>,
    pub args: Vec<ArgSpec>,
    pub resolver: Option<FieldResolver>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("args", &self.args)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Extra options for a field declaration.
#[derive(Clone, Default)]
pub struct FieldOpts {
    args: Vec<ArgSpec>,
    resolver: Option<FieldResolver>,
}

impl FieldOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Compute the field instead of reading `node.properties[name]`.
    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Node, Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.resolver = Some(field_resolver(f));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow edges from this node.
    #[default]
    Out,
    /// Follow edges into this node.
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub struct RelationSpec {
    pub name: String,
    pub target: ClassRef,
    pub cardinality: Cardinality,
    pub direction: Direction,
    /// Edge role the relation follows.
    pub role: String,
}

/// Options for a relation declaration. The role defaults to the relation
/// name.
#[derive(Debug, Clone, Default)]
pub struct RelationOpts {
    role: Option<String>,
    direction: Direction,
}

impl RelationOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn incoming(mut self) -> Self {
        self.direction = Direction::In;
        self
    }
}

/// `create{Type}` links the new node from a parent of this class.
#[derive(Debug, Clone)]
pub struct CreatedBy {
    pub parent: ClassRef,
    pub role: String,
}

#[derive(Clone)]
pub struct CustomMutation {
    pub name: String,
    pub args: Vec<ArgSpec>,
    pub handler: MutationHandler,
}

/// Mutation declarations. Standard create/update/delete exist for every
/// non-abstract type; the `Option`s hold overrides.
#[derive(Clone, Default)]
pub struct MutationSpec {
    pub create: Option<MutationHandler>,
    pub update: Option<MutationHandler>,
    pub delete: Option<MutationHandler>,
    pub created_by: Option<CreatedBy>,
    pub customs: Vec<CustomMutation>,
}

/// The declaration tree of one class, without anything inherited.
#[derive(Clone, Default)]
pub struct NodeSpec {
    pub type_name: &'static str,
    pub fields: Vec<FieldSpec>,
    pub relations: Vec<RelationSpec>,
    pub mutations: MutationSpec,
    /// Problems found while declaring.
    pub errors: Vec<String>,
}

impl NodeSpec {
    /// Collect the declarations of `class` by running its `gql_spec`.
    pub fn declare(class: ClassRef) -> Self {
        let mut builder = SpecBuilder::new(class.name());
        class.declare(&mut builder);
        builder.finish()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    fn claim_name(&mut self, name: &str) -> bool {
        if RESERVED_NAMES.contains(&name) {
            self.errors.push(format!(
                "{}: \"{name}\" is a reserved name",
                self.type_name
            ));
            return false;
        }
        if self.field(name).is_some() || self.relation(name).is_some() {
            self.errors.push(format!(
                "{}: \"{name}\" is declared more than once",
                self.type_name
            ));
            return false;
        }
        true
    }

    fn push_field(&mut self, field: FieldSpec) {
        if self.claim_name(&field.name) {
            self.fields.push(field);
        }
    }

    fn push_relation(&mut self, relation: RelationSpec) {
        if self.claim_name(&relation.name) {
            self.relations.push(relation);
        }
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("customs", &self.mutations.customs.len())
            .field("errors", &self.errors)
            .finish()
    }
}

// ── Builders ─────────────────────────────────────────────────────

/// Handed to [`NodeClass::gql_spec`].
pub struct SpecBuilder {
    spec: NodeSpec,
}

impl SpecBuilder {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            spec: NodeSpec {
                type_name,
                ..NodeSpec::default()
            },
        }
    }

    pub fn field(&mut self) -> FieldBuilder<'_> {
        FieldBuilder {
            spec: &mut self.spec,
            nullable: false,
        }
    }

    pub fn relation(&mut self) -> RelationBuilder<'_> {
        RelationBuilder {
            spec: &mut self.spec,
        }
    }

    pub fn mutation(&mut self) -> MutationBuilder<'_> {
        MutationBuilder {
            spec: &mut self.spec,
        }
    }

    pub fn finish(self) -> NodeSpec {
        self.spec
    }
}

/// Scalar field declarations. Fields are non-null unless preceded by
/// [`nullable`](Self::nullable).
pub struct FieldBuilder<'a> {
    spec: &'a mut NodeSpec,
    nullable: bool,
}

impl<'a> FieldBuilder<'a> {
    /// Make the next declared field nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn id(self, name: &str) -> Self {
        self.with(name, ScalarKind::Id, FieldOpts::default())
    }

    pub fn string(self, name: &str) -> Self {
        self.with(name, ScalarKind::String, FieldOpts::default())
    }

    pub fn int(self, name: &str) -> Self {
        self.with(name, ScalarKind::Int, FieldOpts::default())
    }

    pub fn float(self, name: &str) -> Self {
        self.with(name, ScalarKind::Float, FieldOpts::default())
    }

    pub fn boolean(self, name: &str) -> Self {
        self.with(name, ScalarKind::Boolean, FieldOpts::default())
    }

    pub fn json(self, name: &str) -> Self {
        self.with(name, ScalarKind::Json, FieldOpts::default())
    }

    pub fn date(self, name: &str) -> Self {
        self.with(name, ScalarKind::Date, FieldOpts::default())
    }

    pub fn enumeration<I, S>(mut self, name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let enum_values: Vec<String> = members.into_iter().map(Into::into).collect();
        if enum_values.is_empty() {
            self.spec.errors.push(format!(
                "{}: enum field \"{name}\" has no members",
                self.spec.type_name
            ));
        }
        let nullable = std::mem::take(&mut self.nullable);
        self.spec.push_field(FieldSpec {
            name: name.to_string(),
            kind: ScalarKind::Enum,
            nullable,
            enum_values,
            args: Vec::new(),
            resolver: None,
        });
        self
    }

    /// Declare a field with arguments and/or a custom resolver.
    pub fn with(mut self, name: &str, kind: ScalarKind, opts: FieldOpts) -> Self {
        if kind == ScalarKind::Enum {
            self.spec.errors.push(format!(
                "{}: enum field \"{name}\" must be declared with enumeration()",
                self.spec.type_name
            ));
            return self;
        }
        let nullable = std::mem::take(&mut self.nullable);
        self.spec.push_field(FieldSpec {
            name: name.to_string(),
            kind,
            nullable,
            enum_values: Vec::new(),
            args: opts.args,
            resolver: opts.resolver,
        });
        self
    }
}

/// Relation declarations; targets are resolved through edges.
pub struct RelationBuilder<'a> {
    spec: &'a mut NodeSpec,
}

impl<'a> RelationBuilder<'a> {
    /// The first `T` reached over the relation's role, or null.
    pub fn one<T: NodeClass>(self, name: &str) -> Self {
        self.one_with::<T>(name, RelationOpts::default())
    }

    /// Every `T` reached over the relation's role, as a connection.
    pub fn many<T: NodeClass>(self, name: &str) -> Self {
        self.many_with::<T>(name, RelationOpts::default())
    }

    pub fn one_with<T: NodeClass>(self, name: &str, opts: RelationOpts) -> Self {
        self.add(name, ClassRef::of::<T>(), Cardinality::One, opts)
    }

    pub fn many_with<T: NodeClass>(self, name: &str, opts: RelationOpts) -> Self {
        self.add(name, ClassRef::of::<T>(), Cardinality::Many, opts)
    }

    fn add(self, name: &str, target: ClassRef, cardinality: Cardinality, opts: RelationOpts) -> Self {
        self.spec.push_relation(RelationSpec {
            name: name.to_string(),
            target,
            cardinality,
            direction: opts.direction,
            role: opts.role.unwrap_or_else(|| name.to_string()),
        });
        self
    }
}

/// Mutation declarations.
pub struct MutationBuilder<'a> {
    spec: &'a mut NodeSpec,
}

impl<'a> MutationBuilder<'a> {
    /// New nodes are created under a `P` named by the `parentId` argument
    /// and linked from it with `role`.
    pub fn created_by<P: NodeClass>(self, role: &str) -> Self {
        self.spec.mutations.created_by = Some(CreatedBy {
            parent: ClassRef::of::<P>(),
            role: role.to_string(),
        });
        self
    }

    pub fn create<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node>> + Send + 'static,
    {
        self.spec.mutations.create = Some(mutation_handler(f));
        self
    }

    pub fn update<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node>> + Send + 'static,
    {
        self.spec.mutations.update = Some(mutation_handler(f));
        self
    }

    pub fn delete<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node>> + Send + 'static,
    {
        self.spec.mutations.delete = Some(mutation_handler(f));
        self
    }

    /// Adds `{name}{Type}`.
    pub fn custom<A, F, Fut>(self, name: &str, args: A, f: F) -> Self
    where
        A: IntoIterator<Item = ArgSpec>,
        F: Fn(Arguments, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node>> + Send + 'static,
    {
        if self.spec.mutations.customs.iter().any(|c| c.name == name) {
            self.spec.errors.push(format!(
                "{}: mutation \"{name}\" is declared more than once",
                self.spec.type_name
            ));
            return self;
        }
        self.spec.mutations.customs.push(CustomMutation {
            name: name.to_string(),
            args: args.into_iter().collect(),
            handler: mutation_handler(f),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_acceptance() {
        assert!(ScalarKind::Int.accepts(&json!(3), &[]));
        assert!(!ScalarKind::Int.accepts(&json!(3.5), &[]));
        assert!(ScalarKind::Float.accepts(&json!(3), &[]));
        assert!(ScalarKind::Date.accepts(&json!("2024-05-01T10:00:00Z"), &[]));
        assert!(!ScalarKind::Date.accepts(&json!("yesterday"), &[]));
        let members = vec!["DRAFT".to_string(), "LIVE".to_string()];
        assert!(ScalarKind::Enum.accepts(&json!("LIVE"), &members));
        assert!(!ScalarKind::Enum.accepts(&json!("GONE"), &members));
        assert!(ScalarKind::Json.accepts(&json!({"any": [1, 2]}), &[]));
    }

    #[test]
    fn test_argument_checks() {
        let args = json!({"id": "n-1", "count": "three"});
        let args = args.as_object().unwrap();
        assert!(ArgSpec::required("id", ScalarKind::Id).check("m", args).is_ok());
        assert!(ArgSpec::new("note", ScalarKind::String).check("m", args).is_ok());
        let err = ArgSpec::required("note", ScalarKind::String)
            .check("m", args)
            .unwrap_err();
        assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("requires")));
        let err = ArgSpec::new("count", ScalarKind::Int)
            .check("m", args)
            .unwrap_err();
        assert!(matches!(err, KeystoneError::InvalidArgument(ref m) if m.contains("expects int")));
        assert!(ArgSpec::required("count", ScalarKind::Enum).check("m", args).is_ok());
    }

    #[test]
    fn test_nullable_applies_to_next_field_only() {
        let mut gql = SpecBuilder::new("Doc");
        gql.field().string("title").nullable().string("summary").int("words");
        let spec = gql.finish();
        assert!(!spec.field("title").unwrap().nullable);
        assert!(spec.field("summary").unwrap().nullable);
        assert!(!spec.field("words").unwrap().nullable);
        assert!(spec.errors.is_empty());
    }

    #[test]
    fn test_reserved_and_duplicate_names_are_recorded() {
        let mut gql = SpecBuilder::new("Doc");
        gql.field().id("id").string("title").string("title").json("__typename");
        let spec = gql.finish();
        assert_eq!(spec.errors.len(), 3);
        assert_eq!(spec.fields.len(), 1);
    }

    #[test]
    fn test_field_options_carry_args_and_resolver() {
        let mut gql = SpecBuilder::new("Doc");
        gql.field().with(
            "greeting",
            ScalarKind::String,
            FieldOpts::new()
                .arg(ArgSpec::required("name", ScalarKind::String))
                .resolve(|_node, _args, _ctx| async { Ok(json!("hi")) }),
        );
        let spec = gql.finish();
        let field = spec.field("greeting").unwrap();
        assert_eq!(field.args, vec![ArgSpec::required("name", ScalarKind::String)]);
        assert!(field.resolver.is_some());
    }
}
