//! keystone-schema: declarative node classes compiled into API types.
//!
//! A class implements [`NodeClass`] and declares its fields, relations and
//! mutations through a [`SpecBuilder`]. [`compile`] turns it into a shared
//! [`CompiledType`] holding the merged field list, resolvers backed by the
//! graph store, and a mutation table. [`Schema`] assembles compiled types for
//! the API layer.

pub mod catalog;
mod class;
mod compiled;
mod compiler;
mod context;
mod schema;
pub mod spec;

pub use class::{ClassRef, NodeClass};
pub use compiled::{CompiledField, CompiledMutation, CompiledType, MutationKind};
pub use compiler::{compile, Compiler};
pub use context::{
    field_resolver, id_arg, mutation_handler, string_arg, Arguments, FieldResolver,
    MutationHandler, RequestContext,
};
pub use schema::{Schema, SchemaBuilder};
pub use spec::{
    ArgSpec, Cardinality, Direction, FieldOpts, NodeSpec, RelationOpts, ScalarKind, SpecBuilder,
};
