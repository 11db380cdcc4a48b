//! keystone-graph: the owner-scoped node/edge store.
//!
//! All graph reads and writes flow through [`GraphStore`], which applies the
//! viewer's capability checks before delegating to a [`BackendAdapter`].
//! Adapters are interchangeable and selected by configuration; the
//! process-wide instance lives in [`BackendRegistry`].

pub mod backend;
mod mutations;
mod queries;
pub mod registry;
pub mod store;
mod traversal;

pub use backend::{open_backend, BackendAdapter, BackendCapabilities, SharedBackend};
pub use registry::BackendRegistry;
pub use store::{GraphStore, TypePolicies};
