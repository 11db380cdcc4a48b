//! keystone-core: shared types, capability model, pagination, configuration,
//! and error handling for the Keystone platform.
//!
//! - [`types`]: node and edge records, ids, query filters
//! - [`viewer`]: the `CurrentViewer` capability token
//! - [`connection`]: cursor encoding and connection windowing
//! - [`config`]: settings loaded from file and environment
//! - [`error`]: the shared error taxonomy

pub mod config;
pub mod connection;
pub mod error;
pub mod types;
pub mod viewer;

pub use error::{KeystoneError, Result};
pub use types::{Edge, EdgeFilter, NewEdge, NewNode, Node, NodeId, NodeQuery, OrgId, PersonId, PropFilter, Props, TypeFilter};
pub use viewer::{AccessPolicy, CurrentViewer, VerifiedIdentity, ViewerKind};
