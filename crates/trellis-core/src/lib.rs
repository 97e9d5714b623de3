//! Trellis Core - Workspace discussion graphs over two stores
//!
//! This crate provides:
//! - A relational store client (SQLite) for identity, sequences and audit trails
//! - Graph store clients (embedded petgraph, REST scripting endpoint)
//! - Statement composition and atomic submission with helper-library loading
//! - A mutation coordinator for multi-element graph writes
//! - Instance and workspace privilege sets and the authorization engine
//! - Identity, access, invitation and content workflows
//! - Reconciliation of relational rows missing their graph nodes

// Storage
pub mod graph;
pub mod sequence;
pub mod store;

// Graph model and scripting
pub mod executor;
pub mod schema;
pub mod statement;
pub mod topology;

// Authorization
pub mod checker;
pub mod privilege;

// Mutations and workflows
pub mod coordinator;
pub mod reconcile;
pub mod workflows;

// Support
pub mod clock;
pub mod error;
pub mod logging;
pub mod token;

#[cfg(test)]
mod fixtures;

pub use error::{Result, TrellisError};

// Store re-exports
pub use graph::{
    EmbeddedGraphStore, GraphStore, GraphStoreError, IndexConfig, IndexHandle, IndexKind,
    PropertyMap, RestGraphStore,
};
pub use store::{
    with_transaction, RelationalStore, Row, SqliteStore, StoreContext, StoreError, TableSpec,
};

// Graph model re-exports
pub use executor::{HelperLibrary, StatementExecutor};
pub use schema::{ElementType, GraphElement, SchemaError, DECLARED_INDEXES};
pub use statement::{NodeLookup, StatementDef};

// Authorization re-exports
pub use checker::{AuthError, Decision, PrivilegeChecker, Target, INSTANCE_CHECKER, WORKSPACE_CHECKER};
pub use privilege::{InstancePrivilegeSet, PrivilegeError, PrivilegeSet, WorkspacePrivilegeSet};

// Coordinator re-exports
pub use coordinator::{MutationCoordinator, PlannedNode, WorkspaceGraph, ROOT_CATEGORY_NAME};
pub use reconcile::Orphans;

// Workflow re-exports
pub use workflows::access::AccessEntry;
pub use workflows::invitations::{
    InstanceInvitation, InvitationError, InvitationState, WorkspaceInvitation,
};
pub use workflows::sessions::Session;
pub use workflows::users::{NewUser, User};
pub use workflows::workspaces::Workspace;
