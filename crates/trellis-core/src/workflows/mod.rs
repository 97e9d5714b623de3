//! Identity, access and content workflows.
//!
//! Each workflow takes a [`StoreContext`](crate::store::StoreContext) and,
//! where an actor is involved, runs the matching privilege check before
//! touching either store. Relational changes that belong together share one
//! transaction; graph mutations go through the
//! [`MutationCoordinator`](crate::coordinator::MutationCoordinator) after
//! that transaction commits.

pub mod access;
pub mod bootstrap;
pub mod content;
pub mod credentials;
pub mod invitations;
pub mod sessions;
pub mod users;
pub mod workspaces;
