//! Common test utilities for integration tests.
//!
//! Builds a relational store on disk under a temp directory, an embedded
//! graph store shared with the test for inspection, and a handful of users.

#![allow(dead_code)]

use std::rc::Rc;

use tempfile::TempDir;
use trellis_config::SecurityConfig;
use trellis_core::privilege::{CREATE_SPACE, CREATE_USER, SUPER};
use trellis_core::workflows::users::{create_user, NewUser, User};
use trellis_core::{
    EmbeddedGraphStore, InstancePrivilegeSet, SqliteStore, StatementExecutor, StoreContext,
};

// ============================================================================
// Stores
// ============================================================================

pub struct Harness {
    pub relational: SqliteStore,
    pub graph: Rc<EmbeddedGraphStore>,
    pub executor: StatementExecutor,
    pub security: SecurityConfig,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let relational =
            SqliteStore::open(&dir.path().join("trellis.db")).expect("Failed to open store");
        let graph = Rc::new(EmbeddedGraphStore::new());
        Self {
            relational,
            executor: StatementExecutor::with_store(Box::new(graph.clone())),
            graph,
            security: SecurityConfig::default(),
            _dir: dir,
        }
    }

    pub fn ctx(&self) -> StoreContext<'_> {
        StoreContext::new(&self.relational, &self.executor, &self.security)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn user(&self, username: &str, privileges: &[&str]) -> User {
        let email = format!("{}@example.org", username);
        let new_user = NewUser::new(&email, username, "correct horse")
            .with_privileges(InstancePrivilegeSet::from_tokens(privileges));
        create_user(&self.ctx(), &new_user, None).expect("Failed to create user")
    }

    pub fn superuser(&self) -> User {
        self.user("root", &[SUPER])
    }

    pub fn space_creator(&self, username: &str) -> User {
        self.user(username, &[CREATE_SPACE])
    }

    pub fn user_creator(&self, username: &str) -> User {
        self.user(username, &[CREATE_USER])
    }
}
