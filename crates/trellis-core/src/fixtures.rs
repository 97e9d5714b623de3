//! In-memory stores shared by unit tests.

use std::rc::Rc;

use trellis_config::SecurityConfig;

use crate::executor::StatementExecutor;
use crate::graph::EmbeddedGraphStore;
use crate::store::{SqliteStore, StoreContext};

pub(crate) struct Fixture {
    pub relational: SqliteStore,
    pub graph: Rc<EmbeddedGraphStore>,
    pub executor: StatementExecutor,
    pub security: SecurityConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let graph = Rc::new(EmbeddedGraphStore::new());
        Self {
            relational: SqliteStore::in_memory().expect("Failed to open in-memory store"),
            executor: StatementExecutor::with_store(Box::new(graph.clone())),
            graph,
            security: SecurityConfig::default(),
        }
    }

    pub fn ctx(&self) -> StoreContext<'_> {
        StoreContext::new(&self.relational, &self.executor, &self.security)
    }
}
