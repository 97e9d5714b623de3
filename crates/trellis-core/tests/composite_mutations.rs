//! Composite graph mutation tests.
//!
//! Exercises atomic submission, the relational-then-graph ordering and its
//! repair path, batching, and lazy helper-library loading.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::Harness;
use pretty_assertions::assert_eq;
use serde_json::Value;
use trellis_config::LibraryStrategy;
use trellis_core::reconcile;
use trellis_core::schema::{edge_labels, USER_TYPE_TAG};
use trellis_core::store::schema::UNIQUE_NODE_ID_SEQUENCE;
use trellis_core::workflows::users::{self, NewUser};
use trellis_core::workflows::workspaces;
use trellis_core::{
    topology, EmbeddedGraphStore, GraphStore, GraphStoreError, HelperLibrary, IndexConfig,
    IndexHandle, IndexKind, MutationCoordinator, PropertyMap, RelationalStore, StatementExecutor,
    StoreContext, TrellisError,
};

// ============================================================================
// Graph store double
// ============================================================================

/// Embedded store whose script endpoint can be switched off.
struct Flaky {
    inner: Rc<EmbeddedGraphStore>,
    down: Cell<bool>,
}

impl GraphStore for Flaky {
    fn submit_script(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError> {
        if self.down.get() {
            return Err(GraphStoreError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.inner.submit_script(script, params)
    }

    fn get_or_create_index(
        &self,
        kind: IndexKind,
        name: &str,
        config: Option<&IndexConfig>,
    ) -> Result<IndexHandle, GraphStoreError> {
        self.inner.get_or_create_index(kind, name, config)
    }

    fn index_get(
        &self,
        index: &IndexHandle,
        field: &str,
        value: &Value,
    ) -> Result<Vec<PropertyMap>, GraphStoreError> {
        self.inner.index_get(index, field, value)
    }
}

// ============================================================================
// Ordering and repair
// ============================================================================

#[test]
fn graph_failure_keeps_relational_row_until_repaired() {
    let h = Harness::new();
    let flaky = Rc::new(Flaky {
        inner: h.graph.clone(),
        down: Cell::new(true),
    });
    let executor = StatementExecutor::with_store(Box::new(flaky.clone()));
    let ctx = StoreContext::new(&h.relational, &executor, &h.security);

    let err = users::create_user(&ctx, &NewUser::new("eve@example.org", "eve", "pw"), None)
        .unwrap_err();
    assert!(matches!(err, TrellisError::Graph(GraphStoreError::Status { status: 503, .. })));

    // The relational half committed first and stays
    let eve = users::get_by_username(&ctx, "eve")
        .unwrap()
        .expect("user row was committed");
    assert_eq!(h.graph.node_count(), 0);

    flaky.down.set(false);
    let orphans = reconcile::find_orphans(&ctx).unwrap();
    assert_eq!(orphans.user_ids, vec![eve.user_id]);
    assert!(orphans.workspace_ids.is_empty());

    assert_eq!(reconcile::repair(&ctx, &orphans).unwrap(), 1);
    assert!(topology::user_node(&ctx, eve.user_id).unwrap().is_some());
    assert!(reconcile::find_orphans(&ctx).unwrap().is_empty());
}

#[test]
fn workspace_graph_failure_is_repairable() {
    let h = Harness::new();
    let owner = h.space_creator("owner");
    let flaky = Rc::new(Flaky {
        inner: h.graph.clone(),
        down: Cell::new(true),
    });
    let executor = StatementExecutor::with_store(Box::new(flaky.clone()));
    let ctx = StoreContext::new(&h.relational, &executor, &h.security);

    workspaces::create_workspace(&ctx, &owner, "cellar", None).unwrap_err();
    let cellar = workspaces::get_by_name(&ctx, "cellar")
        .unwrap()
        .expect("workspace row was committed");
    assert!(topology::workspace_node(&ctx, cellar.workspace_id).unwrap().is_none());

    flaky.down.set(false);
    let repaired = reconcile::sweep(&ctx).unwrap();
    assert_eq!(repaired.workspace_ids, vec![cellar.workspace_id]);

    let root = topology::root_category(&ctx, cellar.workspace_id)
        .unwrap()
        .expect("root category recreated");
    let root_id = topology::unique_node_id(&root).unwrap();
    assert_eq!(
        topology::containing_workspace(&ctx, root_id).unwrap(),
        Some(cellar.workspace_id)
    );
}

// ============================================================================
// Atomicity and batching
// ============================================================================

#[test]
fn batch_with_one_bad_link_applies_nothing() {
    let h = Harness::new();
    let ctx = h.ctx();
    let coordinator = MutationCoordinator::new(ctx);

    let mut defs = coordinator.user_node_defs(1).unwrap();
    defs.extend(coordinator.workspace_graph_defs(1).unwrap());
    let planned = coordinator.category_defs(1_000, 1, "dangling", "no such parent").unwrap();
    defs.extend(planned.defs);

    let err = coordinator.submit(defs).unwrap_err();
    assert!(matches!(err, TrellisError::Graph(GraphStoreError::LookupMiss { .. })));
    assert_eq!(h.graph.node_count(), 0);
    assert_eq!(h.graph.edge_count(), 0);

    // IDs handed out to the failed batch are not reused
    let next = h.relational.next_sequence_value(UNIQUE_NODE_ID_SEQUENCE).unwrap();
    assert!(next > planned.unique_node_id);
}

#[test]
fn content_nodes_link_creator_and_parent() {
    let h = Harness::new();
    let ctx = h.ctx();
    let coordinator = MutationCoordinator::new(ctx);
    coordinator.create_user_node(4).unwrap();
    let root = coordinator
        .create_workspace_graph(2)
        .unwrap()
        .root_category
        .unique_id()
        .unwrap();

    let category = coordinator
        .create_category(root, 4, "vines", "grapes and hops")
        .unwrap()
        .unique_id()
        .unwrap();

    let labels: Vec<String> = h
        .graph
        .outgoing_edges(category)
        .into_iter()
        .map(|(label, _)| label)
        .collect();
    assert_eq!(
        labels,
        vec![
            edge_labels::CREATED_BY.to_string(),
            edge_labels::HAS_PARENT_CAT.to_string()
        ]
    );
    assert_eq!(topology::creator_of(&ctx, category).unwrap(), Some(4));
    assert_eq!(topology::containing_workspace(&ctx, category).unwrap(), Some(2));
}

// ============================================================================
// Helper library loading
// ============================================================================

#[test]
fn lazy_library_is_loaded_on_first_use() {
    let h = Harness::new();
    let executor = StatementExecutor::new(
        Box::new(h.graph.clone()),
        HelperLibrary::bundled(),
        LibraryStrategy::Lazy,
        true,
    );
    let ctx = StoreContext::new(&h.relational, &executor, &h.security);
    assert!(!h.graph.helpers_loaded());

    MutationCoordinator::new(ctx).create_user_node(1).unwrap();
    assert!(h.graph.helpers_loaded());
    // Failed attempt, library load, retry
    assert_eq!(h.graph.scripts_submitted(), 3);

    MutationCoordinator::new(ctx).create_user_node(2).unwrap();
    assert_eq!(h.graph.scripts_submitted(), 4);
    assert_eq!(h.graph.nodes_of_type(USER_TYPE_TAG).len(), 2);
}
