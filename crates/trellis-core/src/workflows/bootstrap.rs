//! Graph store bootstrap.
//!
//! Creates every declared index and backfills graph nodes for users and
//! workspaces that exist only in the relational store. Safe to run on every
//! start-up.

use tracing::{debug, info};

use crate::error::Result;
use crate::reconcile::{self, Orphans};
use crate::schema::DECLARED_INDEXES;
use crate::store::StoreContext;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub indexes: usize,
    pub backfilled: Orphans,
}

/// Create each index in [`DECLARED_INDEXES`], returning how many were ensured.
pub fn ensure_indexes(ctx: &StoreContext<'_>) -> Result<usize> {
    let store = ctx.graph.store();
    for decl in DECLARED_INDEXES {
        let config = decl.config();
        store.get_or_create_index(decl.kind, decl.name, config.as_ref())?;
        debug!("Ensured {} index {}", decl.kind.as_str(), decl.name);
    }
    Ok(DECLARED_INDEXES.len())
}

pub fn bootstrap_graph(ctx: &StoreContext<'_>) -> Result<BootstrapReport> {
    let indexes = ensure_indexes(ctx)?;
    let backfilled = reconcile::sweep(ctx)?;
    info!(
        indexes,
        users = backfilled.user_ids.len(),
        workspaces = backfilled.workspace_ids.len(),
        "Graph bootstrap complete"
    );
    Ok(BootstrapReport { indexes, backfilled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::workflows::users::{create_user, NewUser};

    #[test]
    fn test_bootstrap_is_idempotent() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        create_user(&ctx, &NewUser::new("a@example.org", "a", "pw"), None).unwrap();

        let first = bootstrap_graph(&ctx).unwrap();
        assert_eq!(first.indexes, DECLARED_INDEXES.len());
        assert!(first.backfilled.is_empty());

        let nodes = fx.graph.node_count();
        let second = bootstrap_graph(&ctx).unwrap();
        assert_eq!(second, first);
        assert_eq!(fx.graph.node_count(), nodes);
    }
}
