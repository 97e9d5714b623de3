//! Reconciliation between the relational and graph stores.
//!
//! Users and workspaces are committed relationally before their graph nodes
//! are created, so a failed graph call leaves a row without a node. The sweep
//! finds those rows and recreates the missing nodes.

use tracing::{info, warn};

use crate::coordinator::MutationCoordinator;
use crate::error::Result;
use crate::row;
use crate::store::schema::{USERS, WORKSPACES};
use crate::store::{get_i64, StoreContext, StoreError};
use crate::topology;

/// Relational rows whose graph counterpart is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Orphans {
    pub user_ids: Vec<i64>,
    pub workspace_ids: Vec<i64>,
}

impl Orphans {
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() && self.workspace_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.user_ids.len() + self.workspace_ids.len()
    }
}

fn all_ids(ctx: &StoreContext<'_>, table: &str, column: &str) -> Result<Vec<i64>> {
    let rows = ctx.relational.select(table, &row! {}, Some(column))?;
    Ok(rows
        .iter()
        .map(|row| get_i64(row, table, column))
        .collect::<std::result::Result<Vec<_>, StoreError>>()?)
}

pub fn find_orphans(ctx: &StoreContext<'_>) -> Result<Orphans> {
    let mut orphans = Orphans::default();
    for user_id in all_ids(ctx, USERS.name, "user_id")? {
        if topology::user_node(ctx, user_id)?.is_none() {
            orphans.user_ids.push(user_id);
        }
    }
    for workspace_id in all_ids(ctx, WORKSPACES.name, "workspace_id")? {
        if topology::workspace_node(ctx, workspace_id)?.is_none() {
            orphans.workspace_ids.push(workspace_id);
        }
    }
    if !orphans.is_empty() {
        warn!(
            users = orphans.user_ids.len(),
            workspaces = orphans.workspace_ids.len(),
            "Found relational rows without graph nodes"
        );
    }
    Ok(orphans)
}

/// Recreate the graph nodes of `orphans` in one atomic submission.
///
/// User nodes are created ahead of workspace graphs. Returns the number of
/// entities repaired.
pub fn repair(ctx: &StoreContext<'_>, orphans: &Orphans) -> Result<usize> {
    if orphans.is_empty() {
        return Ok(0);
    }
    let coordinator = MutationCoordinator::new(*ctx);
    let mut defs = Vec::new();
    for &user_id in &orphans.user_ids {
        defs.extend(coordinator.user_node_defs(user_id)?);
    }
    for &workspace_id in &orphans.workspace_ids {
        defs.extend(coordinator.workspace_graph_defs(workspace_id)?);
    }
    coordinator.submit(defs)?;
    info!(
        users = orphans.user_ids.len(),
        workspaces = orphans.workspace_ids.len(),
        "Repaired missing graph nodes"
    );
    Ok(orphans.len())
}

/// Find and repair in one pass.
pub fn sweep(ctx: &StoreContext<'_>) -> Result<Orphans> {
    let orphans = find_orphans(ctx)?;
    repair(ctx, &orphans)?;
    Ok(orphans)
}
