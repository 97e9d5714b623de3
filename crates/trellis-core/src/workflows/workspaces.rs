//! Workspaces.
//!
//! Creating a workspace writes the relational row, an audit entry and the
//! creator's `admin` access entry in one transaction. After it commits, the
//! workspace node and its root category are created in the graph as a single
//! atomic script.

use tracing::info;

use crate::checker::{actions, Target, INSTANCE_CHECKER, WORKSPACE_CHECKER};
use crate::clock;
use crate::coordinator::MutationCoordinator;
use crate::error::{Result, TrellisError};
use crate::privilege::{WorkspacePrivilegeSet, ADMIN};
use crate::row;
use crate::store::schema::{WORKSPACES, WORKSPACE_AUDIT};
use crate::store::{
    get_i64, get_opt_i64, get_opt_str, get_str, with_transaction, Row, StoreContext, StoreError,
};
use crate::workflows::access;
use crate::workflows::users::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub workspace_id: i64,
    pub workspace_name: String,
    pub workspace_description: Option<String>,
    pub creator: Option<i64>,
    pub creation_date: String,
    pub modifier: Option<i64>,
    pub modification_date: Option<String>,
}

impl Workspace {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = WORKSPACES.name;
        Ok(Self {
            workspace_id: get_i64(row, table, "workspace_id")?,
            workspace_name: get_str(row, table, "workspace_name")?,
            workspace_description: get_opt_str(row, "workspace_description"),
            creator: get_opt_i64(row, "creator"),
            creation_date: get_str(row, table, "creation_date")?,
            modifier: get_opt_i64(row, "modifier"),
            modification_date: get_opt_str(row, "modification_date"),
        })
    }
}

/// Events recorded in the workspace audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceAuditEvent {
    Created,
    SettingsUpdated,
    AccessGranted,
    AccessUpdated,
    AccessRevoked,
}

impl WorkspaceAuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceAuditEvent::Created => "workspace_created",
            WorkspaceAuditEvent::SettingsUpdated => "settings_updated",
            WorkspaceAuditEvent::AccessGranted => "access_granted",
            WorkspaceAuditEvent::AccessUpdated => "access_updated",
            WorkspaceAuditEvent::AccessRevoked => "access_revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceAuditEntry {
    pub ws_audit_id: i64,
    pub workspace_id: i64,
    pub acting_user: Option<i64>,
    pub audit_event: String,
    pub audit_date: String,
}

pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
}

pub(crate) fn record_workspace_event(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
    acting_user: Option<i64>,
    event: WorkspaceAuditEvent,
    at: &str,
) -> std::result::Result<i64, StoreError> {
    ctx.relational.insert(
        &WORKSPACE_AUDIT,
        &row! {
            "workspace_id" => workspace_id,
            "acting_user" => acting_user,
            "audit_event" => event.as_str(),
            "audit_date" => at,
        },
    )
}

/// Oldest first.
pub fn audit_trail(ctx: &StoreContext<'_>, workspace_id: i64) -> Result<Vec<WorkspaceAuditEntry>> {
    let table = WORKSPACE_AUDIT.name;
    let rows = ctx.relational.select(
        table,
        &row! { "workspace_id" => workspace_id },
        Some("ws_audit_id"),
    )?;
    rows.iter()
        .map(|row| -> Result<WorkspaceAuditEntry> {
            Ok(WorkspaceAuditEntry {
                ws_audit_id: get_i64(row, table, "ws_audit_id")?,
                workspace_id: get_i64(row, table, "workspace_id")?,
                acting_user: get_opt_i64(row, "acting_user"),
                audit_event: get_str(row, table, "audit_event")?,
                audit_date: get_str(row, table, "audit_date")?,
            })
        })
        .collect()
}

fn ensure_name_available(ctx: &StoreContext<'_>, name: &str) -> Result<()> {
    if !is_valid_name(name) {
        return Err(TrellisError::invalid_input("workspace name must not be empty"));
    }
    // Check-then-insert; the UNIQUE constraint catches a concurrent winner
    if get_by_name(ctx, name)?.is_some() {
        return Err(TrellisError::duplicate("workspace", name));
    }
    Ok(())
}

/// Create a workspace owned by `actor`. Gated on `create_space_act`.
pub fn create_workspace(
    ctx: &StoreContext<'_>,
    actor: &User,
    name: &str,
    description: Option<&str>,
) -> Result<Workspace> {
    INSTANCE_CHECKER.require(ctx, actions::CREATE_SPACE, &Target::None, actor)?;
    ensure_name_available(ctx, name)?;

    let now = clock::timestamp_now();
    let workspace_id = with_transaction(ctx.relational, || -> Result<i64> {
        let workspace_id = ctx.relational.insert(
            &WORKSPACES,
            &row! {
                "workspace_name" => name,
                "workspace_description" => description,
                "creator" => actor.user_id,
                "creation_date" => now.as_str(),
            },
        )?;
        record_workspace_event(
            ctx,
            workspace_id,
            Some(actor.user_id),
            WorkspaceAuditEvent::Created,
            &now,
        )?;
        access::grant(
            ctx,
            workspace_id,
            actor.user_id,
            WorkspacePrivilegeSet::from_tokens([ADMIN]),
            Some(actor.user_id),
            None,
        )?;
        Ok(workspace_id)
    })?;

    MutationCoordinator::new(*ctx).create_workspace_graph(workspace_id)?;
    info!(workspace_id, name, creator = actor.user_id, "Created workspace");

    get_by_id(ctx, workspace_id)?.ok_or_else(|| TrellisError::not_found("workspace", workspace_id))
}

fn get_one(ctx: &StoreContext<'_>, filter: &Row) -> Result<Option<Workspace>> {
    let rows = ctx.relational.select(WORKSPACES.name, filter, None)?;
    Ok(rows.first().map(Workspace::from_row).transpose()?)
}

pub fn get_by_name(ctx: &StoreContext<'_>, name: &str) -> Result<Option<Workspace>> {
    get_one(ctx, &row! { "workspace_name" => name })
}

pub fn get_by_id(ctx: &StoreContext<'_>, workspace_id: i64) -> Result<Option<Workspace>> {
    get_one(ctx, &row! { "workspace_id" => workspace_id })
}

/// Rename or re-describe a workspace. Gated on `alter_workspace_act`.
pub fn update_settings(
    ctx: &StoreContext<'_>,
    actor: &User,
    workspace: &Workspace,
    name: &str,
    description: Option<&str>,
) -> Result<Workspace> {
    WORKSPACE_CHECKER.require(ctx, actions::ALTER_WORKSPACE, &Target::Workspace(workspace), actor)?;
    if name != workspace.workspace_name {
        ensure_name_available(ctx, name)?;
    }
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.update(
            WORKSPACES.name,
            &row! { "workspace_id" => workspace.workspace_id },
            &row! {
                "workspace_name" => name,
                "workspace_description" => description,
                "modifier" => actor.user_id,
                "modification_date" => now.as_str(),
            },
        )?;
        record_workspace_event(
            ctx,
            workspace.workspace_id,
            Some(actor.user_id),
            WorkspaceAuditEvent::SettingsUpdated,
            &now,
        )?;
        Ok(())
    })?;
    get_by_id(ctx, workspace.workspace_id)?
        .ok_or_else(|| TrellisError::not_found("workspace", workspace.workspace_id))
}

fn rows_to_workspaces(rows: &[Row]) -> Result<Vec<Workspace>> {
    Ok(rows
        .iter()
        .map(Workspace::from_row)
        .collect::<std::result::Result<Vec<_>, StoreError>>()?)
}

/// Workspaces where `user_id` holds an enabled access entry.
pub fn list_accessible(ctx: &StoreContext<'_>, user_id: i64) -> Result<Vec<Workspace>> {
    let rows = ctx.relational.query(
        "SELECT w.* FROM workspaces w \
         JOIN workspace_access wa ON wa.workspace_id = w.workspace_id \
         WHERE wa.user_id = :user_id AND wa.is_enabled = 1 \
         ORDER BY w.workspace_id",
        &row! { "user_id" => user_id },
    )?;
    rows_to_workspaces(&rows)
}

/// Every workspace. Gated on `list_all_spaces_act`.
pub fn list_all(ctx: &StoreContext<'_>, actor: &User) -> Result<Vec<Workspace>> {
    INSTANCE_CHECKER.require(ctx, actions::LIST_ALL_SPACES, &Target::None, actor)?;
    let rows = ctx
        .relational
        .select(WORKSPACES.name, &Row::new(), Some("workspace_id"))?;
    rows_to_workspaces(&rows)
}

/// Whether two distinct users both hold enabled access to some workspace.
pub fn users_share_access(
    ctx: &StoreContext<'_>,
    user_a: i64,
    user_b: i64,
) -> std::result::Result<bool, StoreError> {
    let rows = ctx.relational.query(
        "SELECT COUNT(1) AS shared FROM ( \
             SELECT workspace_id FROM workspace_access \
             WHERE is_enabled = 1 AND (user_id = :user_a OR user_id = :user_b) \
             GROUP BY workspace_id \
             HAVING COUNT(DISTINCT user_id) > 1 \
         )",
        &row! { "user_a" => user_a, "user_b" => user_b },
    )?;
    let shared = rows
        .first()
        .and_then(|r| r.get("shared"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    Ok(shared > 0)
}
