//! Workspace access entries.
//!
//! One entry per (user, workspace) pair carries the user's workspace
//! privileges and an enabled flag. Disabled entries are kept for the record
//! but grant nothing.

use tracing::info;

use crate::checker::{actions, Target, WORKSPACE_CHECKER};
use crate::clock;
use crate::error::{Result, TrellisError};
use crate::privilege::WorkspacePrivilegeSet;
use crate::row;
use crate::store::schema::WORKSPACE_ACCESS;
use crate::store::{
    get_bool, get_i64, get_opt_i64, get_opt_str, get_str, with_transaction, Row, StoreContext,
    StoreError,
};
use crate::workflows::users::User;
use crate::workflows::workspaces::{record_workspace_event, Workspace, WorkspaceAuditEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub workspace_access_id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub is_enabled: bool,
    pub workspace_privileges: WorkspacePrivilegeSet,
    pub invitation_id: Option<i64>,
    pub creator: Option<i64>,
    pub creation_date: String,
    pub modifier: Option<i64>,
    pub modification_date: Option<String>,
}

impl AccessEntry {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = WORKSPACE_ACCESS.name;
        Ok(Self {
            workspace_access_id: get_i64(row, table, "workspace_access_id")?,
            user_id: get_i64(row, table, "user_id")?,
            workspace_id: get_i64(row, table, "workspace_id")?,
            is_enabled: get_bool(row, table, "is_enabled")?,
            workspace_privileges: WorkspacePrivilegeSet::from_literal(&get_str(
                row,
                table,
                "workspace_privileges",
            )?),
            invitation_id: get_opt_i64(row, "invitation_id"),
            creator: get_opt_i64(row, "creator"),
            creation_date: get_str(row, table, "creation_date")?,
            modifier: get_opt_i64(row, "modifier"),
            modification_date: get_opt_str(row, "modification_date"),
        })
    }

    /// Privileges that count in authorization decisions.
    pub fn effective_privileges(&self) -> Option<WorkspacePrivilegeSet> {
        self.is_enabled.then_some(self.workspace_privileges)
    }
}

fn select_entry(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
    user_id: i64,
) -> std::result::Result<Option<AccessEntry>, StoreError> {
    let rows = ctx.relational.select(
        WORKSPACE_ACCESS.name,
        &row! { "workspace_id" => workspace_id, "user_id" => user_id },
        None,
    )?;
    rows.first().map(AccessEntry::from_row).transpose()
}

pub fn get(ctx: &StoreContext<'_>, workspace_id: i64, user_id: i64) -> Result<Option<AccessEntry>> {
    Ok(select_entry(ctx, workspace_id, user_id)?)
}

/// Privileges of an enabled entry; `None` without one.
pub fn enabled_privileges(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
    user_id: i64,
) -> std::result::Result<Option<WorkspacePrivilegeSet>, StoreError> {
    Ok(select_entry(ctx, workspace_id, user_id)?.and_then(|e| e.effective_privileges()))
}

/// Insert an enabled entry without a privilege check.
///
/// Used by workspace creation and invitation acceptance, whose callers were
/// already authorized.
pub fn grant(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
    user_id: i64,
    privileges: WorkspacePrivilegeSet,
    granted_by: Option<i64>,
    invitation_id: Option<i64>,
) -> Result<AccessEntry> {
    if select_entry(ctx, workspace_id, user_id)?.is_some() {
        return Err(TrellisError::duplicate(
            "access entry",
            format!("user {} in workspace {}", user_id, workspace_id),
        ));
    }
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.insert(
            &WORKSPACE_ACCESS,
            &row! {
                "user_id" => user_id,
                "workspace_id" => workspace_id,
                "is_enabled" => true,
                "workspace_privileges" => privileges.to_literal(),
                "invitation_id" => invitation_id,
                "creator" => granted_by,
                "creation_date" => now.as_str(),
            },
        )?;
        record_workspace_event(ctx, workspace_id, granted_by, WorkspaceAuditEvent::AccessGranted, &now)?;
        Ok(())
    })?;
    info!(workspace_id, user_id, privileges = %privileges, "Access granted");
    select_entry(ctx, workspace_id, user_id)?.ok_or_else(|| {
        TrellisError::not_found("access entry", format!("{}/{}", workspace_id, user_id))
    })
}

/// Grant access as `actor`. Gated on `alter_workspace_access_act`.
pub fn grant_as(
    ctx: &StoreContext<'_>,
    actor: &User,
    workspace: &Workspace,
    user_id: i64,
    privileges: WorkspacePrivilegeSet,
) -> Result<AccessEntry> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::ALTER_WORKSPACE_ACCESS,
        &Target::Workspace(workspace),
        actor,
    )?;
    grant(ctx, workspace.workspace_id, user_id, privileges, Some(actor.user_id), None)
}

/// Replace an entry's privileges and enabled flag. Gated on
/// `alter_workspace_access_act`.
pub fn update(
    ctx: &StoreContext<'_>,
    actor: &User,
    workspace: &Workspace,
    entry: &AccessEntry,
    privileges: WorkspacePrivilegeSet,
    is_enabled: bool,
) -> Result<AccessEntry> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::ALTER_WORKSPACE_ACCESS,
        &Target::Workspace(workspace),
        actor,
    )?;
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.update(
            WORKSPACE_ACCESS.name,
            &row! { "workspace_access_id" => entry.workspace_access_id },
            &row! {
                "workspace_privileges" => privileges.to_literal(),
                "is_enabled" => is_enabled,
                "modifier" => actor.user_id,
                "modification_date" => now.as_str(),
            },
        )?;
        record_workspace_event(
            ctx,
            entry.workspace_id,
            Some(actor.user_id),
            WorkspaceAuditEvent::AccessUpdated,
            &now,
        )?;
        Ok(())
    })?;
    info!(
        workspace_id = entry.workspace_id,
        user_id = entry.user_id,
        privileges = %privileges,
        is_enabled,
        "Access updated"
    );
    select_entry(ctx, entry.workspace_id, entry.user_id)?.ok_or_else(|| {
        TrellisError::not_found("access entry", entry.workspace_access_id)
    })
}

/// Delete an entry. Gated on `alter_workspace_access_act`.
pub fn revoke(
    ctx: &StoreContext<'_>,
    actor: &User,
    workspace: &Workspace,
    entry: AccessEntry,
) -> Result<()> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::ALTER_WORKSPACE_ACCESS,
        &Target::Workspace(workspace),
        actor,
    )?;
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        let deleted = ctx.relational.delete(
            WORKSPACE_ACCESS.name,
            &row! { "workspace_access_id" => entry.workspace_access_id },
        )?;
        if deleted == 0 {
            return Err(TrellisError::not_found("access entry", entry.workspace_access_id));
        }
        record_workspace_event(
            ctx,
            entry.workspace_id,
            Some(actor.user_id),
            WorkspaceAuditEvent::AccessRevoked,
            &now,
        )?;
        Ok(())
    })?;
    info!(workspace_id = entry.workspace_id, user_id = entry.user_id, "Access revoked");
    Ok(())
}
