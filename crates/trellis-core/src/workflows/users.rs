//! User accounts.
//!
//! A user is a relational row (identity, password hash, instance privileges)
//! plus a graph node that content links to through `CREATED_BY` edges. The
//! row and its first privilege audit entry are written in one transaction,
//! which commits before the user node is created.

use tracing::info;

use crate::checker::{actions, Target, INSTANCE_CHECKER};
use crate::clock;
use crate::coordinator::MutationCoordinator;
use crate::error::{Result, TrellisError};
use crate::privilege::{InstancePrivilegeSet, WorkspacePrivilegeSet};
use crate::row;
use crate::store::schema::{INSTANCE_PRIVILEGE_AUDIT, PASSWORD_CHANGE_AUDIT, USERS};
use crate::store::{
    get_bool, get_i64, get_opt_i64, get_opt_str, get_str, with_transaction, Row, StoreContext,
    StoreError,
};
use crate::workflows::credentials::hash_password;

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub email_addr: String,
    pub username: String,
    pub encrypted_password: String,
    pub user_statement: Option<String>,
    pub is_enabled: bool,
    pub instance_privileges: InstancePrivilegeSet,
    pub creator: Option<i64>,
    pub creation_date: String,
    pub modifier: Option<i64>,
    pub modification_date: Option<String>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("email_addr", &self.email_addr)
            .field("username", &self.username)
            .field("is_enabled", &self.is_enabled)
            .field("instance_privileges", &self.instance_privileges)
            .finish_non_exhaustive()
    }
}

impl User {
    pub(crate) fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = USERS.name;
        Ok(Self {
            user_id: get_i64(row, table, "user_id")?,
            email_addr: get_str(row, table, "email_addr")?,
            username: get_str(row, table, "username")?,
            encrypted_password: get_str(row, table, "encrypted_password")?,
            user_statement: get_opt_str(row, "user_statement"),
            is_enabled: get_bool(row, table, "is_enabled")?,
            instance_privileges: InstancePrivilegeSet::from_literal(&get_str(
                row,
                table,
                "instance_privileges",
            )?),
            creator: get_opt_i64(row, "creator"),
            creation_date: get_str(row, table, "creation_date")?,
            modifier: get_opt_i64(row, "modifier"),
            modification_date: get_opt_str(row, "modification_date"),
        })
    }
}

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser<'n> {
    pub email_addr: &'n str,
    pub username: &'n str,
    pub password: &'n str,
    pub user_statement: Option<&'n str>,
    pub is_enabled: bool,
    pub instance_privileges: InstancePrivilegeSet,
}

impl<'n> NewUser<'n> {
    /// An enabled account with no instance privileges.
    pub fn new(email_addr: &'n str, username: &'n str, password: &'n str) -> Self {
        Self {
            email_addr,
            username,
            password,
            user_statement: None,
            is_enabled: true,
            instance_privileges: InstancePrivilegeSet::new(),
        }
    }

    pub fn with_statement(mut self, statement: &'n str) -> Self {
        self.user_statement = Some(statement);
        self
    }

    pub fn with_privileges(mut self, privileges: InstancePrivilegeSet) -> Self {
        self.instance_privileges = privileges;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

/// A user's membership in one workspace, as listed for that workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMember {
    pub user_id: i64,
    pub email_addr: String,
    pub username: String,
    pub is_enabled_for_instance: bool,
    pub workspace_access_id: i64,
    pub workspace_id: i64,
    pub is_enabled_for_workspace: bool,
    pub workspace_privileges: WorkspacePrivilegeSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeAuditEntry {
    pub priv_chg_id: i64,
    pub updated_user: i64,
    pub updating_user: Option<i64>,
    pub is_enabled: bool,
    pub new_privileges: InstancePrivilegeSet,
    pub priv_chg_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChangeEntry {
    pub passwd_chg_id: i64,
    pub updated_user: i64,
    pub updating_user: Option<i64>,
    pub passwd_chg_date: String,
}

fn add_privilege_audit_entry(
    ctx: &StoreContext<'_>,
    updated_user: i64,
    updating_user: Option<i64>,
    is_enabled: bool,
    privileges: &InstancePrivilegeSet,
    at: &str,
) -> std::result::Result<i64, StoreError> {
    ctx.relational.insert(
        &INSTANCE_PRIVILEGE_AUDIT,
        &row! {
            "updated_user" => updated_user,
            "updating_user" => updating_user,
            "is_enabled" => is_enabled,
            "new_privileges" => privileges.to_literal(),
            "priv_chg_date" => at,
        },
    )
}

// ============================================================================
// Creation and lookup
// ============================================================================

/// Create an account and its graph node.
///
/// With a `creator`, the creator must be allowed `create_user_act`; without
/// one (first-user bootstrap) the call is trusted.
pub fn create_user(
    ctx: &StoreContext<'_>,
    new_user: &NewUser<'_>,
    creator: Option<&User>,
) -> Result<User> {
    if let Some(creator) = creator {
        INSTANCE_CHECKER.require(ctx, actions::CREATE_USER, &Target::None, creator)?;
    }
    create_user_unchecked(ctx, new_user, creator.map(|c| c.user_id))
}

/// Fails unless both identifiers are non-empty and unused.
pub(crate) fn ensure_available(
    ctx: &StoreContext<'_>,
    email_addr: &str,
    username: &str,
) -> Result<()> {
    if email_addr.is_empty() || username.is_empty() {
        return Err(TrellisError::invalid_input(
            "email address and username must not be empty",
        ));
    }
    if get_by_email(ctx, email_addr)?.is_some() {
        return Err(TrellisError::duplicate("user", email_addr));
    }
    if get_by_username(ctx, username)?.is_some() {
        return Err(TrellisError::duplicate("user", username));
    }
    Ok(())
}

/// Create an account on behalf of an already-authorized operation, recording
/// `creator_id` as its creator.
pub(crate) fn create_user_unchecked(
    ctx: &StoreContext<'_>,
    new_user: &NewUser<'_>,
    creator_id: Option<i64>,
) -> Result<User> {
    ensure_available(ctx, new_user.email_addr, new_user.username)?;

    let encrypted_password = hash_password(new_user.password)?;
    let created = clock::timestamp_now();

    let user_id = with_transaction(ctx.relational, || -> Result<i64> {
        let user_id = ctx.relational.insert(
            &USERS,
            &row! {
                "email_addr" => new_user.email_addr,
                "username" => new_user.username,
                "encrypted_password" => encrypted_password,
                "user_statement" => new_user.user_statement,
                "is_enabled" => new_user.is_enabled,
                "instance_privileges" => new_user.instance_privileges.to_literal(),
                "creator" => creator_id,
                "creation_date" => created.as_str(),
            },
        )?;
        add_privilege_audit_entry(
            ctx,
            user_id,
            creator_id,
            new_user.is_enabled,
            &new_user.instance_privileges,
            &created,
        )?;
        Ok(user_id)
    })?;

    MutationCoordinator::new(*ctx).create_user_node(user_id)?;
    info!(user_id, username = new_user.username, "Created user");

    get_by_id(ctx, user_id)?.ok_or_else(|| TrellisError::not_found("user", user_id))
}

fn get_one(ctx: &StoreContext<'_>, filter: &Row) -> Result<Option<User>> {
    let rows = ctx.relational.select(USERS.name, filter, None)?;
    Ok(rows.first().map(User::from_row).transpose()?)
}

pub fn get_by_id(ctx: &StoreContext<'_>, user_id: i64) -> Result<Option<User>> {
    get_one(ctx, &row! { "user_id" => user_id })
}

pub fn get_by_email(ctx: &StoreContext<'_>, email_addr: &str) -> Result<Option<User>> {
    get_one(ctx, &row! { "email_addr" => email_addr })
}

pub fn get_by_username(ctx: &StoreContext<'_>, username: &str) -> Result<Option<User>> {
    get_one(ctx, &row! { "username" => username })
}

/// Every account, by ID. Gated on `list_all_users_act`.
pub fn list_all_users(ctx: &StoreContext<'_>, actor: &User) -> Result<Vec<User>> {
    INSTANCE_CHECKER.require(ctx, actions::LIST_ALL_USERS, &Target::None, actor)?;
    let rows = ctx.relational.select(USERS.name, &Row::new(), Some("user_id"))?;
    Ok(rows
        .iter()
        .map(User::from_row)
        .collect::<std::result::Result<Vec<_>, StoreError>>()?)
}

/// Users holding an access entry (enabled or not) in a workspace.
pub fn users_with_access(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
) -> Result<Vec<WorkspaceMember>> {
    let rows = ctx.relational.query(
        "SELECT u.user_id, u.email_addr, u.username, u.is_enabled AS is_enabled_for_instance, \
                wa.workspace_access_id, wa.workspace_id, \
                wa.is_enabled AS is_enabled_for_workspace, wa.workspace_privileges \
         FROM users u JOIN workspace_access wa ON u.user_id = wa.user_id \
         WHERE wa.workspace_id = :workspace_id \
         ORDER BY u.user_id",
        &row! { "workspace_id" => workspace_id },
    )?;
    let table = "workspace_access";
    rows.iter()
        .map(|row| -> Result<WorkspaceMember> {
            Ok(WorkspaceMember {
                user_id: get_i64(row, table, "user_id")?,
                email_addr: get_str(row, table, "email_addr")?,
                username: get_str(row, table, "username")?,
                is_enabled_for_instance: get_bool(row, table, "is_enabled_for_instance")?,
                workspace_access_id: get_i64(row, table, "workspace_access_id")?,
                workspace_id: get_i64(row, table, "workspace_id")?,
                is_enabled_for_workspace: get_bool(row, table, "is_enabled_for_workspace")?,
                workspace_privileges: WorkspacePrivilegeSet::from_literal(&get_str(
                    row,
                    table,
                    "workspace_privileges",
                )?),
            })
        })
        .collect()
}

// ============================================================================
// Updates
// ============================================================================

/// Change username, email address and statement. Gated on `alter_user_info_act`.
pub fn update_user_info(
    ctx: &StoreContext<'_>,
    actor: &User,
    target: &User,
    username: &str,
    email_addr: &str,
    user_statement: Option<&str>,
) -> Result<User> {
    INSTANCE_CHECKER.require(ctx, actions::ALTER_USER_INFO, &Target::User(target), actor)?;
    ctx.relational.update(
        USERS.name,
        &row! { "user_id" => target.user_id },
        &row! {
            "username" => username,
            "email_addr" => email_addr,
            "user_statement" => user_statement,
            "modifier" => actor.user_id,
            "modification_date" => clock::timestamp_now(),
        },
    )?;
    get_by_id(ctx, target.user_id)?.ok_or_else(|| TrellisError::not_found("user", target.user_id))
}

/// Replace instance privileges and the enabled flag, with an audit entry.
/// Gated on `alter_user_access_act`.
pub fn update_instance_access(
    ctx: &StoreContext<'_>,
    actor: &User,
    target: &User,
    is_enabled: bool,
    privileges: InstancePrivilegeSet,
) -> Result<User> {
    INSTANCE_CHECKER.require(ctx, actions::ALTER_USER_ACCESS, &Target::User(target), actor)?;
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.update(
            USERS.name,
            &row! { "user_id" => target.user_id },
            &row! {
                "instance_privileges" => privileges.to_literal(),
                "is_enabled" => is_enabled,
                "modifier" => actor.user_id,
                "modification_date" => now.as_str(),
            },
        )?;
        add_privilege_audit_entry(ctx, target.user_id, Some(actor.user_id), is_enabled, &privileges, &now)?;
        Ok(())
    })?;
    info!(
        user_id = target.user_id,
        modifier = actor.user_id,
        privileges = %privileges,
        "Instance access updated"
    );
    get_by_id(ctx, target.user_id)?.ok_or_else(|| TrellisError::not_found("user", target.user_id))
}

/// Set a new password, with an audit entry. Gated on `alter_user_info_act`.
pub fn change_password(
    ctx: &StoreContext<'_>,
    actor: &User,
    target: &User,
    new_password: &str,
) -> Result<()> {
    INSTANCE_CHECKER.require(ctx, actions::ALTER_USER_INFO, &Target::User(target), actor)?;
    let encrypted_password = hash_password(new_password)?;
    let now = clock::timestamp_now();
    with_transaction(ctx.relational, || -> Result<()> {
        ctx.relational.update(
            USERS.name,
            &row! { "user_id" => target.user_id },
            &row! {
                "encrypted_password" => encrypted_password,
                "modifier" => actor.user_id,
                "modification_date" => now.as_str(),
            },
        )?;
        ctx.relational.insert(
            &PASSWORD_CHANGE_AUDIT,
            &row! {
                "updated_user" => target.user_id,
                "updating_user" => actor.user_id,
                "passwd_chg_date" => now.as_str(),
            },
        )?;
        Ok(())
    })?;
    info!(user_id = target.user_id, modifier = actor.user_id, "Password changed");
    Ok(())
}

// ============================================================================
// Audit trail
// ============================================================================

/// Newest first.
pub fn privilege_audit_for_user(
    ctx: &StoreContext<'_>,
    user_id: i64,
) -> Result<Vec<PrivilegeAuditEntry>> {
    let table = INSTANCE_PRIVILEGE_AUDIT.name;
    let rows = ctx.relational.select(
        table,
        &row! { "updated_user" => user_id },
        Some("priv_chg_id desc"),
    )?;
    rows.iter()
        .map(|row| -> Result<PrivilegeAuditEntry> {
            Ok(PrivilegeAuditEntry {
                priv_chg_id: get_i64(row, table, "priv_chg_id")?,
                updated_user: get_i64(row, table, "updated_user")?,
                updating_user: get_opt_i64(row, "updating_user"),
                is_enabled: get_bool(row, table, "is_enabled")?,
                new_privileges: InstancePrivilegeSet::from_literal(&get_str(
                    row,
                    table,
                    "new_privileges",
                )?),
                priv_chg_date: get_str(row, table, "priv_chg_date")?,
            })
        })
        .collect()
}

/// Newest first.
pub fn password_audit_for_user(
    ctx: &StoreContext<'_>,
    user_id: i64,
) -> Result<Vec<PasswordChangeEntry>> {
    let table = PASSWORD_CHANGE_AUDIT.name;
    let rows = ctx.relational.select(
        table,
        &row! { "updated_user" => user_id },
        Some("passwd_chg_id desc"),
    )?;
    rows.iter()
        .map(|row| -> Result<PasswordChangeEntry> {
            Ok(PasswordChangeEntry {
                passwd_chg_id: get_i64(row, table, "passwd_chg_id")?,
                updated_user: get_i64(row, table, "updated_user")?,
                updating_user: get_opt_i64(row, "updating_user"),
                passwd_chg_date: get_str(row, table, "passwd_chg_date")?,
            })
        })
        .collect()
}
