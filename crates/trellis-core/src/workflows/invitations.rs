//! Instance and workspace invitations.
//!
//! An invitation starts pending and is decided exactly once, either accepted
//! or declined; the decision date is stamped at that moment. Accepting an
//! instance invitation creates the invitee's account. Accepting a workspace
//! invitation grants its initial privileges to an existing or newly created
//! user.

use thiserror::Error;
use tracing::{info, warn};
use trellis_config::MIN_INVITATION_CODE_LEN;

use crate::checker::{actions, Target, INSTANCE_CHECKER, WORKSPACE_CHECKER};
use crate::clock;
use crate::error::{Result, TrellisError};
use crate::privilege::{InstancePrivilegeSet, WorkspacePrivilegeSet};
use crate::row;
use crate::store::schema::{INSTANCE_INVITATIONS, WORKSPACE_INVITATIONS};
use crate::store::{
    get_i64, get_opt_bool, get_opt_i64, get_opt_str, get_str, with_transaction, Row, StoreContext,
    StoreError,
};
use crate::token;
use crate::workflows::access::{self, AccessEntry};
use crate::workflows::users::{self, NewUser, User};
use crate::workflows::workspaces::Workspace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvitationError {
    #[error(
        "invitation code must be at least {min_len} characters \
         (alphanumeric, hyphen and underscore only)"
    )]
    InvalidCode { min_len: usize },

    #[error("invitation {code} has already been decided")]
    AlreadyDecided { code: String },

    #[error("cannot grant {requested}; grantable privileges are {grantable}")]
    ExceedsGrantable { requested: String, grantable: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    Pending,
    Accepted,
    Declined,
}

impl InvitationState {
    fn from_decision(was_accepted: Option<bool>) -> Self {
        match was_accepted {
            None => InvitationState::Pending,
            Some(true) => InvitationState::Accepted,
            Some(false) => InvitationState::Declined,
        }
    }
}

// ============================================================================
// Codes
// ============================================================================

pub fn is_valid_code(code: &str) -> bool {
    code.len() >= MIN_INVITATION_CODE_LEN && token::is_hyphenated_alphanumeric(code)
}

pub fn validate_code(code: &str) -> std::result::Result<(), InvitationError> {
    if is_valid_code(code) {
        Ok(())
    } else {
        Err(InvitationError::InvalidCode {
            min_len: MIN_INVITATION_CODE_LEN,
        })
    }
}

/// A fresh random code of at least the minimum length.
pub fn generate_code(len: usize) -> String {
    token::random_url_safe(len.max(MIN_INVITATION_CODE_LEN))
}

fn code_or_generated(ctx: &StoreContext<'_>, code: Option<&str>) -> Result<String> {
    let code = match code {
        Some(code) => code.to_string(),
        None => generate_code(ctx.security.invitation_code_len),
    };
    validate_code(&code)?;
    Ok(code)
}

// ============================================================================
// Instance invitations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInvitation {
    pub instance_invitation_id: i64,
    pub instance_invitation_code: String,
    pub invitee_email_addr: String,
    pub initial_instance_privileges: InstancePrivilegeSet,
    pub invitation_msg: Option<String>,
    pub creator: Option<i64>,
    pub creation_date: String,
    pub decision_date: Option<String>,
    pub was_accepted: Option<bool>,
    pub new_user_id: Option<i64>,
}

impl InstanceInvitation {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = INSTANCE_INVITATIONS.name;
        Ok(Self {
            instance_invitation_id: get_i64(row, table, "instance_invitation_id")?,
            instance_invitation_code: get_str(row, table, "instance_invitation_code")?,
            invitee_email_addr: get_str(row, table, "invitee_email_addr")?,
            initial_instance_privileges: InstancePrivilegeSet::from_literal(&get_str(
                row,
                table,
                "initial_instance_privileges",
            )?),
            invitation_msg: get_opt_str(row, "invitation_msg"),
            creator: get_opt_i64(row, "creator"),
            creation_date: get_str(row, table, "creation_date")?,
            decision_date: get_opt_str(row, "decision_date"),
            was_accepted: get_opt_bool(row, "was_accepted"),
            new_user_id: get_opt_i64(row, "new_user_id"),
        })
    }

    pub fn state(&self) -> InvitationState {
        InvitationState::from_decision(self.was_accepted)
    }
}

fn insert_instance_invitation(
    ctx: &StoreContext<'_>,
    code: &str,
    invitee_email_addr: &str,
    privileges: InstancePrivilegeSet,
    invitation_msg: Option<&str>,
    creator: Option<i64>,
) -> Result<InstanceInvitation> {
    ctx.relational.insert(
        &INSTANCE_INVITATIONS,
        &row! {
            "instance_invitation_code" => code,
            "invitee_email_addr" => invitee_email_addr,
            "initial_instance_privileges" => privileges.to_literal(),
            "invitation_msg" => invitation_msg,
            "creator" => creator,
            "creation_date" => clock::timestamp_now(),
        },
    )?;
    get_instance_invitation(ctx, code)?.ok_or_else(|| TrellisError::not_found("invitation", code))
}

/// Invite someone to the instance. Gated on `create_user_act`; the initial
/// privileges must be grantable by `actor`. A `None` code is generated.
pub fn create_instance_invitation(
    ctx: &StoreContext<'_>,
    actor: &User,
    code: Option<&str>,
    invitee_email_addr: &str,
    initial_privileges: InstancePrivilegeSet,
    invitation_msg: Option<&str>,
) -> Result<InstanceInvitation> {
    INSTANCE_CHECKER.require(ctx, actions::CREATE_USER, &Target::None, actor)?;
    let grantable = actor.instance_privileges.grantable_subset();
    if !grantable.has_all(&initial_privileges) {
        return Err(InvitationError::ExceedsGrantable {
            requested: initial_privileges.to_literal(),
            grantable: grantable.to_literal(),
        }
        .into());
    }
    let code = code_or_generated(ctx, code)?;
    let invitation = insert_instance_invitation(
        ctx,
        &code,
        invitee_email_addr,
        initial_privileges,
        invitation_msg,
        Some(actor.user_id),
    )?;
    info!(
        invitation_id = invitation.instance_invitation_id,
        creator = actor.user_id,
        "Instance invitation created"
    );
    Ok(invitation)
}

pub fn get_instance_invitation(
    ctx: &StoreContext<'_>,
    code: &str,
) -> Result<Option<InstanceInvitation>> {
    let rows = ctx.relational.select(
        INSTANCE_INVITATIONS.name,
        &row! { "instance_invitation_code" => code },
        None,
    )?;
    Ok(rows.first().map(InstanceInvitation::from_row).transpose()?)
}

/// Stamp a decision on a still-pending row; fails if it was already decided.
fn decide(
    ctx: &StoreContext<'_>,
    table: &str,
    code_column: &str,
    code: &str,
    decision: Row,
) -> Result<()> {
    let mut filter = Row::new();
    filter.insert(code_column.to_string(), code.into());
    filter.insert("was_accepted".to_string(), serde_json::Value::Null);
    let mut fields = decision;
    fields.insert("decision_date".to_string(), clock::timestamp_now().into());
    if ctx.relational.update(table, &filter, &fields)? == 0 {
        return Err(InvitationError::AlreadyDecided {
            code: code.to_string(),
        }
        .into());
    }
    Ok(())
}

fn ensure_pending(state: InvitationState, code: &str) -> Result<()> {
    if state == InvitationState::Pending {
        Ok(())
    } else {
        Err(InvitationError::AlreadyDecided {
            code: code.to_string(),
        }
        .into())
    }
}

/// Create the invitee's account and mark the invitation accepted.
pub fn create_user_and_accept_instance_invitation(
    ctx: &StoreContext<'_>,
    invitation: &InstanceInvitation,
    username: &str,
    password: &str,
    user_statement: Option<&str>,
) -> Result<User> {
    let code = invitation.instance_invitation_code.as_str();
    // Re-read so a stale copy cannot create a second account
    let current = get_instance_invitation(ctx, code)?
        .ok_or_else(|| TrellisError::not_found("invitation", code))?;
    ensure_pending(current.state(), code)?;

    let mut new_user = NewUser::new(&invitation.invitee_email_addr, username, password)
        .with_privileges(invitation.initial_instance_privileges);
    new_user.user_statement = user_statement;
    let user = users::create_user_unchecked(ctx, &new_user, invitation.creator)?;

    decide(
        ctx,
        INSTANCE_INVITATIONS.name,
        "instance_invitation_code",
        code,
        row! { "was_accepted" => true, "new_user_id" => user.user_id },
    )?;
    info!(invitation_id = invitation.instance_invitation_id, user_id = user.user_id, "Instance invitation accepted");
    Ok(user)
}

pub fn decline_instance_invitation(
    ctx: &StoreContext<'_>,
    invitation: &InstanceInvitation,
) -> Result<()> {
    decide(
        ctx,
        INSTANCE_INVITATIONS.name,
        "instance_invitation_code",
        &invitation.instance_invitation_code,
        row! { "was_accepted" => false },
    )?;
    info!(invitation_id = invitation.instance_invitation_id, "Instance invitation declined");
    Ok(())
}

// ============================================================================
// Workspace invitations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInvitation {
    pub workspace_invitation_id: i64,
    pub workspace_invitation_code: String,
    pub invitee_email_addr: String,
    pub workspace_id: i64,
    pub initial_workspace_privileges: WorkspacePrivilegeSet,
    pub invitation_msg: Option<String>,
    pub creator: Option<i64>,
    pub creation_date: String,
    pub decision_date: Option<String>,
    pub was_accepted: Option<bool>,
    pub user_id: Option<i64>,
}

impl WorkspaceInvitation {
    fn from_row(row: &Row) -> std::result::Result<Self, StoreError> {
        let table = WORKSPACE_INVITATIONS.name;
        Ok(Self {
            workspace_invitation_id: get_i64(row, table, "workspace_invitation_id")?,
            workspace_invitation_code: get_str(row, table, "workspace_invitation_code")?,
            invitee_email_addr: get_str(row, table, "invitee_email_addr")?,
            workspace_id: get_i64(row, table, "workspace_id")?,
            initial_workspace_privileges: WorkspacePrivilegeSet::from_literal(&get_str(
                row,
                table,
                "initial_workspace_privileges",
            )?),
            invitation_msg: get_opt_str(row, "invitation_msg"),
            creator: get_opt_i64(row, "creator"),
            creation_date: get_str(row, table, "creation_date")?,
            decision_date: get_opt_str(row, "decision_date"),
            was_accepted: get_opt_bool(row, "was_accepted"),
            user_id: get_opt_i64(row, "user_id"),
        })
    }

    pub fn state(&self) -> InvitationState {
        InvitationState::from_decision(self.was_accepted)
    }
}

/// Invite someone into a workspace. Gated on `alter_workspace_access_act`.
pub fn create_workspace_invitation(
    ctx: &StoreContext<'_>,
    actor: &User,
    workspace: &Workspace,
    code: Option<&str>,
    invitee_email_addr: &str,
    initial_privileges: WorkspacePrivilegeSet,
    invitation_msg: Option<&str>,
) -> Result<WorkspaceInvitation> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::ALTER_WORKSPACE_ACCESS,
        &Target::Workspace(workspace),
        actor,
    )?;
    if !actor.instance_privileges.holds_bypass() {
        let grantable = access::enabled_privileges(ctx, workspace.workspace_id, actor.user_id)?
            .unwrap_or_default()
            .grantable_subset();
        if !grantable.has_all(&initial_privileges) {
            return Err(InvitationError::ExceedsGrantable {
                requested: initial_privileges.to_literal(),
                grantable: grantable.to_literal(),
            }
            .into());
        }
    }

    let code = code_or_generated(ctx, code)?;
    ctx.relational.insert(
        &WORKSPACE_INVITATIONS,
        &row! {
            "workspace_invitation_code" => code.as_str(),
            "invitee_email_addr" => invitee_email_addr,
            "workspace_id" => workspace.workspace_id,
            "initial_workspace_privileges" => initial_privileges.to_literal(),
            "invitation_msg" => invitation_msg,
            "creator" => actor.user_id,
            "creation_date" => clock::timestamp_now(),
        },
    )?;
    let invitation = get_workspace_invitation(ctx, &code)?
        .ok_or_else(|| TrellisError::not_found("invitation", &code))?;
    info!(
        invitation_id = invitation.workspace_invitation_id,
        workspace_id = workspace.workspace_id,
        creator = actor.user_id,
        "Workspace invitation created"
    );
    Ok(invitation)
}

pub fn get_workspace_invitation(
    ctx: &StoreContext<'_>,
    code: &str,
) -> Result<Option<WorkspaceInvitation>> {
    let rows = ctx.relational.select(
        WORKSPACE_INVITATIONS.name,
        &row! { "workspace_invitation_code" => code },
        None,
    )?;
    Ok(rows.first().map(WorkspaceInvitation::from_row).transpose()?)
}

/// Accept on behalf of an existing user, granting the initial privileges.
pub fn accept_workspace_invitation(
    ctx: &StoreContext<'_>,
    invitation: &WorkspaceInvitation,
    user_id: i64,
) -> Result<AccessEntry> {
    let code = invitation.workspace_invitation_code.as_str();
    ensure_pending(invitation.state(), code)?;
    let entry = with_transaction(ctx.relational, || -> Result<AccessEntry> {
        decide(
            ctx,
            WORKSPACE_INVITATIONS.name,
            "workspace_invitation_code",
            code,
            row! { "was_accepted" => true, "user_id" => user_id },
        )?;
        access::grant(
            ctx,
            invitation.workspace_id,
            user_id,
            invitation.initial_workspace_privileges,
            invitation.creator,
            Some(invitation.workspace_invitation_id),
        )
    })?;
    info!(
        invitation_id = invitation.workspace_invitation_id,
        workspace_id = invitation.workspace_id,
        user_id,
        "Workspace invitation accepted"
    );
    Ok(entry)
}

/// Create the invitee's account through a companion instance invitation,
/// then accept this one for the new user.
pub fn create_user_and_accept_workspace_invitation(
    ctx: &StoreContext<'_>,
    invitation: &WorkspaceInvitation,
    username: &str,
    password: &str,
    user_statement: Option<&str>,
) -> Result<User> {
    let code = invitation.workspace_invitation_code.as_str();
    let current = get_workspace_invitation(ctx, code)?
        .ok_or_else(|| TrellisError::not_found("invitation", code))?;
    ensure_pending(current.state(), code)?;
    users::ensure_available(ctx, &invitation.invitee_email_addr, username)?;
    let companion = insert_instance_invitation(
        ctx,
        &generate_code(ctx.security.invitation_code_len),
        &invitation.invitee_email_addr,
        InstancePrivilegeSet::new(),
        invitation.invitation_msg.as_deref(),
        invitation.creator,
    )?;
    let user = match create_user_and_accept_instance_invitation(
        ctx,
        &companion,
        username,
        password,
        user_statement,
    ) {
        Ok(user) => user,
        Err(err) => {
            // Decline the companion unless a user row was committed
            if users::get_by_email(ctx, &invitation.invitee_email_addr)?.is_none() {
                if let Err(cleanup) = decline_instance_invitation(ctx, &companion) {
                    warn!(
                        invitation_id = companion.instance_invitation_id,
                        error = %cleanup,
                        "Failed to decline companion invitation"
                    );
                }
            }
            return Err(err);
        }
    };
    accept_workspace_invitation(ctx, invitation, user.user_id)?;
    Ok(user)
}

pub fn decline_workspace_invitation(
    ctx: &StoreContext<'_>,
    invitation: &WorkspaceInvitation,
) -> Result<()> {
    decide(
        ctx,
        WORKSPACE_INVITATIONS.name,
        "workspace_invitation_code",
        &invitation.workspace_invitation_code,
        row! { "was_accepted" => false },
    )?;
    info!(invitation_id = invitation.workspace_invitation_id, "Workspace invitation declined");
    Ok(())
}
