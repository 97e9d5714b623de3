//! Authorization engine.
//!
//! Each scope has a fixed table mapping action tokens to predicates. A check
//! resolves in this order:
//!
//! 1. an action missing from the table is a configuration error, always raised;
//! 2. an actor holding the instance `super` privilege is allowed without
//!    running the predicate or looking at the target;
//! 3. otherwise the predicate decides, possibly consulting either store.
//!
//! Callers choose whether a denial comes back as `false` or as
//! [`AuthError::InsufficientPrivileges`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::GraphStoreError;
use crate::privilege::{
    InstanceScope, PrivilegeScope, WorkspacePrivilegeSet, WorkspaceScope, ADMIN, CONTRIBUTOR,
    CREATE_SPACE, CREATE_USER, EDITOR, MODERATOR,
};
use crate::store::{StoreContext, StoreError};
use crate::topology;
use crate::workflows::access;
use crate::workflows::users::User;
use crate::workflows::workspaces::{self, Workspace};

/// Action tokens for both scopes.
pub mod actions {
    pub const VIEW_INSTANCE_CMDS: &str = "view_instance_cmds_act";
    pub const CREATE_USER: &str = "create_user_act";
    pub const CREATE_SPACE: &str = "create_space_act";
    pub const ALTER_USER_INFO: &str = "alter_user_info_act";
    pub const ALTER_USER_ACCESS: &str = "alter_user_access_act";
    pub const LIST_ALL_USERS: &str = "list_all_users_act";
    pub const LIST_ALL_SPACES: &str = "list_all_spaces_act";

    pub const ALTER_WORKSPACE: &str = "alter_workspace_act";
    pub const ALTER_WORKSPACE_ACCESS: &str = "alter_workspace_access_act";
    pub const VIEW_WORKSPACE: &str = "view_workspace_act";
    pub const VIEW_USER: &str = "view_user_act";
    pub const CREATE_COMMENT: &str = "create_comment_act";
    pub const REPLY_TO_COMMENT: &str = "reply_to_comment_act";
    pub const EDIT_COMMENT: &str = "edit_comment_act";
    pub const APPROVE_COMMENT: &str = "approve_comment_act";
    pub const DELETE_COMMENT: &str = "delete_comment_act";
    pub const CREATE_WRITEUP: &str = "create_writeup_act";
    pub const EDIT_WRITEUP: &str = "edit_writeup_act";
    pub const APPROVE_WRITEUP: &str = "approve_writeup_act";
    pub const DELETE_WRITEUP: &str = "delete_writeup_act";
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unrecognized {scope} action: {action}")]
    UnrecognizedAction { scope: &'static str, action: String },

    #[error("{actor} (user_id={user_id}) is not allowed to perform {action}")]
    InsufficientPrivileges {
        actor: String,
        user_id: i64,
        action: String,
    },

    #[error("{action} needs a {expected} target")]
    InvalidTarget {
        action: &'static str,
        expected: &'static str,
    },

    #[error("relational store error during authorization: {0}")]
    Store(#[from] StoreError),

    #[error("graph store error during authorization: {0}")]
    Graph(#[from] GraphStoreError),
}

/// What an action is performed on.
#[derive(Debug, Clone, Copy)]
pub enum Target<'t> {
    None,
    User(&'t User),
    Workspace(&'t Workspace),
    /// A graph node, by unique node ID
    Node(i64),
}

/// Outcome of a check before it is converted for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    Unrecognized,
}

/// Predicate deciding one action for a non-bypass actor.
pub type Predicate = fn(&StoreContext<'_>, &Target<'_>, &User) -> Result<bool, AuthError>;

/// Action table for one privilege scope.
pub struct PrivilegeChecker {
    scope: &'static str,
    actions: HashMap<&'static str, Predicate>,
}

/// Instance-scope checker
pub static INSTANCE_CHECKER: Lazy<PrivilegeChecker> = Lazy::new(PrivilegeChecker::instance);

/// Workspace-scope checker
pub static WORKSPACE_CHECKER: Lazy<PrivilegeChecker> = Lazy::new(PrivilegeChecker::workspace);

impl PrivilegeChecker {
    pub fn instance() -> Self {
        let table: [(&'static str, Predicate); 7] = [
            (actions::VIEW_INSTANCE_CMDS, holds_any_instance_privilege),
            (actions::CREATE_USER, can_create_user),
            (actions::CREATE_SPACE, can_create_space),
            (actions::ALTER_USER_INFO, is_target_self),
            (actions::ALTER_USER_ACCESS, bypass_only),
            (actions::LIST_ALL_USERS, bypass_only),
            (actions::LIST_ALL_SPACES, bypass_only),
        ];
        Self {
            scope: InstanceScope::NAME,
            actions: table.into_iter().collect(),
        }
    }

    pub fn workspace() -> Self {
        let table: [(&'static str, Predicate); 13] = [
            (actions::ALTER_WORKSPACE, has_workspace_admin),
            (actions::ALTER_WORKSPACE_ACCESS, has_workspace_admin),
            (actions::VIEW_WORKSPACE, can_view_workspace),
            (actions::VIEW_USER, can_view_user),
            (actions::CREATE_COMMENT, can_comment),
            (actions::REPLY_TO_COMMENT, can_comment),
            (actions::EDIT_COMMENT, can_edit_comment),
            (actions::APPROVE_COMMENT, can_moderate),
            (actions::DELETE_COMMENT, can_moderate),
            (actions::CREATE_WRITEUP, can_create_writeup),
            (actions::EDIT_WRITEUP, can_edit_writeup),
            (actions::APPROVE_WRITEUP, can_edit_any_writeup),
            (actions::DELETE_WRITEUP, can_edit_any_writeup),
        ];
        Self {
            scope: WorkspaceScope::NAME,
            actions: table.into_iter().collect(),
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn is_registered(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Registered action tokens, sorted.
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = self.actions.keys().copied().collect();
        actions.sort_unstable();
        actions
    }

    /// Decide without converting a denial into an error.
    pub fn decide(
        &self,
        ctx: &StoreContext<'_>,
        action: &str,
        target: &Target<'_>,
        actor: &User,
    ) -> Result<Decision, AuthError> {
        let Some(predicate) = self.actions.get(action) else {
            return Ok(Decision::Unrecognized);
        };

        if actor.instance_privileges.holds_bypass() {
            info!(actor = actor.user_id, scope = self.scope, action, "Superuser bypass");
            return Ok(Decision::Allowed);
        }

        if predicate(ctx, target, actor)? {
            debug!(actor = actor.user_id, scope = self.scope, action, "Action allowed");
            Ok(Decision::Allowed)
        } else {
            info!(actor = actor.user_id, scope = self.scope, action, "Action denied");
            Ok(Decision::Denied)
        }
    }

    /// Check `action`; a denial returns `false` unless `raise_on_deny`.
    pub fn evaluate(
        &self,
        ctx: &StoreContext<'_>,
        action: &str,
        target: &Target<'_>,
        actor: &User,
        raise_on_deny: bool,
    ) -> Result<bool, AuthError> {
        match self.decide(ctx, action, target, actor)? {
            Decision::Allowed => Ok(true),
            Decision::Denied if raise_on_deny => Err(AuthError::InsufficientPrivileges {
                actor: actor.email_addr.clone(),
                user_id: actor.user_id,
                action: action.to_string(),
            }),
            Decision::Denied => Ok(false),
            Decision::Unrecognized => Err(AuthError::UnrecognizedAction {
                scope: self.scope,
                action: action.to_string(),
            }),
        }
    }

    /// Check `action`, raising on denial.
    pub fn require(
        &self,
        ctx: &StoreContext<'_>,
        action: &str,
        target: &Target<'_>,
        actor: &User,
    ) -> Result<(), AuthError> {
        self.evaluate(ctx, action, target, actor, true).map(|_| ())
    }
}

// ============================================================================
// Target accessors
// ============================================================================

fn expect_user<'t>(target: &Target<'t>, action: &'static str) -> Result<&'t User, AuthError> {
    match target {
        Target::User(user) => Ok(user),
        _ => Err(AuthError::InvalidTarget {
            action,
            expected: "user",
        }),
    }
}

fn expect_workspace<'t>(
    target: &Target<'t>,
    action: &'static str,
) -> Result<&'t Workspace, AuthError> {
    match target {
        Target::Workspace(workspace) => Ok(workspace),
        _ => Err(AuthError::InvalidTarget {
            action,
            expected: "workspace",
        }),
    }
}

fn expect_node(target: &Target<'_>, action: &'static str) -> Result<i64, AuthError> {
    match target {
        Target::Node(id) => Ok(*id),
        _ => Err(AuthError::InvalidTarget {
            action,
            expected: "graph node",
        }),
    }
}

/// Enabled privileges of `actor` in the workspace containing `node`.
fn privileges_around_node(
    ctx: &StoreContext<'_>,
    node: i64,
    actor: &User,
) -> Result<Option<WorkspacePrivilegeSet>, AuthError> {
    match topology::containing_workspace(ctx, node)? {
        Some(workspace_id) => Ok(access::enabled_privileges(ctx, workspace_id, actor.user_id)?),
        None => Ok(None),
    }
}

fn holds_any_of(privileges: Option<WorkspacePrivilegeSet>, wanted: &[&str]) -> bool {
    privileges.is_some_and(|held| held.has_any(&WorkspacePrivilegeSet::from_tokens(wanted)))
}

// ============================================================================
// Instance predicates
// ============================================================================

fn holds_any_instance_privilege(
    _ctx: &StoreContext<'_>,
    _target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    Ok(!actor.instance_privileges.is_empty())
}

fn can_create_user(
    _ctx: &StoreContext<'_>,
    _target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    Ok(actor.instance_privileges.has(CREATE_USER))
}

fn can_create_space(
    _ctx: &StoreContext<'_>,
    _target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    Ok(actor.instance_privileges.has(CREATE_SPACE))
}

/// Only superusers edit other users.
fn is_target_self(
    _ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    Ok(expect_user(target, actions::ALTER_USER_INFO)?.user_id == actor.user_id)
}

/// Reserved for superusers, who never reach the predicate.
fn bypass_only(
    _ctx: &StoreContext<'_>,
    _target: &Target<'_>,
    _actor: &User,
) -> Result<bool, AuthError> {
    Ok(false)
}

// ============================================================================
// Workspace predicates
// ============================================================================

fn has_workspace_admin(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let workspace = expect_workspace(target, actions::ALTER_WORKSPACE)?;
    let privileges = access::enabled_privileges(ctx, workspace.workspace_id, actor.user_id)?;
    Ok(holds_any_of(privileges, &[ADMIN]))
}

fn can_view_workspace(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let workspace = expect_workspace(target, actions::VIEW_WORKSPACE)?;
    Ok(access::enabled_privileges(ctx, workspace.workspace_id, actor.user_id)?.is_some())
}

fn can_view_user(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let user = expect_user(target, actions::VIEW_USER)?;
    if user.user_id == actor.user_id {
        return Ok(true);
    }
    Ok(workspaces::users_share_access(ctx, user.user_id, actor.user_id)?)
}

fn can_comment(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::CREATE_COMMENT)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    Ok(holds_any_of(privileges, &[CONTRIBUTOR, MODERATOR, ADMIN]))
}

/// Moderators and admins, or the author while nobody has replied.
fn can_edit_comment(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::EDIT_COMMENT)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    if privileges.is_none() {
        return Ok(false);
    }
    if holds_any_of(privileges, &[MODERATOR, ADMIN]) {
        return Ok(true);
    }
    let is_author = topology::creator_of(ctx, node)? == Some(actor.user_id);
    Ok(is_author && topology::reply_count(ctx, node)? == 0)
}

fn can_moderate(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::APPROVE_COMMENT)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    Ok(holds_any_of(privileges, &[MODERATOR, ADMIN]))
}

fn can_create_writeup(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::CREATE_WRITEUP)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    Ok(holds_any_of(privileges, &[CONTRIBUTOR, EDITOR, ADMIN]))
}

/// Editors and admins, or the author.
fn can_edit_writeup(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::EDIT_WRITEUP)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    if privileges.is_none() {
        return Ok(false);
    }
    if holds_any_of(privileges, &[EDITOR, ADMIN]) {
        return Ok(true);
    }
    Ok(topology::creator_of(ctx, node)? == Some(actor.user_id))
}

fn can_edit_any_writeup(
    ctx: &StoreContext<'_>,
    target: &Target<'_>,
    actor: &User,
) -> Result<bool, AuthError> {
    let node = expect_node(target, actions::APPROVE_WRITEUP)?;
    let privileges = privileges_around_node(ctx, node, actor)?;
    Ok(holds_any_of(privileges, &[EDITOR, ADMIN]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tables() {
        let instance = PrivilegeChecker::instance();
        assert_eq!(instance.scope(), "instance");
        assert_eq!(instance.actions().len(), 7);
        assert!(instance.is_registered(actions::CREATE_USER));
        assert!(!instance.is_registered(actions::ALTER_WORKSPACE));

        let workspace = PrivilegeChecker::workspace();
        assert_eq!(workspace.scope(), "workspace");
        assert_eq!(workspace.actions().len(), 13);
        assert!(workspace.is_registered(actions::REPLY_TO_COMMENT));
        assert!(!workspace.is_registered(actions::CREATE_SPACE));
    }

    #[test]
    fn test_action_tokens_are_unique_across_scopes() {
        let instance = PrivilegeChecker::instance();
        for action in PrivilegeChecker::workspace().actions() {
            assert!(!instance.is_registered(action), "{} registered twice", action);
        }
    }
}
