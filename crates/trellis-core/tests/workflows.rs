//! End-to-end workflow tests over an on-disk relational store.

mod common;

use common::Harness;
use pretty_assertions::assert_eq;
use trellis_core::privilege::{ADMIN, CONTRIBUTOR, CREATE_SPACE, CREATE_USER, SUPER};
use trellis_core::workflows::credentials::{check_password_audited, CredentialError};
use trellis_core::workflows::invitations::{self, InvitationError, InvitationState};
use trellis_core::workflows::{access, bootstrap, sessions, users, workspaces};
use trellis_config::SecurityConfig;
use trellis_core::store::schema::INSTANCE_INVITATIONS;
use trellis_core::{
    row, topology, InstancePrivilegeSet, RelationalStore, StoreContext, TrellisError,
    WorkspacePrivilegeSet, DECLARED_INDEXES,
};

// ============================================================================
// Workspaces and access
// ============================================================================

#[test]
fn workspace_lifecycle() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let plain = h.user("plain", &[]);

    let orchard = workspaces::create_workspace(&ctx, &owner, "orchard", Some("fruit"))
        .expect("Failed to create workspace");
    assert_eq!(orchard.creator, Some(owner.user_id));
    assert!(topology::workspace_node(&ctx, orchard.workspace_id).unwrap().is_some());

    let owner_entry = access::get(&ctx, orchard.workspace_id, owner.user_id)
        .unwrap()
        .expect("creator holds an entry");
    assert_eq!(
        owner_entry.workspace_privileges,
        WorkspacePrivilegeSet::from_tokens([ADMIN])
    );

    let err = workspaces::create_workspace(&ctx, &owner, "orchard", None).unwrap_err();
    assert!(matches!(err, TrellisError::Duplicate { entity: "workspace", .. }));
    let err = workspaces::create_workspace(&ctx, &owner, "   ", None).unwrap_err();
    assert!(matches!(err, TrellisError::InvalidInput(_)));
    let err = workspaces::create_workspace(&ctx, &plain, "mine", None).unwrap_err();
    assert!(err.is_insufficient_privileges());

    let renamed = workspaces::update_settings(&ctx, &owner, &orchard, "grove", None).unwrap();
    assert_eq!(renamed.workspace_name, "grove");
    assert_eq!(renamed.modifier, Some(owner.user_id));
    assert!(workspaces::get_by_name(&ctx, "orchard").unwrap().is_none());

    let err = workspaces::update_settings(&ctx, &plain, &renamed, "stolen", None).unwrap_err();
    assert!(err.is_insufficient_privileges());

    let events: Vec<String> = workspaces::audit_trail(&ctx, orchard.workspace_id)
        .unwrap()
        .into_iter()
        .map(|e| e.audit_event)
        .collect();
    assert_eq!(events, vec!["workspace_created", "access_granted", "settings_updated"]);
}

#[test]
fn access_grant_update_revoke() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let ws = workspaces::create_workspace(&ctx, &owner, "shed", None).unwrap();
    let guest = h.user("guest", &[]);

    assert!(workspaces::list_accessible(&ctx, guest.user_id).unwrap().is_empty());
    assert!(!workspaces::users_share_access(&ctx, owner.user_id, guest.user_id).unwrap());

    let entry = access::grant_as(
        &ctx,
        &owner,
        &ws,
        guest.user_id,
        WorkspacePrivilegeSet::from_tokens([CONTRIBUTOR]),
    )
    .unwrap();
    assert!(entry.is_enabled);
    assert_eq!(entry.creator, Some(owner.user_id));
    assert_eq!(workspaces::list_accessible(&ctx, guest.user_id).unwrap(), vec![ws.clone()]);
    assert!(workspaces::users_share_access(&ctx, owner.user_id, guest.user_id).unwrap());

    let err = access::grant_as(&ctx, &owner, &ws, guest.user_id, WorkspacePrivilegeSet::new())
        .unwrap_err();
    assert!(matches!(err, TrellisError::Duplicate { .. }));

    // A contributor cannot manage access
    let err = access::update(&ctx, &guest, &ws, &entry, WorkspacePrivilegeSet::from_tokens([ADMIN]), true)
        .unwrap_err();
    assert!(err.is_insufficient_privileges());

    let disabled = access::update(&ctx, &owner, &ws, &entry, entry.workspace_privileges, false).unwrap();
    assert!(!disabled.is_enabled);
    assert_eq!(disabled.effective_privileges(), None);
    assert!(workspaces::list_accessible(&ctx, guest.user_id).unwrap().is_empty());

    let members = users::users_with_access(&ctx, ws.workspace_id).unwrap();
    assert_eq!(members.len(), 2);
    assert!(members
        .iter()
        .any(|m| m.user_id == guest.user_id && !m.is_enabled_for_workspace));

    access::revoke(&ctx, &owner, &ws, disabled).unwrap();
    assert!(access::get(&ctx, ws.workspace_id, guest.user_id).unwrap().is_none());

    let last = workspaces::audit_trail(&ctx, ws.workspace_id).unwrap();
    assert_eq!(last.last().map(|e| e.audit_event.as_str()), Some("access_revoked"));
}

#[test]
fn list_all_is_superuser_only() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let root = h.superuser();
    workspaces::create_workspace(&ctx, &owner, "one", None).unwrap();
    workspaces::create_workspace(&ctx, &root, "two", None).unwrap();

    let err = workspaces::list_all(&ctx, &owner).unwrap_err();
    assert!(err.is_insufficient_privileges());
    let names: Vec<String> = workspaces::list_all(&ctx, &root)
        .unwrap()
        .into_iter()
        .map(|w| w.workspace_name)
        .collect();
    assert_eq!(names, vec!["one", "two"]);

    assert_eq!(users::list_all_users(&ctx, &root).unwrap().len(), 2);
    assert!(users::list_all_users(&ctx, &owner).is_err());
}

// ============================================================================
// Invitations
// ============================================================================

#[test]
fn instance_invitation_accept() {
    let h = Harness::new();
    let ctx = h.ctx();
    let inviter = h.user("inviter", &[CREATE_USER, CREATE_SPACE]);

    let invitation = invitations::create_instance_invitation(
        &ctx,
        &inviter,
        None,
        "newbie@example.org",
        InstancePrivilegeSet::from_tokens([CREATE_SPACE]),
        Some("come garden with us"),
    )
    .expect("Failed to create invitation");
    assert!(invitations::is_valid_code(&invitation.instance_invitation_code));
    assert_eq!(invitation.state(), InvitationState::Pending);

    let newbie = invitations::create_user_and_accept_instance_invitation(
        &ctx,
        &invitation,
        "newbie",
        "seedling",
        Some("hello"),
    )
    .expect("Failed to accept invitation");
    assert_eq!(newbie.email_addr, "newbie@example.org");
    assert_eq!(newbie.creator, Some(inviter.user_id));
    assert!(newbie.instance_privileges.has(CREATE_SPACE));
    assert!(topology::user_node(&ctx, newbie.user_id).unwrap().is_some());

    let decided = invitations::get_instance_invitation(&ctx, &invitation.instance_invitation_code)
        .unwrap()
        .expect("invitation exists");
    assert_eq!(decided.state(), InvitationState::Accepted);
    assert_eq!(decided.new_user_id, Some(newbie.user_id));
    assert!(decided.decision_date.is_some());

    // Deciding again is rejected, whichever copy is used
    let err = invitations::decline_instance_invitation(&ctx, &decided).unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::AlreadyDecided { .. })
    ));
    let err = invitations::create_user_and_accept_instance_invitation(
        &ctx,
        &invitation,
        "second",
        "pw",
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::AlreadyDecided { .. })
    ));
    assert!(users::get_by_username(&ctx, "second").unwrap().is_none());
}

#[test]
fn instance_invitation_rules() {
    let h = Harness::new();
    let ctx = h.ctx();
    let inviter = h.user_creator("inviter");
    let plain = h.user("plain", &[]);

    let err = invitations::create_instance_invitation(
        &ctx,
        &plain,
        None,
        "x@example.org",
        InstancePrivilegeSet::new(),
        None,
    )
    .unwrap_err();
    assert!(err.is_insufficient_privileges());

    let err = invitations::create_instance_invitation(
        &ctx,
        &inviter,
        None,
        "x@example.org",
        InstancePrivilegeSet::from_tokens([SUPER]),
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::ExceedsGrantable { .. })
    ));

    let err = invitations::create_instance_invitation(
        &ctx,
        &inviter,
        Some("too-short"),
        "x@example.org",
        InstancePrivilegeSet::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::InvalidCode { min_len: 20 })
    ));

    let code = "spring-planting_2026-invite";
    let invitation = invitations::create_instance_invitation(
        &ctx,
        &inviter,
        Some(code),
        "x@example.org",
        InstancePrivilegeSet::new(),
        None,
    )
    .unwrap();
    assert_eq!(invitation.instance_invitation_code, code);

    invitations::decline_instance_invitation(&ctx, &invitation).unwrap();
    let declined = invitations::get_instance_invitation(&ctx, code).unwrap().unwrap();
    assert_eq!(declined.state(), InvitationState::Declined);
    assert_eq!(declined.new_user_id, None);
}

#[test]
fn workspace_invitation_for_existing_and_new_users() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let ws = workspaces::create_workspace(&ctx, &owner, "greenhouse", None).unwrap();
    let existing = h.user("existing", &[]);

    let invitation = invitations::create_workspace_invitation(
        &ctx,
        &owner,
        &ws,
        None,
        "existing@example.org",
        WorkspacePrivilegeSet::from_tokens([CONTRIBUTOR]),
        None,
    )
    .unwrap();
    let entry =
        invitations::accept_workspace_invitation(&ctx, &invitation, existing.user_id).unwrap();
    assert_eq!(entry.invitation_id, Some(invitation.workspace_invitation_id));
    assert_eq!(entry.creator, Some(owner.user_id));
    assert!(entry.workspace_privileges.has(CONTRIBUTOR));

    let err = invitations::accept_workspace_invitation(&ctx, &invitation, existing.user_id)
        .unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::AlreadyDecided { .. })
    ));

    // Contributors cannot invite
    let err = invitations::create_workspace_invitation(
        &ctx,
        &existing,
        &ws,
        None,
        "friend@example.org",
        WorkspacePrivilegeSet::new(),
        None,
    )
    .unwrap_err();
    assert!(err.is_insufficient_privileges());

    let for_new = invitations::create_workspace_invitation(
        &ctx,
        &owner,
        &ws,
        None,
        "fresh@example.org",
        WorkspacePrivilegeSet::from_tokens([CONTRIBUTOR]),
        Some("join us"),
    )
    .unwrap();
    let fresh = invitations::create_user_and_accept_workspace_invitation(
        &ctx,
        &for_new,
        "fresh",
        "sprout",
        None,
    )
    .unwrap();
    assert_eq!(fresh.email_addr, "fresh@example.org");
    assert_eq!(fresh.creator, Some(owner.user_id));
    assert!(fresh.instance_privileges.is_empty());
    assert_eq!(
        workspaces::list_accessible(&ctx, fresh.user_id).unwrap(),
        vec![ws.clone()]
    );

    let accepted = invitations::get_workspace_invitation(&ctx, &for_new.workspace_invitation_code)
        .unwrap()
        .unwrap();
    assert_eq!(accepted.state(), InvitationState::Accepted);
    assert_eq!(accepted.user_id, Some(fresh.user_id));
}

#[test]
fn declined_workspace_invitation_cannot_be_accepted() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let ws = workspaces::create_workspace(&ctx, &owner, "pond", None).unwrap();
    let invitee = h.user("invitee", &[]);

    let invitation = invitations::create_workspace_invitation(
        &ctx,
        &owner,
        &ws,
        None,
        "invitee@example.org",
        WorkspacePrivilegeSet::new(),
        None,
    )
    .unwrap();
    invitations::decline_workspace_invitation(&ctx, &invitation).unwrap();

    // The stale copy still says pending; the store decides
    let err = invitations::accept_workspace_invitation(&ctx, &invitation, invitee.user_id)
        .unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Invitation(InvitationError::AlreadyDecided { .. })
    ));
    assert!(access::get(&ctx, ws.workspace_id, invitee.user_id).unwrap().is_none());
}

#[test]
fn failed_signup_leaves_no_pending_companion_invitation() {
    let h = Harness::new();
    let ctx = h.ctx();
    let owner = h.space_creator("owner");
    let ws = workspaces::create_workspace(&ctx, &owner, "meadow", None).unwrap();
    h.user("taken", &[]);

    let invitation = invitations::create_workspace_invitation(
        &ctx,
        &owner,
        &ws,
        None,
        "newcomer@example.org",
        WorkspacePrivilegeSet::new(),
        None,
    )
    .unwrap();
    let companions = || {
        h.relational
            .select(
                INSTANCE_INVITATIONS.name,
                &row! { "invitee_email_addr" => "newcomer@example.org" },
                None,
            )
            .unwrap()
    };

    for _ in 0..2 {
        let err = invitations::create_user_and_accept_workspace_invitation(
            &ctx,
            &invitation,
            "taken",
            "pw",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TrellisError::Duplicate { .. }));
    }
    assert!(companions().is_empty());

    // The workspace invitation is still usable with a free username
    let newcomer = invitations::create_user_and_accept_workspace_invitation(
        &ctx,
        &invitation,
        "newcomer",
        "pw",
        None,
    )
    .unwrap();
    assert_eq!(newcomer.email_addr, "newcomer@example.org");
    assert_eq!(companions().len(), 1);
}

// ============================================================================
// Users, credentials and sessions
// ============================================================================

#[test]
fn password_change_and_lockout() {
    let h = Harness::new();
    let ctx = h.ctx();
    let ada = h.user("ada", &[]);

    users::change_password(&ctx, &ada, &ada, "new secret").unwrap();
    let ada = users::get_by_id(&ctx, ada.user_id).unwrap().unwrap();
    assert!(check_password_audited(&ctx, &ada, "new secret", true).unwrap());
    assert_eq!(users::password_audit_for_user(&ctx, ada.user_id).unwrap().len(), 1);

    for _ in 0..h.security.password_check_max_failures {
        assert!(!check_password_audited(&ctx, &ada, "guess", true).unwrap());
    }
    // Locked out, even with the right password
    assert!(!check_password_audited(&ctx, &ada, "new secret", false).unwrap());
    let err = check_password_audited(&ctx, &ada, "new secret", true).unwrap_err();
    assert!(matches!(
        err,
        TrellisError::Credential(CredentialError::TooManyRecentFailures { .. })
    ));
}

#[test]
fn unusable_failure_window_is_an_error_not_a_silent_pass() {
    let h = Harness::new();
    let ada = h.user("ada", &[]);

    for window in [-10, 200_000_000_000_000] {
        let policy = SecurityConfig {
            password_check_window_mins: window,
            ..SecurityConfig::default()
        };
        let ctx = StoreContext::new(&h.relational, &h.executor, &policy);
        let err = check_password_audited(&ctx, &ada, "correct horse", true).unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Credential(CredentialError::WindowOutOfRange { value, .. }) if value == window
        ));
    }
}

#[test]
fn superuser_manages_instance_access() {
    let h = Harness::new();
    let ctx = h.ctx();
    let root = h.superuser();
    let bo = h.user("bo", &[]);

    let err = users::update_instance_access(
        &ctx,
        &bo,
        &bo,
        true,
        InstancePrivilegeSet::from_tokens([SUPER]),
    )
    .unwrap_err();
    assert!(err.is_insufficient_privileges());

    let bo = users::update_instance_access(
        &ctx,
        &root,
        &bo,
        false,
        InstancePrivilegeSet::from_tokens([CREATE_SPACE]),
    )
    .unwrap();
    assert!(!bo.is_enabled);
    assert!(bo.instance_privileges.has(CREATE_SPACE));

    let audit = users::privilege_audit_for_user(&ctx, bo.user_id).unwrap();
    assert_eq!(audit.len(), 2);
    assert!(audit
        .iter()
        .any(|entry| entry.updating_user == Some(root.user_id) && !entry.is_enabled));
}

#[test]
fn sessions_survive_reopen_of_context() {
    let h = Harness::new();
    let ada = h.user("ada", &[]);

    let session = sessions::create_session(&h.ctx(), ada.user_id).unwrap();
    let ctx = h.ctx();
    let found = sessions::get_session(&ctx, &session.session_id)
        .unwrap()
        .expect("session stored");
    assert!(found.is_valid(&h.security));

    sessions::create_session(&ctx, ada.user_id).unwrap();
    assert_eq!(sessions::kill_sessions_for_user(&ctx, ada.user_id).unwrap(), 2);
    assert!(sessions::get_session(&ctx, &session.session_id).unwrap().is_none());
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn bootstrap_backfills_removed_nodes() {
    let h = Harness::new();
    let ctx = h.ctx();
    let ada = h.user("ada", &[]);
    let node = topology::user_node(&ctx, ada.user_id).unwrap().unwrap();
    assert!(h.graph.remove_node(topology::unique_node_id(&node).unwrap()));

    let report = bootstrap::bootstrap_graph(&ctx).unwrap();
    assert_eq!(report.indexes, DECLARED_INDEXES.len());
    assert_eq!(report.backfilled.user_ids, vec![ada.user_id]);
    assert!(topology::user_node(&ctx, ada.user_id).unwrap().is_some());
}
