//! Categories, write-ups and comments.
//!
//! Each call checks the actor against the workspace action table, then hands
//! the composite to the mutation coordinator. Content lives only in the graph,
//! so there is no relational half to commit first.

use tracing::info;

use crate::checker::{actions, Target, WORKSPACE_CHECKER};
use crate::coordinator::MutationCoordinator;
use crate::error::{Result, TrellisError};
use crate::schema::GraphElement;
use crate::store::StoreContext;
use crate::topology;
use crate::workflows::users::User;
use crate::workflows::workspaces;

/// Add a category under `parent_category_id`. Categories shape the workspace,
/// so this is gated on `alter_workspace_act` for the containing workspace.
pub fn create_category(
    ctx: &StoreContext<'_>,
    actor: &User,
    parent_category_id: i64,
    name: &str,
    description: &str,
) -> Result<GraphElement> {
    let workspace_id = topology::containing_workspace(ctx, parent_category_id)?
        .ok_or_else(|| TrellisError::not_found("category", parent_category_id))?;
    let workspace = workspaces::get_by_id(ctx, workspace_id)?
        .ok_or_else(|| TrellisError::not_found("workspace", workspace_id))?;
    WORKSPACE_CHECKER.require(ctx, actions::ALTER_WORKSPACE, &Target::Workspace(&workspace), actor)?;

    let category = MutationCoordinator::new(*ctx).create_category(
        parent_category_id,
        actor.user_id,
        name,
        description,
    )?;
    info!(workspace_id, parent = parent_category_id, name, "Category created");
    Ok(category)
}

/// Gated on `create_writeup_act` for the category.
pub fn create_writeup(
    ctx: &StoreContext<'_>,
    actor: &User,
    category_id: i64,
    title: &str,
    body: &str,
) -> Result<GraphElement> {
    WORKSPACE_CHECKER.require(ctx, actions::CREATE_WRITEUP, &Target::Node(category_id), actor)?;
    let writeup =
        MutationCoordinator::new(*ctx).create_writeup(category_id, actor.user_id, title, body)?;
    info!(category = category_id, author = actor.user_id, "Write-up created");
    Ok(writeup)
}

/// Open a thread on a category or write-up. Gated on `create_comment_act`.
pub fn start_comment_thread(
    ctx: &StoreContext<'_>,
    actor: &User,
    commented_node_id: i64,
    subject: &str,
    body: &str,
) -> Result<GraphElement> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::CREATE_COMMENT,
        &Target::Node(commented_node_id),
        actor,
    )?;
    MutationCoordinator::new(*ctx).start_comment_thread(commented_node_id, actor.user_id, subject, body)
}

/// Gated on `reply_to_comment_act` for the parent comment.
pub fn reply_to_comment(
    ctx: &StoreContext<'_>,
    actor: &User,
    parent_comment_id: i64,
    subject: &str,
    body: &str,
) -> Result<GraphElement> {
    WORKSPACE_CHECKER.require(
        ctx,
        actions::REPLY_TO_COMMENT,
        &Target::Node(parent_comment_id),
        actor,
    )?;
    MutationCoordinator::new(*ctx).reply_to_comment(parent_comment_id, actor.user_id, subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::privilege::{InstancePrivilegeSet, WorkspacePrivilegeSet, CONTRIBUTOR, CREATE_SPACE};
    use crate::workflows::access;
    use crate::workflows::users::{create_user, NewUser};

    struct Forum {
        owner: User,
        member: User,
        outsider: User,
        root: i64,
    }

    fn forum(fx: &Fixture) -> Forum {
        let ctx = fx.ctx();
        let owner = create_user(
            &ctx,
            &NewUser::new("owner@example.org", "owner", "pw")
                .with_privileges(InstancePrivilegeSet::from_tokens([CREATE_SPACE])),
            None,
        )
        .unwrap();
        let member = create_user(&ctx, &NewUser::new("m@example.org", "member", "pw"), None).unwrap();
        let outsider =
            create_user(&ctx, &NewUser::new("o@example.org", "outsider", "pw"), None).unwrap();

        let workspace = workspaces::create_workspace(&ctx, &owner, "garden", None).unwrap();
        access::grant_as(
            &ctx,
            &owner,
            &workspace,
            member.user_id,
            WorkspacePrivilegeSet::from_tokens([CONTRIBUTOR]),
        )
        .unwrap();
        let root = topology::root_category(&ctx, workspace.workspace_id)
            .unwrap()
            .and_then(|node| topology::unique_node_id(&node))
            .unwrap();
        Forum {
            owner,
            member,
            outsider,
            root,
        }
    }

    #[test]
    fn test_contributor_writes_and_comments() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let f = forum(&fx);

        let category = create_category(&ctx, &f.owner, f.root, "beds", "raised beds")
            .unwrap()
            .unique_id()
            .unwrap();
        let writeup = create_writeup(&ctx, &f.member, category, "Cedar", "lasts longer")
            .unwrap()
            .unique_id()
            .unwrap();
        let thread = start_comment_thread(&ctx, &f.owner, writeup, "Cost?", "pricey")
            .unwrap()
            .unique_id()
            .unwrap();
        reply_to_comment(&ctx, &f.member, thread, "Re: Cost?", "worth it").unwrap();

        assert_eq!(topology::creator_of(&ctx, writeup).unwrap(), Some(f.member.user_id));
        assert_eq!(topology::reply_count(&ctx, thread).unwrap(), 1);
    }

    #[test]
    fn test_contributor_cannot_create_categories() {
        let fx = Fixture::new();
        let f = forum(&fx);
        let err = create_category(&fx.ctx(), &f.member, f.root, "mine", "nope").unwrap_err();
        assert!(err.is_insufficient_privileges());
    }

    #[test]
    fn test_outsider_is_denied_without_graph_writes() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let f = forum(&fx);
        let nodes_before = fx.graph.node_count();

        let err = create_writeup(&ctx, &f.outsider, f.root, "Hi", "let me in").unwrap_err();
        assert!(err.is_insufficient_privileges());
        let err = start_comment_thread(&ctx, &f.outsider, f.root, "Hi", "again").unwrap_err();
        assert!(err.is_insufficient_privileges());
        assert_eq!(fx.graph.node_count(), nodes_before);
    }

    #[test]
    fn test_unknown_parent_category() {
        let fx = Fixture::new();
        let f = forum(&fx);
        let err = create_category(&fx.ctx(), &f.owner, 9_999, "lost", "nowhere").unwrap_err();
        assert!(matches!(err, TrellisError::NotFound { entity: "category", .. }));
    }
}
