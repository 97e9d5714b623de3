//! Read-side queries over the content graph.

use serde_json::Value;

use crate::graph::{GraphStoreError, IndexKind, PropertyMap};
use crate::schema::{
    NODE_TYPE_FIELD, ROOT_CATEGORY_TYPE_TAG, UNIQUE_NODE_ID_FIELD, UNIQUE_NODE_ID_INDEX,
    USER_ID_FIELD, USER_INDEX, WORKSPACE_ID_FIELD, WORKSPACE_INDEX, WORKSPACE_TYPE_TAG,
};
use crate::statement;
use crate::store::StoreContext;

/// Workspace ID above `node`, following containment edges.
pub fn containing_workspace(
    ctx: &StoreContext<'_>,
    node: i64,
) -> Result<Option<i64>, GraphStoreError> {
    let value = ctx.graph.query_one(statement::find_workspace_id(node))?;
    Ok(value.as_i64())
}

/// User ID recorded on the node's `CREATED_BY` edge.
pub fn creator_of(ctx: &StoreContext<'_>, node: i64) -> Result<Option<i64>, GraphStoreError> {
    let value = ctx.graph.query_one(statement::find_creator_id(node))?;
    Ok(value.as_i64())
}

/// Number of direct replies to a comment.
pub fn reply_count(ctx: &StoreContext<'_>, node: i64) -> Result<u64, GraphStoreError> {
    let value = ctx.graph.query_one(statement::count_replies(node))?;
    value
        .as_u64()
        .ok_or_else(|| GraphStoreError::UnexpectedResponse(value.to_string()))
}

fn lookup(
    ctx: &StoreContext<'_>,
    index: &str,
    field: &str,
    value: Value,
) -> Result<Vec<PropertyMap>, GraphStoreError> {
    let store = ctx.graph.store();
    let handle = store.get_or_create_index(IndexKind::Node, index, None)?;
    store.index_get(&handle, field, &value)
}

fn with_type(nodes: Vec<PropertyMap>, type_tag: &str) -> Option<PropertyMap> {
    nodes
        .into_iter()
        .find(|n| n.get(NODE_TYPE_FIELD).and_then(Value::as_str) == Some(type_tag))
}

pub fn node_by_unique_id(
    ctx: &StoreContext<'_>,
    unique_node_id: i64,
) -> Result<Option<PropertyMap>, GraphStoreError> {
    Ok(lookup(ctx, UNIQUE_NODE_ID_INDEX, UNIQUE_NODE_ID_FIELD, unique_node_id.into())?
        .into_iter()
        .next())
}

pub fn user_node(ctx: &StoreContext<'_>, user_id: i64) -> Result<Option<PropertyMap>, GraphStoreError> {
    Ok(lookup(ctx, USER_INDEX, USER_ID_FIELD, user_id.into())?
        .into_iter()
        .next())
}

pub fn workspace_node(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
) -> Result<Option<PropertyMap>, GraphStoreError> {
    let nodes = lookup(ctx, WORKSPACE_INDEX, WORKSPACE_ID_FIELD, workspace_id.into())?;
    Ok(with_type(nodes, WORKSPACE_TYPE_TAG))
}

pub fn root_category(
    ctx: &StoreContext<'_>,
    workspace_id: i64,
) -> Result<Option<PropertyMap>, GraphStoreError> {
    let nodes = lookup(ctx, WORKSPACE_INDEX, WORKSPACE_ID_FIELD, workspace_id.into())?;
    Ok(with_type(nodes, ROOT_CATEGORY_TYPE_TAG))
}

/// Unique node ID of a property bag returned by a lookup.
pub fn unique_node_id(node: &PropertyMap) -> Option<i64> {
    node.get(UNIQUE_NODE_ID_FIELD).and_then(Value::as_i64)
}
