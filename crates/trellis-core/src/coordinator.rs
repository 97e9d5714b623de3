//! Mutation coordinator.
//!
//! Turns entity-creation requests into composite graph mutations: unique IDs
//! come from the relational sequences, each element is validated against its
//! schema, and the resulting statements run as one atomic script. Every
//! operation has a `*_defs` form that only builds the statements, so callers
//! can batch several composites into a single submission.
//!
//! Relational work belonging to the same operation must be committed before
//! the graph call; nothing here undoes it if the graph call then fails.

use serde_json::Value;
use tracing::debug;

use crate::clock;
use crate::error::Result;
use crate::graph::{GraphStoreError, PropertyMap};
use crate::schema::{
    ElementKind, ElementType, GraphElement, CATEGORY_DESC_FIELD, CATEGORY_NAME_FIELD,
    COMMENT_BODY_FIELD, COMMENT_SUBJECT_FIELD, CREATION_DATE_FIELD, USER_ID_FIELD, USER_INDEX,
    WORKSPACE_ID_FIELD, WRITEUP_BODY_FIELD, WRITEUP_TITLE_FIELD,
};
use crate::sequence::SequenceAllocator;
use crate::statement::{self, NodeLookup, StatementDef};
use crate::store::StoreContext;

/// Name given to every workspace's root category
pub const ROOT_CATEGORY_NAME: &str = "root";

/// Statements for a new content node plus the unique ID it will carry.
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub unique_node_id: i64,
    pub defs: Vec<StatementDef>,
}

/// Workspace node and root category created together.
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
    pub workspace: GraphElement,
    pub root_category: GraphElement,
}

pub struct MutationCoordinator<'a> {
    ctx: StoreContext<'a>,
}

impl<'a> MutationCoordinator<'a> {
    pub fn new(ctx: StoreContext<'a>) -> Self {
        Self { ctx }
    }

    fn ids(&self) -> SequenceAllocator<'a> {
        SequenceAllocator::new(self.ctx.relational)
    }

    // ------------------------------------------------------------------------
    // Building blocks
    // ------------------------------------------------------------------------

    /// Validate, allocate a node ID and build the create statement.
    pub fn node_def(&self, element_type: ElementType, props: PropertyMap) -> Result<StatementDef> {
        debug_assert_eq!(element_type.kind(), ElementKind::Node);
        element_type.validate_caller_fields(&props)?;
        let id = self.ids().next_node_id()?;
        let element = element_type.assemble_for_create(id, props)?;
        Ok(statement::create_and_index_node(element))
    }

    /// Validate, allocate an edge ID and build the create statement.
    pub fn edge_def(
        &self,
        element_type: ElementType,
        out_node: &NodeLookup,
        in_node: &NodeLookup,
        props: PropertyMap,
    ) -> Result<StatementDef> {
        debug_assert_eq!(element_type.kind(), ElementKind::Edge);
        element_type.validate_caller_fields(&props)?;
        let id = self.ids().next_edge_id()?;
        let element = element_type.assemble_for_create(id, props)?;
        Ok(statement::create_and_index_edge(out_node, in_node, element))
    }

    /// Edge between two nodes addressed by unique node ID.
    pub fn link_nodes_by_unique_id_def(
        &self,
        element_type: ElementType,
        out_node_id: i64,
        in_node_id: i64,
        props: PropertyMap,
    ) -> Result<StatementDef> {
        self.edge_def(
            element_type,
            &NodeLookup::by_unique_id(out_node_id),
            &NodeLookup::by_unique_id(in_node_id),
            props,
        )
    }

    /// `CREATED_BY` edge from a node to its author's user node.
    pub fn link_to_creator_def(
        &self,
        node_id: i64,
        user_id: i64,
        creation_date: &str,
    ) -> Result<StatementDef> {
        let mut props = PropertyMap::new();
        props.insert(USER_ID_FIELD.to_string(), Value::from(user_id));
        props.insert(CREATION_DATE_FIELD.to_string(), Value::from(creation_date));
        self.edge_def(
            ElementType::CreatedBy,
            &NodeLookup::by_unique_id(node_id),
            &NodeLookup::new(USER_INDEX, USER_ID_FIELD, user_id),
            props,
        )
    }

    /// Run statements atomically; returns the elements they created, in order.
    pub fn submit(&self, defs: Vec<StatementDef>) -> Result<Vec<GraphElement>> {
        let results = self.ctx.graph.run(&defs)?;
        if results.len() != defs.len() {
            return Err(GraphStoreError::UnexpectedResponse(format!(
                "expected {} results, got {}",
                defs.len(),
                results.len()
            ))
            .into());
        }
        debug!("Submitted {} statements", defs.len());
        Ok(defs.into_iter().filter_map(|d| d.result_binding).collect())
    }

    fn submit_planned(&self, planned: PlannedNode) -> Result<GraphElement> {
        let id = planned.unique_node_id;
        self.submit(planned.defs)?
            .into_iter()
            .find(|e| e.element_type.kind() == ElementKind::Node)
            .ok_or_else(|| GraphStoreError::UnexpectedResponse(format!("node {} not created", id)).into())
    }

    // ------------------------------------------------------------------------
    // Users and workspaces
    // ------------------------------------------------------------------------

    pub fn user_node_defs(&self, user_id: i64) -> Result<Vec<StatementDef>> {
        let mut props = PropertyMap::new();
        props.insert(USER_ID_FIELD.to_string(), Value::from(user_id));
        Ok(vec![self.node_def(ElementType::User, props)?])
    }

    pub fn create_user_node(&self, user_id: i64) -> Result<GraphElement> {
        let defs = self.user_node_defs(user_id)?;
        self.submit(defs)?
            .into_iter()
            .next()
            .ok_or_else(|| GraphStoreError::UnexpectedResponse("user node not created".into()).into())
    }

    /// Workspace node, root category node and the `IS_ROOT_CAT_FOR` edge.
    pub fn workspace_graph_defs(&self, workspace_id: i64) -> Result<Vec<StatementDef>> {
        let mut workspace_props = PropertyMap::new();
        workspace_props.insert(WORKSPACE_ID_FIELD.to_string(), Value::from(workspace_id));
        let workspace = self.node_def(ElementType::Workspace, workspace_props)?;

        let mut root_props = PropertyMap::new();
        root_props.insert(WORKSPACE_ID_FIELD.to_string(), Value::from(workspace_id));
        root_props.insert(CATEGORY_NAME_FIELD.to_string(), Value::from(ROOT_CATEGORY_NAME));
        let root = self.node_def(ElementType::RootCategory, root_props)?;

        let link = self.link_nodes_by_unique_id_def(
            ElementType::IsRootCatFor,
            bound_id(&root)?,
            bound_id(&workspace)?,
            PropertyMap::new(),
        )?;
        Ok(vec![workspace, root, link])
    }

    pub fn create_workspace_graph(&self, workspace_id: i64) -> Result<WorkspaceGraph> {
        let defs = self.workspace_graph_defs(workspace_id)?;
        let mut created = self.submit(defs)?.into_iter();
        match (created.next(), created.next()) {
            (Some(workspace), Some(root_category)) => Ok(WorkspaceGraph {
                workspace,
                root_category,
            }),
            _ => Err(GraphStoreError::UnexpectedResponse("workspace graph incomplete".into()).into()),
        }
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    /// Content node + `CREATED_BY` edge + containment edge to `parent_node_id`.
    fn content_defs(
        &self,
        node_type: ElementType,
        containment: ElementType,
        parent_node_id: i64,
        creator_id: i64,
        mut props: PropertyMap,
    ) -> Result<PlannedNode> {
        let created = clock::timestamp_now();
        props.insert(CREATION_DATE_FIELD.to_string(), Value::from(created.clone()));
        let node = self.node_def(node_type, props)?;
        let node_id = bound_id(&node)?;
        let creator = self.link_to_creator_def(node_id, creator_id, &created)?;
        let parent =
            self.link_nodes_by_unique_id_def(containment, node_id, parent_node_id, PropertyMap::new())?;
        Ok(PlannedNode {
            unique_node_id: node_id,
            defs: vec![node, creator, parent],
        })
    }

    pub fn category_defs(
        &self,
        parent_category_id: i64,
        creator_id: i64,
        name: &str,
        description: &str,
    ) -> Result<PlannedNode> {
        let mut props = PropertyMap::new();
        props.insert(CATEGORY_NAME_FIELD.to_string(), Value::from(name));
        props.insert(CATEGORY_DESC_FIELD.to_string(), Value::from(description));
        self.content_defs(
            ElementType::Category,
            ElementType::HasParentCat,
            parent_category_id,
            creator_id,
            props,
        )
    }

    pub fn create_category(
        &self,
        parent_category_id: i64,
        creator_id: i64,
        name: &str,
        description: &str,
    ) -> Result<GraphElement> {
        let planned = self.category_defs(parent_category_id, creator_id, name, description)?;
        self.submit_planned(planned)
    }

    pub fn writeup_defs(
        &self,
        category_id: i64,
        creator_id: i64,
        title: &str,
        body: &str,
    ) -> Result<PlannedNode> {
        let mut props = PropertyMap::new();
        props.insert(WRITEUP_TITLE_FIELD.to_string(), Value::from(title));
        props.insert(WRITEUP_BODY_FIELD.to_string(), Value::from(body));
        self.content_defs(
            ElementType::Writeup,
            ElementType::BelongsToCat,
            category_id,
            creator_id,
            props,
        )
    }

    pub fn create_writeup(
        &self,
        category_id: i64,
        creator_id: i64,
        title: &str,
        body: &str,
    ) -> Result<GraphElement> {
        let planned = self.writeup_defs(category_id, creator_id, title, body)?;
        self.submit_planned(planned)
    }

    fn comment_props(subject: &str, body: &str) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(COMMENT_SUBJECT_FIELD.to_string(), Value::from(subject));
        props.insert(COMMENT_BODY_FIELD.to_string(), Value::from(body));
        props
    }

    /// First comment on a category or write-up.
    pub fn comment_thread_defs(
        &self,
        commented_node_id: i64,
        creator_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<PlannedNode> {
        self.content_defs(
            ElementType::Comment,
            ElementType::CommentsOn,
            commented_node_id,
            creator_id,
            Self::comment_props(subject, body),
        )
    }

    pub fn start_comment_thread(
        &self,
        commented_node_id: i64,
        creator_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<GraphElement> {
        let planned = self.comment_thread_defs(commented_node_id, creator_id, subject, body)?;
        self.submit_planned(planned)
    }

    pub fn reply_defs(
        &self,
        parent_comment_id: i64,
        creator_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<PlannedNode> {
        self.content_defs(
            ElementType::Comment,
            ElementType::HasParentComment,
            parent_comment_id,
            creator_id,
            Self::comment_props(subject, body),
        )
    }

    pub fn reply_to_comment(
        &self,
        parent_comment_id: i64,
        creator_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<GraphElement> {
        let planned = self.reply_defs(parent_comment_id, creator_id, subject, body)?;
        self.submit_planned(planned)
    }
}

/// Unique ID of the element a create statement is bound to.
fn bound_id(def: &StatementDef) -> Result<i64> {
    def.result_binding
        .as_ref()
        .and_then(GraphElement::unique_id)
        .ok_or_else(|| {
            GraphStoreError::UnexpectedResponse(format!("{} has no bound element", def.operation))
                .into()
        })
}
