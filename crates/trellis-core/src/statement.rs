//! Statement definitions and script composition.
//!
//! A [`StatementDef`] describes one helper call: the operation, its ordered
//! parameter names, optional casts, and the values of the parameters that are
//! bound. [`compose`] renders a list of them into a single script plus one
//! merged parameter table:
//!
//! ```text
//! result = GraphHelpers.execInTransaction(g, { ->
//!   result_0 = GraphHelpers.createAndIndexNode(g, node_props_0, fields_to_index_0)
//!   result_1 = GraphHelpers.createAndIndexEdge(g, out_node_lookup_info_1, ...)
//!   return [result_0, result_1]
//! })
//! ```
//!
//! Bound parameters are renamed `<name>_<i>` so statements never collide;
//! unbound names (such as the graph handle `g`) pass through untouched.

use serde_json::{json, Value};
use tracing::debug;

use crate::graph::PropertyMap;
use crate::schema::{GraphElement, UNIQUE_NODE_ID_FIELD, UNIQUE_NODE_ID_INDEX};

/// Name the script engine binds the graph handle to
pub const GRAPH_HANDLE: &str = "g";

pub const CREATE_AND_INDEX_NODE: &str = "GraphHelpers.createAndIndexNode";
pub const CREATE_AND_INDEX_EDGE: &str = "GraphHelpers.createAndIndexEdge";
pub const FIND_WORKSPACE_ID: &str = "GraphHelpers.findWorkspaceId";
pub const FIND_CREATOR_ID: &str = "GraphHelpers.findCreatorId";
pub const COUNT_REPLIES: &str = "GraphHelpers.countReplies";

const ATOMIC_BLOCK_OPEN: &str = "result = GraphHelpers.execInTransaction(g, { -> ";

/// One helper call within a composite operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementDef {
    pub operation: String,
    pub parameter_names: Vec<String>,
    /// One entry per parameter name
    pub parameter_casts: Vec<Option<String>>,
    pub parameter_values: PropertyMap,
    /// The element this statement creates, if any
    pub result_binding: Option<GraphElement>,
}

impl StatementDef {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameter_names: Vec::new(),
            parameter_casts: Vec::new(),
            parameter_values: PropertyMap::new(),
            result_binding: None,
        }
    }

    /// Append a parameter the script engine supplies.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.parameter_names.push(name.into());
        self.parameter_casts.push(None);
        self
    }

    /// Append a parameter with a bound value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.parameter_values.insert(name.clone(), value.into());
        self.param(name)
    }

    /// Append a bound parameter rendered with a cast, e.g. `(Map[]) name`.
    pub fn bind_cast(
        mut self,
        name: impl Into<String>,
        cast: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let name = name.into();
        self.parameter_values.insert(name.clone(), value.into());
        self.parameter_names.push(name);
        self.parameter_casts.push(Some(cast.into()));
        self
    }

    pub fn with_binding(mut self, element: GraphElement) -> Self {
        self.result_binding = Some(element);
        self
    }

    /// `{operation, parameter_names, parameter_values, result_binding}`
    pub fn to_wire(&self) -> Value {
        json!({
            "operation": self.operation,
            "parameter_names": self.parameter_names,
            "parameter_values": self.parameter_values,
            "result_binding": self.result_binding.as_ref().map(|e| &e.properties),
        })
    }

    fn render(&self, index: usize, params: &mut PropertyMap) -> String {
        let args: Vec<String> = self
            .parameter_names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let rendered = match self.parameter_values.get(name) {
                    Some(value) => {
                        let namespaced = format!("{}_{}", name, index);
                        params.insert(namespaced.clone(), value.clone());
                        namespaced
                    }
                    None => name.clone(),
                };
                match self.parameter_casts.get(j).and_then(Option::as_deref) {
                    Some(cast) => format!("({}) {}", cast, rendered),
                    None => rendered,
                }
            })
            .collect();
        format!("  result_{} = {}({})", index, self.operation, args.join(", "))
    }
}

/// Where an edge endpoint is found: `index.get(key, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLookup {
    pub index_name: String,
    pub key: String,
    pub value: Value,
}

impl NodeLookup {
    pub fn new(index_name: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            index_name: index_name.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn by_unique_id(unique_node_id: i64) -> Self {
        Self::new(UNIQUE_NODE_ID_INDEX, UNIQUE_NODE_ID_FIELD, unique_node_id)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "lookupIndexName": self.index_name,
            "lookupKey": self.key,
            "lookupValue": self.value,
        })
    }
}

/// A rendered script and its merged parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedScript {
    pub script: String,
    pub params: PropertyMap,
}

impl ComposedScript {
    /// Put library source ahead of the statements.
    pub fn with_preamble(mut self, library: &str) -> Self {
        self.script = format!("{}\n\n{}", library, self.script);
        self
    }
}

/// Render `defs` into one script, optionally inside the atomic block.
pub fn compose(defs: &[StatementDef], wrap_in_transaction: bool) -> ComposedScript {
    let mut params = PropertyMap::new();
    let mut lines: Vec<String> = defs
        .iter()
        .enumerate()
        .map(|(i, def)| def.render(i, &mut params))
        .collect();

    let results: Vec<String> = (0..defs.len()).map(|i| format!("result_{}", i)).collect();
    lines.push(format!("  return [{}]", results.join(", ")));

    let mut script = lines.join("\n");
    if wrap_in_transaction {
        script = format!("{}\n{}\n}})", ATOMIC_BLOCK_OPEN, script);
    }

    debug!(
        "Composed {} statements ({} params, atomic={})",
        defs.len(),
        params.len(),
        wrap_in_transaction
    );
    ComposedScript { script, params }
}

// ============================================================================
// Statement definitions for the helper operations
// ============================================================================

pub fn create_and_index_node(element: GraphElement) -> StatementDef {
    StatementDef::new(CREATE_AND_INDEX_NODE)
        .param(GRAPH_HANDLE)
        .bind("node_props", Value::Object(element.properties.clone()))
        .bind("fields_to_index", Value::Object(element.element_type.fields_to_index()))
        .with_binding(element)
}

pub fn create_and_index_edge(
    out_node: &NodeLookup,
    in_node: &NodeLookup,
    element: GraphElement,
) -> StatementDef {
    StatementDef::new(CREATE_AND_INDEX_EDGE)
        .param(GRAPH_HANDLE)
        .bind("out_node_lookup_info", out_node.to_value())
        .bind("in_node_lookup_info", in_node.to_value())
        .bind("edge_type", element.element_type.type_tag())
        .bind("edge_props", Value::Object(element.properties.clone()))
        .bind("fields_to_index", Value::Object(element.element_type.fields_to_index()))
        .with_binding(element)
}

fn node_query(operation: &str, unique_node_id: i64) -> StatementDef {
    StatementDef::new(operation)
        .param(GRAPH_HANDLE)
        .bind("node_unique_id", unique_node_id)
}

/// Workspace ID reached by following containment edges up from a node.
pub fn find_workspace_id(unique_node_id: i64) -> StatementDef {
    node_query(FIND_WORKSPACE_ID, unique_node_id)
}

/// User ID on the node's `CREATED_BY` edge.
pub fn find_creator_id(unique_node_id: i64) -> StatementDef {
    node_query(FIND_CREATOR_ID, unique_node_id)
}

pub fn count_replies(unique_node_id: i64) -> StatementDef {
    node_query(COUNT_REPLIES, unique_node_id)
}
