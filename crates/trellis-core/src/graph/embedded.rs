//! In-process graph store.
//!
//! Holds the topology in a petgraph `StableGraph` and interprets the composed
//! scripts produced by [`crate::statement`]: one `result_<i> = op(args)` line
//! per statement, an optional atomic block, and a trailing `return [...]`.
//! Only the helper operations this system emits are understood.
//!
//! Like a real script engine session, the store remembers whether the helper
//! library has been loaded. A script that calls helpers without the library
//! inlined or previously loaded fails with the missing-helper signature.

use super::{
    index_key, GraphStore, GraphStoreError, IndexConfig, IndexHandle, IndexKind, PropertyMap,
    MISSING_HELPER_SIGNATURE,
};
use crate::schema::{
    edge_labels, NODE_TYPE_FIELD, UNIQUE_NODE_ID_FIELD, UNIQUE_NODE_ID_INDEX, USER_ID_FIELD,
    WORKSPACE_ID_FIELD, WORKSPACE_TYPE_TAG,
};
use once_cell::sync::Lazy;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use regex::Regex;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Name of the helper class every helper operation is qualified with.
pub const HELPER_CLASS: &str = "GraphHelpers";

const HELPER_CLASS_DECL: &str = "class GraphHelpers";

static STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(result_\d+)\s*=\s*([A-Za-z_][A-Za-z0-9_.]*)\((.*)\)\s*;?\s*$")
        .expect("statement pattern is valid")
});

static RETURN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*return\s*\[(.*)\]\s*;?\s*$").expect("return pattern is valid")
});

static ATOMIC_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*result\s*=\s*GraphHelpers\.execInTransaction\(g,\s*\{\s*->\s*$")
        .expect("atomic block pattern is valid")
});

static CAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\([A-Za-z_][A-Za-z0-9_.]*(?:\[\])?\)\s*(\S+)$").expect("cast pattern is valid")
});

/// Edge payload: label plus property bag.
#[derive(Debug, Clone)]
struct EdgeRecord {
    label: String,
    properties: PropertyMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementRef {
    Node(NodeIndex),
    Edge(EdgeIndex),
}

#[derive(Debug, Clone)]
struct GraphIndex {
    kind: IndexKind,
    config: Option<IndexConfig>,
    /// (field, key) -> indexed elements
    entries: HashMap<(String, String), Vec<ElementRef>>,
}

impl GraphIndex {
    fn new(kind: IndexKind, config: Option<IndexConfig>) -> Self {
        Self {
            kind,
            config,
            entries: HashMap::new(),
        }
    }

    fn normalize(&self, key: String) -> String {
        match &self.config {
            Some(config) if config.lowercases() => key.to_lowercase(),
            _ => key,
        }
    }

    fn put(&mut self, field: &str, value: &Value, element: ElementRef) {
        let key = self.normalize(index_key(value));
        let mut keys = vec![key.clone()];
        if self.config.as_ref().is_some_and(IndexConfig::is_fulltext) {
            keys.extend(
                key.split_whitespace()
                    .map(str::to_string)
                    .filter(|term| term != &key),
            );
        }
        for key in keys {
            let slot = self.entries.entry((field.to_string(), key)).or_default();
            if !slot.contains(&element) {
                slot.push(element);
            }
        }
    }

    fn get(&self, field: &str, value: &Value) -> Vec<ElementRef> {
        let key = self.normalize(index_key(value));
        self.entries
            .get(&(field.to_string(), key))
            .cloned()
            .unwrap_or_default()
    }

    fn purge(&mut self, element: ElementRef) {
        for slot in self.entries.values_mut() {
            slot.retain(|e| *e != element);
        }
        self.entries.retain(|_, slot| !slot.is_empty());
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    graph: StableGraph<PropertyMap, EdgeRecord>,
    indexes: HashMap<String, GraphIndex>,
}

/// One parsed `result_<i> = op(args)` line.
#[derive(Debug)]
struct Statement {
    line: usize,
    result_var: String,
    operation: String,
    args: Vec<String>,
}

#[derive(Debug, Default)]
struct Program {
    inline_library: bool,
    atomic: bool,
    statements: Vec<Statement>,
    returns: Vec<String>,
}

/// A resolved call argument.
#[derive(Debug)]
enum Arg {
    Graph,
    Value(Value),
}

/// In-process graph store backed by petgraph.
#[derive(Debug, Default)]
pub struct EmbeddedGraphStore {
    state: RefCell<GraphState>,
    helpers_loaded: Cell<bool>,
    scripts_submitted: Cell<usize>,
}

impl EmbeddedGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the helper library has been loaded into this session.
    pub fn helpers_loaded(&self) -> bool {
        self.helpers_loaded.get()
    }

    /// Number of scripts submitted so far, successful or not.
    pub fn scripts_submitted(&self) -> usize {
        self.scripts_submitted.get()
    }

    pub fn node_count(&self) -> usize {
        self.state.borrow().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.borrow().graph.edge_count()
    }

    /// Property bags of every node carrying the given type tag.
    pub fn nodes_of_type(&self, type_tag: &str) -> Vec<PropertyMap> {
        let state = self.state.borrow();
        state
            .graph
            .node_weights()
            .filter(|props| props.get(NODE_TYPE_FIELD).and_then(Value::as_str) == Some(type_tag))
            .cloned()
            .collect()
    }

    /// Outgoing edges of a node as `(label, target node properties)`.
    pub fn outgoing_edges(&self, unique_node_id: i64) -> Vec<(String, PropertyMap)> {
        let state = self.state.borrow();
        let Some(node) = node_by_unique_id(&state, unique_node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<(String, PropertyMap)> = state
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.weight().label.clone(), state.graph[e.target()].clone()))
            .collect();
        edges.sort_by(|a, b| a.0.cmp(&b.0));
        edges
    }

    /// Remove a node, its edges and their index entries.
    pub fn remove_node(&self, unique_node_id: i64) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(node) = node_by_unique_id(&state, unique_node_id) else {
            return false;
        };
        let edges: Vec<EdgeIndex> = state
            .graph
            .edges_directed(node, Direction::Outgoing)
            .chain(state.graph.edges_directed(node, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        for edge in edges {
            state.graph.remove_edge(edge);
            for index in state.indexes.values_mut() {
                index.purge(ElementRef::Edge(edge));
            }
        }
        state.graph.remove_node(node);
        for index in state.indexes.values_mut() {
            index.purge(ElementRef::Node(node));
        }
        true
    }

    fn missing_helper(&self) -> GraphStoreError {
        GraphStoreError::MissingHelper(format!(
            "{} No such property: {} for class: Script{}",
            MISSING_HELPER_SIGNATURE,
            HELPER_CLASS,
            self.scripts_submitted.get()
        ))
    }
}

impl GraphStore for EmbeddedGraphStore {
    fn submit_script(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError> {
        self.scripts_submitted.set(self.scripts_submitted.get() + 1);
        let program = parse_program(script)?;

        if program.inline_library && program.statements.is_empty() {
            debug!("Helper library loaded into embedded session");
            self.helpers_loaded.set(true);
            return Ok(Value::Null);
        }

        let uses_helpers = program.atomic
            || program
                .statements
                .iter()
                .any(|s| s.operation.starts_with(HELPER_CLASS));
        if uses_helpers && !program.inline_library && !self.helpers_loaded.get() {
            return Err(self.missing_helper());
        }

        if program.atomic {
            // Work on a copy and publish it only if every statement succeeds
            let mut working = self.state.borrow().clone();
            let value = run_program(&mut working, &program, params)?;
            *self.state.borrow_mut() = working;
            Ok(value)
        } else {
            let mut state = self.state.borrow_mut();
            run_program(&mut state, &program, params)
        }
    }

    fn get_or_create_index(
        &self,
        kind: IndexKind,
        name: &str,
        config: Option<&IndexConfig>,
    ) -> Result<IndexHandle, GraphStoreError> {
        let mut state = self.state.borrow_mut();
        let index = state
            .indexes
            .entry(name.to_string())
            .or_insert_with(|| GraphIndex::new(kind, config.cloned()));
        if index.kind != kind {
            return Err(GraphStoreError::BadRequest(format!(
                "index {} already exists for {} elements",
                name,
                index.kind.as_str()
            )));
        }
        Ok(IndexHandle {
            kind,
            name: name.to_string(),
            config: index.config.clone(),
        })
    }

    fn index_get(
        &self,
        index: &IndexHandle,
        field: &str,
        value: &Value,
    ) -> Result<Vec<PropertyMap>, GraphStoreError> {
        let state = self.state.borrow();
        let graph_index = state
            .indexes
            .get(&index.name)
            .ok_or_else(|| GraphStoreError::UnknownIndex(index.name.clone()))?;
        Ok(graph_index
            .get(field, value)
            .into_iter()
            .filter_map(|element| element_properties(&state, element))
            .collect())
    }
}

// ============================================================================
// Script parsing
// ============================================================================

fn parse_program(script: &str) -> Result<Program, GraphStoreError> {
    let mut program = Program {
        inline_library: script.contains(HELPER_CLASS_DECL),
        ..Default::default()
    };

    for (i, line) in script.lines().enumerate() {
        let line_no = i + 1;
        if ATOMIC_OPEN.is_match(line) {
            program.atomic = true;
        } else if let Some(caps) = STATEMENT.captures(line) {
            program.statements.push(Statement {
                line: line_no,
                result_var: caps[1].to_string(),
                operation: caps[2].to_string(),
                args: split_args(&caps[3]),
            });
        } else if let Some(caps) = RETURN.captures(line) {
            program.returns = split_args(&caps[1]);
        }
    }

    trace!(
        "Parsed script: {} statements, atomic={}, inline_library={}",
        program.statements.len(),
        program.atomic,
        program.inline_library
    );
    Ok(program)
}

fn split_args(args: &str) -> Vec<String> {
    args.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Execution
// ============================================================================

fn run_program(
    state: &mut GraphState,
    program: &Program,
    params: &PropertyMap,
) -> Result<Value, GraphStoreError> {
    let mut results: HashMap<&str, Value> = HashMap::new();

    for stmt in &program.statements {
        let args = stmt
            .args
            .iter()
            .map(|raw| resolve_arg(stmt.line, raw, params, &results))
            .collect::<Result<Vec<_>, _>>()?;
        let value = dispatch(state, stmt, args)?;
        trace!("{} = {} -> {}", stmt.result_var, stmt.operation, value);
        results.insert(stmt.result_var.as_str(), value);
    }

    let returned = program
        .returns
        .iter()
        .map(|name| {
            results
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| GraphStoreError::script(0, format!("undefined result {}", name)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(returned))
}

fn resolve_arg(
    line: usize,
    raw: &str,
    params: &PropertyMap,
    results: &HashMap<&str, Value>,
) -> Result<Arg, GraphStoreError> {
    let name = match CAST.captures(raw) {
        Some(caps) => caps.get(1).map_or(raw, |m| m.as_str()),
        None => raw,
    };
    if name == "g" {
        return Ok(Arg::Graph);
    }
    if let Some(value) = results.get(name) {
        return Ok(Arg::Value(value.clone()));
    }
    params
        .get(name)
        .cloned()
        .map(Arg::Value)
        .ok_or_else(|| GraphStoreError::script(line, format!("unbound parameter {}", name)))
}

fn dispatch(
    state: &mut GraphState,
    stmt: &Statement,
    args: Vec<Arg>,
) -> Result<Value, GraphStoreError> {
    let op = stmt
        .operation
        .strip_prefix(HELPER_CLASS)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(|| {
            GraphStoreError::script(stmt.line, format!("unknown operation {}", stmt.operation))
        })?;
    let line = stmt.line;

    match (op, args.as_slice()) {
        ("createAndIndexNode", [Arg::Graph, Arg::Value(Value::Object(props)), Arg::Value(Value::Object(fields))]) => {
            create_and_index_node(state, props, fields)
        }
        (
            "createAndIndexEdge",
            [Arg::Graph, Arg::Value(Value::Object(out_lookup)), Arg::Value(Value::Object(in_lookup)), Arg::Value(Value::String(label)), Arg::Value(Value::Object(props)), Arg::Value(Value::Object(fields))],
        ) => create_and_index_edge(state, line, out_lookup, in_lookup, label, props, fields),
        ("findWorkspaceId", [Arg::Graph, Arg::Value(id)]) => Ok(find_workspace_id(state, id)),
        ("findCreatorId", [Arg::Graph, Arg::Value(id)]) => Ok(find_creator_id(state, id)),
        ("countReplies", [Arg::Graph, Arg::Value(id)]) => Ok(Value::from(count_replies(state, id))),
        _ => Err(GraphStoreError::script(
            line,
            format!("no signature of {}.{} matches the arguments", HELPER_CLASS, op),
        )),
    }
}

fn ensure_index<'s>(
    state: &'s mut GraphState,
    name: &str,
    kind: IndexKind,
) -> &'s mut GraphIndex {
    state
        .indexes
        .entry(name.to_string())
        .or_insert_with(|| GraphIndex::new(kind, None))
}

fn index_fields(
    state: &mut GraphState,
    kind: IndexKind,
    element: ElementRef,
    props: &PropertyMap,
    fields_to_index: &PropertyMap,
) {
    for (index_name, fields) in fields_to_index {
        let index = ensure_index(state, index_name, kind);
        for field in fields.as_array().into_iter().flatten().filter_map(Value::as_str) {
            if let Some(value) = props.get(field).filter(|v| !v.is_null()) {
                index.put(field, value, element);
            }
        }
    }
}

fn create_and_index_node(
    state: &mut GraphState,
    props: &PropertyMap,
    fields_to_index: &PropertyMap,
) -> Result<Value, GraphStoreError> {
    let node = state.graph.add_node(props.clone());
    index_fields(state, IndexKind::Node, ElementRef::Node(node), props, fields_to_index);
    Ok(Value::Object(props.clone()))
}

fn lookup_node(
    state: &GraphState,
    line: usize,
    lookup: &PropertyMap,
) -> Result<NodeIndex, GraphStoreError> {
    let field_str = |key: &str| -> Result<String, GraphStoreError> {
        lookup
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GraphStoreError::script(line, format!("lookup info is missing {}", key)))
    };
    let index_name = field_str("lookupIndexName")?;
    let key = field_str("lookupKey")?;
    let value = lookup
        .get("lookupValue")
        .cloned()
        .ok_or_else(|| GraphStoreError::script(line, "lookup info is missing lookupValue"))?;

    let index = state
        .indexes
        .get(&index_name)
        .ok_or_else(|| GraphStoreError::UnknownIndex(index_name.clone()))?;
    index
        .get(&key, &value)
        .into_iter()
        .find_map(|element| match element {
            ElementRef::Node(n) if state.graph.contains_node(n) => Some(n),
            _ => None,
        })
        .ok_or_else(|| GraphStoreError::LookupMiss {
            index: index_name,
            key,
            value: index_key(&value),
        })
}

fn create_and_index_edge(
    state: &mut GraphState,
    line: usize,
    out_lookup: &PropertyMap,
    in_lookup: &PropertyMap,
    label: &str,
    props: &PropertyMap,
    fields_to_index: &PropertyMap,
) -> Result<Value, GraphStoreError> {
    let out_node = lookup_node(state, line, out_lookup)?;
    let in_node = lookup_node(state, line, in_lookup)?;
    let edge = state.graph.add_edge(
        out_node,
        in_node,
        EdgeRecord {
            label: label.to_string(),
            properties: props.clone(),
        },
    );
    index_fields(state, IndexKind::Edge, ElementRef::Edge(edge), props, fields_to_index);
    Ok(Value::Object(props.clone()))
}

fn node_by_unique_id(state: &GraphState, unique_node_id: impl Into<Value>) -> Option<NodeIndex> {
    let value = unique_node_id.into();
    state
        .indexes
        .get(UNIQUE_NODE_ID_INDEX)?
        .get(UNIQUE_NODE_ID_FIELD, &value)
        .into_iter()
        .find_map(|element| match element {
            ElementRef::Node(n) if state.graph.contains_node(n) => Some(n),
            _ => None,
        })
}

fn find_workspace_id(state: &GraphState, unique_node_id: &Value) -> Value {
    let mut current = node_by_unique_id(state, unique_node_id.clone());
    let mut seen = HashSet::new();
    while let Some(node) = current {
        if !seen.insert(node) {
            break;
        }
        let props = &state.graph[node];
        if props.get(NODE_TYPE_FIELD).and_then(Value::as_str) == Some(WORKSPACE_TYPE_TAG) {
            return props.get(WORKSPACE_ID_FIELD).cloned().unwrap_or(Value::Null);
        }
        current = state
            .graph
            .edges_directed(node, Direction::Outgoing)
            .find(|e| edge_labels::CONTAINMENT.contains(&e.weight().label.as_str()))
            .map(|e| e.target());
    }
    Value::Null
}

fn find_creator_id(state: &GraphState, unique_node_id: &Value) -> Value {
    node_by_unique_id(state, unique_node_id.clone())
        .and_then(|node| {
            state
                .graph
                .edges_directed(node, Direction::Outgoing)
                .find(|e| e.weight().label == edge_labels::CREATED_BY)
                .and_then(|e| e.weight().properties.get(USER_ID_FIELD).cloned())
        })
        .unwrap_or(Value::Null)
}

fn count_replies(state: &GraphState, unique_node_id: &Value) -> usize {
    node_by_unique_id(state, unique_node_id.clone())
        .map(|node| {
            state
                .graph
                .edges_directed(node, Direction::Incoming)
                .filter(|e| e.weight().label == edge_labels::HAS_PARENT_COMMENT)
                .count()
        })
        .unwrap_or(0)
}

fn element_properties(state: &GraphState, element: ElementRef) -> Option<PropertyMap> {
    match element {
        ElementRef::Node(n) => state.graph.node_weight(n).cloned(),
        ElementRef::Edge(e) => state.graph.edge_weight(e).map(|r| r.properties.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap()
    }

    fn node_script(atomic: bool) -> String {
        let body = "  result_0 = GraphHelpers.createAndIndexNode(g, node_props_0, fields_to_index_0)\n  return [result_0]";
        if atomic {
            format!(
                "result = GraphHelpers.execInTransaction(g, {{ -> \n{}\n}})",
                body
            )
        } else {
            body.to_string()
        }
    }

    fn node_params(id: i64) -> PropertyMap {
        obj(json!({
            "node_props_0": { "_TRL_NODE_TYPE": "USER", "_TRL_UNQ_NODE_ID": id, "_TRL_USER_ID": id * 10 },
            "fields_to_index_0": { "UNQ_NODE_ID_IDX": ["_TRL_UNQ_NODE_ID"], "USER_IDX": ["_TRL_USER_ID"] }
        }))
    }

    fn loaded_store() -> EmbeddedGraphStore {
        let store = EmbeddedGraphStore::new();
        store
            .submit_script("class GraphHelpers {\n}\n", &PropertyMap::new())
            .unwrap();
        store
    }

    #[test]
    fn test_helpers_required_before_use() {
        let store = EmbeddedGraphStore::new();
        let err = store
            .submit_script(&node_script(true), &node_params(1))
            .unwrap_err();
        assert!(err.is_missing_helper());
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_inline_library_runs_without_loading() {
        let store = EmbeddedGraphStore::new();
        let script = format!("class GraphHelpers {{\n}}\n\n{}", node_script(true));
        let result = store.submit_script(&script, &node_params(1)).unwrap();

        assert_eq!(result[0]["_TRL_UNQ_NODE_ID"], json!(1));
        assert_eq!(store.node_count(), 1);
        assert!(!store.helpers_loaded());
    }

    #[test]
    fn test_index_lookup_after_create() {
        let store = loaded_store();
        store.submit_script(&node_script(true), &node_params(5)).unwrap();

        let index = store
            .get_or_create_index(IndexKind::Node, "USER_IDX", None)
            .unwrap();
        let hits = store.index_get(&index, "_TRL_USER_ID", &json!("50")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["_TRL_UNQ_NODE_ID"], json!(5));
    }

    #[test]
    fn test_atomic_block_discards_partial_work() {
        let store = loaded_store();
        let script = "result = GraphHelpers.execInTransaction(g, { -> \n  result_0 = GraphHelpers.createAndIndexNode(g, node_props_0, fields_to_index_0)\n  result_1 = GraphHelpers.createAndIndexEdge(g, out_node_lookup_info_1, in_node_lookup_info_1, edge_type_1, edge_props_1, fields_to_index_1)\n  return [result_0, result_1]\n})";
        let mut params = node_params(1);
        params.extend(obj(json!({
            "out_node_lookup_info_1": { "lookupIndexName": "UNQ_NODE_ID_IDX", "lookupKey": "_TRL_UNQ_NODE_ID", "lookupValue": 1 },
            "in_node_lookup_info_1": { "lookupIndexName": "UNQ_NODE_ID_IDX", "lookupKey": "_TRL_UNQ_NODE_ID", "lookupValue": 999 },
            "edge_type_1": "CREATED_BY",
            "edge_props_1": { "_TRL_UNQ_EDGE_ID": 1 },
            "fields_to_index_1": { "UNQ_EDGE_ID_IDX": ["_TRL_UNQ_EDGE_ID"] }
        })));

        let err = store.submit_script(script, &params).unwrap_err();
        assert!(matches!(err, GraphStoreError::LookupMiss { .. }));
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_unwrapped_script_keeps_partial_work() {
        let store = loaded_store();
        let script = "  result_0 = GraphHelpers.createAndIndexNode(g, node_props_0, fields_to_index_0)\n  result_1 = GraphHelpers.countReplies(g, missing_1)\n  return [result_0, result_1]";
        let err = store.submit_script(script, &node_params(1)).unwrap_err();

        assert!(matches!(err, GraphStoreError::Script { line: 2, .. }));
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_cast_prefix_is_accepted() {
        let store = loaded_store();
        let script = "  result_0 = GraphHelpers.createAndIndexNode(g, (Map) node_props_0, fields_to_index_0)\n  return [result_0]";
        store.submit_script(script, &node_params(3)).unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_fulltext_index_matches_terms_case_insensitively() {
        let store = loaded_store();
        store
            .get_or_create_index(IndexKind::Node, "CATEGORY_IDX", Some(&IndexConfig::fulltext()))
            .unwrap();
        let params = obj(json!({
            "node_props_0": { "_TRL_NODE_TYPE": "CATEGORY", "_TRL_UNQ_NODE_ID": 8, "_TRL_CAT_NAME": "Soil Science", "_TRL_CAT_DESC": "dirt" },
            "fields_to_index_0": { "UNQ_NODE_ID_IDX": ["_TRL_UNQ_NODE_ID"], "CATEGORY_IDX": ["_TRL_CAT_NAME", "_TRL_CAT_DESC"] }
        }));
        store.submit_script(&node_script(true), &params).unwrap();

        let index = store
            .get_or_create_index(IndexKind::Node, "CATEGORY_IDX", None)
            .unwrap();
        assert!(index.config.is_some());
        assert_eq!(store.index_get(&index, "_TRL_CAT_NAME", &json!("SOIL")).unwrap().len(), 1);
        assert_eq!(
            store
                .index_get(&index, "_TRL_CAT_NAME", &json!("soil science"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_unknown_index_lookup() {
        let store = EmbeddedGraphStore::new();
        let handle = IndexHandle {
            kind: IndexKind::Node,
            name: "NOPE".to_string(),
            config: None,
        };
        assert!(matches!(
            store.index_get(&handle, "x", &json!(1)),
            Err(GraphStoreError::UnknownIndex(_))
        ));
    }

    #[test]
    fn test_remove_node_purges_indexes() {
        let store = loaded_store();
        store.submit_script(&node_script(true), &node_params(2)).unwrap();
        assert!(store.remove_node(2));
        assert!(!store.remove_node(2));

        let index = store
            .get_or_create_index(IndexKind::Node, "USER_IDX", None)
            .unwrap();
        assert!(store.index_get(&index, "_TRL_USER_ID", &json!(20)).unwrap().is_empty());
    }
}
