//! Graph Store Client
//!
//! The graph store holds the content topology: workspaces, users, categories,
//! write-ups and comments, linked by typed edges. Mutations reach it only as
//! composed scripts (see [`crate::statement`]); lookups go through named
//! exact-match or full-text indexes.

pub mod embedded;
pub mod rest;

use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use embedded::EmbeddedGraphStore;
pub use rest::RestGraphStore;

/// Property bag of a graph node or edge.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Leading text of the error a script engine reports when the helper library
/// is not loaded in the session.
pub const MISSING_HELPER_SIGNATURE: &str =
    "javax.script.ScriptException: groovy.lang.MissingPropertyException:";

/// Errors raised by a graph store.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    /// The script referenced the helper library before it was loaded
    #[error("helper library not loaded: {0}")]
    MissingHelper(String),

    /// The store rejected or failed to run the script
    #[error("graph store rejected script: {0}")]
    BadRequest(String),

    #[error("graph store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("graph store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid graph endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("unknown index: {0}")]
    UnknownIndex(String),

    #[error("no element in {index} with {key} = {value}")]
    LookupMiss {
        index: String,
        key: String,
        value: String,
    },

    #[error("script error at line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("unexpected graph store response: {0}")]
    UnexpectedResponse(String),

    #[error("failed to read helper library {path}: {source}")]
    LibraryFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphStoreError {
    /// Classify a script failure message, recognising the missing-helper signature.
    pub fn from_script_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.starts_with(MISSING_HELPER_SIGNATURE) {
            Self::MissingHelper(message)
        } else {
            Self::BadRequest(message)
        }
    }

    pub fn script(line: usize, message: impl Into<String>) -> Self {
        Self::Script {
            line,
            message: message.into(),
        }
    }

    pub fn is_missing_helper(&self) -> bool {
        matches!(self, Self::MissingHelper(_))
    }
}

/// Whether an index covers nodes or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Node,
    Edge,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Node => "node",
            IndexKind::Edge => "relationship",
        }
    }
}

/// Index configuration; absent means a plain exact-match index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub provider: String,
    #[serde(rename = "type")]
    pub index_type: String,
    pub to_lower_case: String,
}

impl IndexConfig {
    /// Lower-cased full-text index
    pub fn fulltext() -> Self {
        Self {
            provider: "lucene".to_string(),
            index_type: "fulltext".to_string(),
            to_lower_case: "true".to_string(),
        }
    }

    pub fn is_fulltext(&self) -> bool {
        self.index_type == "fulltext"
    }

    pub fn lowercases(&self) -> bool {
        self.to_lower_case == "true"
    }
}

/// Handle to a named index on a graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    pub kind: IndexKind,
    pub name: String,
    pub config: Option<IndexConfig>,
}

/// Graph store client.
pub trait GraphStore {
    /// Run a script with its parameter table; returns the script's value.
    fn submit_script(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError>;

    fn get_or_create_index(
        &self,
        kind: IndexKind,
        name: &str,
        config: Option<&IndexConfig>,
    ) -> Result<IndexHandle, GraphStoreError>;

    /// Property bags of the elements indexed under `field = value`.
    fn index_get(
        &self,
        index: &IndexHandle,
        field: &str,
        value: &Value,
    ) -> Result<Vec<PropertyMap>, GraphStoreError>;
}

impl<T: GraphStore + ?Sized> GraphStore for Rc<T> {
    fn submit_script(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError> {
        (**self).submit_script(script, params)
    }

    fn get_or_create_index(
        &self,
        kind: IndexKind,
        name: &str,
        config: Option<&IndexConfig>,
    ) -> Result<IndexHandle, GraphStoreError> {
        (**self).get_or_create_index(kind, name, config)
    }

    fn index_get(
        &self,
        index: &IndexHandle,
        field: &str,
        value: &Value,
    ) -> Result<Vec<PropertyMap>, GraphStoreError> {
        (**self).index_get(index, field, value)
    }
}

/// Render a property value the way indexes key it (numbers and strings alike).
pub fn index_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
