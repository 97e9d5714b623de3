//! Relational Store Client
//!
//! The relational store is the source of truth for identity, sequence-generated
//! IDs and audit trails. This module defines the client contract used by every
//! workflow (parameterized insert/update/delete/query plus scoped transactions)
//! and the explicit context struct that bundles both stores for one call.

pub mod schema;
pub mod sqlite;

use crate::executor::StatementExecutor;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use trellis_config::SecurityConfig;

pub use sqlite::SqliteStore;

/// A relational row: column name to JSON-typed value.
pub type Row = serde_json::Map<String, Value>;

/// Errors raised by the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported value for column '{column}': {value}")]
    UnsupportedValue { column: String, value: String },

    #[error("No transaction is open")]
    NoTransaction,

    #[error("Row in '{table}' has a missing or malformed '{field}' column")]
    MalformedRow { table: String, field: String },
}

impl StoreError {
    pub fn malformed(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MalformedRow {
            table: table.into(),
            field: field.into(),
        }
    }
}

/// Static description of a relational table the workflows write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    /// Primary key column
    pub key_column: &'static str,
    /// Sequence that populates `key_column`, if the key is sequence-generated
    pub sequence: Option<&'static str>,
}

/// Generic relational store client.
///
/// Filters are equality conjunctions over the given columns. `query` takes raw
/// SQL with `:name` placeholders; keys of `params` that the statement does not
/// reference are ignored.
pub trait RelationalStore {
    /// Atomically increment and return the named sequence.
    fn next_sequence_value(&self, sequence: &str) -> Result<i64, StoreError>;

    /// Insert a row, populating the key from the table's sequence when it has one.
    ///
    /// Returns the primary key for sequence-keyed tables, otherwise the rowid.
    fn insert(&self, table: &TableSpec, fields: &Row) -> Result<i64, StoreError>;

    fn update(&self, table: &str, filter: &Row, fields: &Row) -> Result<usize, StoreError>;

    fn delete(&self, table: &str, filter: &Row) -> Result<usize, StoreError>;

    fn select(
        &self,
        table: &str,
        filter: &Row,
        order_by: Option<&str>,
    ) -> Result<Vec<Row>, StoreError>;

    fn query(&self, sql: &str, params: &Row) -> Result<Vec<Row>, StoreError>;

    fn execute(&self, sql: &str, params: &Row) -> Result<usize, StoreError>;

    /// Open a transaction scope. Scopes nest.
    fn begin(&self) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;
}

/// Scoped relational transaction.
///
/// Rolls back on drop unless [`Transaction::commit`] was called, so any early
/// return through `?` leaves the store untouched.
pub struct Transaction<'a> {
    store: &'a dyn RelationalStore,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn RelationalStore) -> Result<Self, StoreError> {
        store.begin()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.store.commit()
    }

    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.store.rollback()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.store.rollback() {
                warn!("Failed to roll back relational transaction: {}", e);
            }
        }
    }
}

/// Run `f` inside a transaction scope, committing only if it succeeds.
pub fn with_transaction<T, E>(
    store: &dyn RelationalStore,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let tx = Transaction::begin(store)?;
    let value = f()?;
    tx.commit()?;
    Ok(value)
}

/// Both store handles plus the policy values workflows consult.
///
/// Passed explicitly to every workflow, predicate and coordinator call.
#[derive(Clone, Copy)]
pub struct StoreContext<'a> {
    pub relational: &'a dyn RelationalStore,
    pub graph: &'a StatementExecutor,
    pub security: &'a SecurityConfig,
}

impl<'a> StoreContext<'a> {
    pub fn new(
        relational: &'a dyn RelationalStore,
        graph: &'a StatementExecutor,
        security: &'a SecurityConfig,
    ) -> Self {
        Self {
            relational,
            graph,
            security,
        }
    }
}

// ============================================================================
// Row builders and accessors
// ============================================================================

/// Build a [`Row`] from `(column, value)` pairs.
#[macro_export]
macro_rules! row {
    () => { $crate::store::Row::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::store::Row::new();
        $( row.insert(($key).to_string(), ::serde_json::json!($value)); )+
        row
    }};
}

pub(crate) fn get_i64(row: &Row, table: &str, field: &str) -> Result<i64, StoreError> {
    row.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| StoreError::malformed(table, field))
}

pub(crate) fn get_opt_i64(row: &Row, field: &str) -> Option<i64> {
    row.get(field).and_then(Value::as_i64)
}

pub(crate) fn get_str(row: &Row, table: &str, field: &str) -> Result<String, StoreError> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::malformed(table, field))
}

pub(crate) fn get_opt_str(row: &Row, field: &str) -> Option<String> {
    row.get(field).and_then(Value::as_str).map(str::to_string)
}

/// SQLite has no boolean type; accept both JSON booleans and 0/1 integers.
pub(crate) fn get_opt_bool(row: &Row, field: &str) -> Option<bool> {
    match row.get(field) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

pub(crate) fn get_bool(row: &Row, table: &str, field: &str) -> Result<bool, StoreError> {
    get_opt_bool(row, field).ok_or_else(|| StoreError::malformed(table, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_macro() {
        let row = row! { "user_id" => 7, "username" => "ada", "is_enabled" => true };
        assert_eq!(get_i64(&row, "users", "user_id").unwrap(), 7);
        assert_eq!(get_str(&row, "users", "username").unwrap(), "ada");
        assert!(get_bool(&row, "users", "is_enabled").unwrap());
    }

    #[test]
    fn test_integer_booleans() {
        let row = row! { "flag" => 0, "other" => 1 };
        assert_eq!(get_opt_bool(&row, "flag"), Some(false));
        assert_eq!(get_opt_bool(&row, "other"), Some(true));
        assert_eq!(get_opt_bool(&row, "missing"), None);
    }

    #[test]
    fn test_malformed_row_error() {
        let row = row! { "user_id" => "not a number" };
        let err = get_i64(&row, "users", "user_id").unwrap_err();
        assert!(err.to_string().contains("user_id"));
    }
}
