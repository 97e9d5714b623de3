//! SQLite implementation of the relational store.
//!
//! Wraps a single rusqlite connection. Rows cross the boundary as JSON maps;
//! booleans are stored as 0/1 and structured values as JSON text. Nested
//! transaction scopes map onto SAVEPOINTs.

use super::schema::{SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_TABLES, SCHEMA_VERSION, SEQUENCE_NAMES};
use super::{RelationalStore, Row, StoreError, TableSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, ToSql};
use serde_json::{Number, Value};
use std::cell::Cell;
use std::path::Path;
use tracing::{debug, trace};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Order clauses accepted by `select`: a column optionally followed by a direction.
static ORDER_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*( (?i:asc|desc))?$").expect("order pattern is valid")
});

/// A connection to the relational SQLite database
pub struct SqliteStore {
    conn: Connection,
    /// Number of open transaction scopes
    depth: Cell<usize>,
}

impl SqliteStore {
    /// Open (or create) a database file and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn, true)?;
        let store = Self {
            conn,
            depth: Cell::new(0),
        };
        store.bootstrap()?;
        debug!("Opened relational store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn, false)?;
        let store = Self {
            conn,
            depth: Cell::new(0),
        };
        store.bootstrap()?;
        Ok(store)
    }

    /// Open the configured store. Relative paths resolve against `root`.
    pub fn from_config(
        config: &trellis_config::TrellisConfig,
        root: &Path,
    ) -> Result<Self, StoreError> {
        if config.relational.in_memory {
            Self::in_memory()
        } else {
            Self::open(&config.relational_path(root))
        }
    }

    fn configure_connection(conn: &Connection, on_disk: bool) -> SqliteResult<()> {
        if on_disk {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    fn bootstrap(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_CREATE_TABLES)?;
        self.conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        for name in SEQUENCE_NAMES {
            self.create_sequence(name)?;
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Register a sequence starting at zero (the first value handed out is 1).
    pub fn create_sequence(&self, name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sequences (name, value) VALUES (?1, 0)",
            params![name],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<String>, StoreError> {
        let version = self
            .conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Current transaction nesting depth.
    pub fn transaction_depth(&self) -> usize {
        self.depth.get()
    }

    fn savepoint_name(depth: usize) -> String {
        format!("trellis_sp_{}", depth)
    }

    fn run_rows(
        &self,
        sql: &str,
        bindings: &[(String, SqlValue)],
    ) -> Result<Vec<Row>, StoreError> {
        trace!("query: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let bound = bind_present(&stmt, bindings)?;
        let params: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let mut rows = stmt.query(params.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in names.iter().enumerate() {
                map.insert(name.clone(), sql_to_json(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    fn run_execute(&self, sql: &str, bindings: &[(String, SqlValue)]) -> Result<usize, StoreError> {
        trace!("execute: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let bound = bind_present(&stmt, bindings)?;
        let params: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        Ok(stmt.execute(params.as_slice())?)
    }
}

impl RelationalStore for SqliteStore {
    fn next_sequence_value(&self, sequence: &str) -> Result<i64, StoreError> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "UPDATE sequences SET value = value + 1 WHERE name = ?1 RETURNING value",
                params![sequence],
                |row| row.get(0),
            )
            .optional()?;
        value.ok_or_else(|| StoreError::UnknownSequence(sequence.to_string()))
    }

    fn insert(&self, table: &TableSpec, fields: &Row) -> Result<i64, StoreError> {
        check_identifier(table.name)?;
        let mut fields = fields.clone();
        let key = match table.sequence {
            Some(sequence) => {
                let key = self.next_sequence_value(sequence)?;
                fields.insert(table.key_column.to_string(), Value::from(key));
                Some(key)
            }
            None => None,
        };

        let mut columns = Vec::with_capacity(fields.len());
        let mut bindings = Vec::with_capacity(fields.len());
        for (column, value) in &fields {
            check_identifier(column)?;
            columns.push(column.as_str());
            bindings.push((format!(":{}", column), json_to_sql(column, value)?));
        }
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{}", c)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.run_execute(&sql, &bindings)?;

        Ok(key.unwrap_or_else(|| self.conn.last_insert_rowid()))
    }

    fn update(&self, table: &str, filter: &Row, fields: &Row) -> Result<usize, StoreError> {
        check_identifier(table)?;
        if fields.is_empty() {
            return Ok(0);
        }
        let mut bindings = Vec::new();
        let mut assignments = Vec::with_capacity(fields.len());
        for (column, value) in fields {
            check_identifier(column)?;
            assignments.push(format!("{} = :set_{}", column, column));
            bindings.push((format!(":set_{}", column), json_to_sql(column, value)?));
        }
        let where_clause = render_filter(filter, &mut bindings)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            table,
            assignments.join(", "),
            where_clause
        );
        self.run_execute(&sql, &bindings)
    }

    fn delete(&self, table: &str, filter: &Row) -> Result<usize, StoreError> {
        check_identifier(table)?;
        let mut bindings = Vec::new();
        let where_clause = render_filter(filter, &mut bindings)?;
        let sql = format!("DELETE FROM {}{}", table, where_clause);
        self.run_execute(&sql, &bindings)
    }

    fn select(
        &self,
        table: &str,
        filter: &Row,
        order_by: Option<&str>,
    ) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        let mut bindings = Vec::new();
        let where_clause = render_filter(filter, &mut bindings)?;
        let order_clause = match order_by {
            Some(order) if ORDER_CLAUSE.is_match(order) => format!(" ORDER BY {}", order),
            Some(order) => return Err(StoreError::InvalidIdentifier(order.to_string())),
            None => String::new(),
        };
        let sql = format!("SELECT * FROM {}{}{}", table, where_clause, order_clause);
        self.run_rows(&sql, &bindings)
    }

    fn query(&self, sql: &str, params: &Row) -> Result<Vec<Row>, StoreError> {
        let bindings = named_bindings(params)?;
        self.run_rows(sql, &bindings)
    }

    fn execute(&self, sql: &str, params: &Row) -> Result<usize, StoreError> {
        let bindings = named_bindings(params)?;
        self.run_execute(sql, &bindings)
    }

    fn begin(&self) -> Result<(), StoreError> {
        let depth = self.depth.get();
        if depth == 0 {
            self.conn.execute_batch("BEGIN")?;
        } else {
            self.conn
                .execute_batch(&format!("SAVEPOINT {}", Self::savepoint_name(depth)))?;
        }
        self.depth.set(depth + 1);
        trace!("Opened transaction scope (depth {})", depth + 1);
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let depth = self.depth.get();
        if depth == 0 {
            return Err(StoreError::NoTransaction);
        }
        let inner = depth - 1;
        if inner == 0 {
            self.conn.execute_batch("COMMIT")?;
        } else {
            self.conn
                .execute_batch(&format!("RELEASE {}", Self::savepoint_name(inner)))?;
        }
        self.depth.set(inner);
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let depth = self.depth.get();
        if depth == 0 {
            return Err(StoreError::NoTransaction);
        }
        let inner = depth - 1;
        // Leave the depth consistent even if SQLite refuses the rollback
        self.depth.set(inner);
        if inner == 0 {
            self.conn.execute_batch("ROLLBACK")?;
        } else {
            let name = Self::savepoint_name(inner);
            self.conn
                .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        }
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), StoreError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn render_filter(
    filter: &Row,
    bindings: &mut Vec<(String, SqlValue)>,
) -> Result<String, StoreError> {
    if filter.is_empty() {
        return Ok(String::new());
    }
    let mut clauses = Vec::with_capacity(filter.len());
    for (column, value) in filter {
        check_identifier(column)?;
        if value.is_null() {
            clauses.push(format!("{} IS NULL", column));
        } else {
            clauses.push(format!("{} = :where_{}", column, column));
            bindings.push((format!(":where_{}", column), json_to_sql(column, value)?));
        }
    }
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

fn named_bindings(params: &Row) -> Result<Vec<(String, SqlValue)>, StoreError> {
    params
        .iter()
        .map(|(name, value)| Ok((format!(":{}", name), json_to_sql(name, value)?)))
        .collect()
}

/// Keep only the bindings the prepared statement actually references.
fn bind_present<'b>(
    stmt: &rusqlite::Statement<'_>,
    bindings: &'b [(String, SqlValue)],
) -> Result<Vec<&'b (String, SqlValue)>, StoreError> {
    let mut present = Vec::with_capacity(bindings.len());
    for binding in bindings {
        if stmt.parameter_index(&binding.0)?.is_some() {
            present.push(binding);
        }
    }
    Ok(present)
}

fn json_to_sql(column: &str, value: &Value) -> Result<SqlValue, StoreError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                return Err(StoreError::UnsupportedValue {
                    column: column.to_string(),
                    value: n.to_string(),
                });
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(serde_json::to_string(value)?),
    })
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}
