//! SQLite Schema Definitions for the Relational Store
//!
//! Identity, access control, invitations, sessions and the audit trail live
//! here. Timestamps are RFC 3339 UTC strings with microsecond precision, so
//! they compare correctly as text. Privilege sets are stored in their `{a,b}`
//! literal form.

use super::TableSpec;

/// Schema version recorded in `store_metadata`
pub const SCHEMA_VERSION: &str = "1.0";

/// Sequence backing unique graph node IDs
pub const UNIQUE_NODE_ID_SEQUENCE: &str = "unique_node_id";

/// Sequence backing unique graph edge IDs
pub const UNIQUE_EDGE_ID_SEQUENCE: &str = "unique_edge_id";

pub const USERS: TableSpec = TableSpec {
    name: "users",
    key_column: "user_id",
    sequence: Some("users_user_id_seq"),
};

pub const WORKSPACES: TableSpec = TableSpec {
    name: "workspaces",
    key_column: "workspace_id",
    sequence: Some("workspaces_workspace_id_seq"),
};

pub const WORKSPACE_ACCESS: TableSpec = TableSpec {
    name: "workspace_access",
    key_column: "workspace_access_id",
    sequence: Some("workspace_access_workspace_access_id_seq"),
};

pub const INSTANCE_INVITATIONS: TableSpec = TableSpec {
    name: "instance_invitations",
    key_column: "instance_invitation_id",
    sequence: Some("instance_invitations_instance_invitation_id_seq"),
};

pub const WORKSPACE_INVITATIONS: TableSpec = TableSpec {
    name: "workspace_invitations",
    key_column: "workspace_invitation_id",
    sequence: Some("workspace_invitations_workspace_invitation_id_seq"),
};

/// Session keys are generated tokens, not sequence values.
pub const SESSIONS: TableSpec = TableSpec {
    name: "sessions",
    key_column: "session_id",
    sequence: None,
};

pub const AUTH_EVENTS: TableSpec = TableSpec {
    name: "auth_events",
    key_column: "auth_event_id",
    sequence: Some("auth_events_auth_event_id_seq"),
};

pub const PASSWORD_CHANGE_AUDIT: TableSpec = TableSpec {
    name: "password_change_audit",
    key_column: "passwd_chg_id",
    sequence: Some("password_change_audit_passwd_chg_id_seq"),
};

pub const INSTANCE_PRIVILEGE_AUDIT: TableSpec = TableSpec {
    name: "instance_privilege_audit",
    key_column: "priv_chg_id",
    sequence: Some("instance_privilege_audit_priv_chg_id_seq"),
};

pub const WORKSPACE_AUDIT: TableSpec = TableSpec {
    name: "workspace_audit",
    key_column: "ws_audit_id",
    sequence: Some("workspace_audit_ws_audit_id_seq"),
};

/// Every sequence the schema relies on; registered at bootstrap.
pub const SEQUENCE_NAMES: &[&str] = &[
    UNIQUE_NODE_ID_SEQUENCE,
    UNIQUE_EDGE_ID_SEQUENCE,
    "users_user_id_seq",
    "workspaces_workspace_id_seq",
    "workspace_access_workspace_access_id_seq",
    "instance_invitations_instance_invitation_id_seq",
    "workspace_invitations_workspace_invitation_id_seq",
    "auth_events_auth_event_id_seq",
    "password_change_audit_passwd_chg_id_seq",
    "instance_privilege_audit_priv_chg_id_seq",
    "workspace_audit_ws_audit_id_seq",
];

/// SQL to create all tables
pub const SCHEMA_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- Named counters; incremented atomically, never reset
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY NOT NULL,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY NOT NULL,
    email_addr TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    encrypted_password TEXT NOT NULL,
    user_statement TEXT,
    is_enabled INTEGER NOT NULL,

    -- Instance privilege literal, e.g. {create_user,super}
    instance_privileges TEXT NOT NULL,

    creator INTEGER,
    creation_date TEXT NOT NULL,
    modifier INTEGER,
    modification_date TEXT
);

CREATE TABLE IF NOT EXISTS workspaces (
    workspace_id INTEGER PRIMARY KEY NOT NULL,
    workspace_name TEXT NOT NULL UNIQUE,
    workspace_description TEXT,
    creator INTEGER,
    creation_date TEXT NOT NULL,
    modifier INTEGER,
    modification_date TEXT
);

CREATE TABLE IF NOT EXISTS workspace_access (
    workspace_access_id INTEGER PRIMARY KEY NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(user_id),
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id),
    is_enabled INTEGER NOT NULL,

    -- Workspace privilege literal, e.g. {contributor,admin}
    workspace_privileges TEXT NOT NULL,

    invitation_id INTEGER,
    creator INTEGER,
    creation_date TEXT NOT NULL,
    modifier INTEGER,
    modification_date TEXT,

    UNIQUE(user_id, workspace_id)
);

CREATE TABLE IF NOT EXISTS instance_invitations (
    instance_invitation_id INTEGER PRIMARY KEY NOT NULL,
    instance_invitation_code TEXT NOT NULL UNIQUE,
    invitee_email_addr TEXT NOT NULL,
    initial_instance_privileges TEXT NOT NULL,
    invitation_msg TEXT,
    creator INTEGER,
    creation_date TEXT NOT NULL,
    decision_date TEXT,
    was_accepted INTEGER,
    new_user_id INTEGER
);

CREATE TABLE IF NOT EXISTS workspace_invitations (
    workspace_invitation_id INTEGER PRIMARY KEY NOT NULL,
    workspace_invitation_code TEXT NOT NULL UNIQUE,
    invitee_email_addr TEXT NOT NULL,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(workspace_id),
    initial_workspace_privileges TEXT NOT NULL,
    invitation_msg TEXT,
    creator INTEGER,
    creation_date TEXT NOT NULL,
    decision_date TEXT,
    was_accepted INTEGER,
    user_id INTEGER
);

CREATE TABLE IF NOT EXISTS sessions (
    -- "<user_id>,<random token>"
    session_id TEXT PRIMARY KEY NOT NULL,
    user_id INTEGER NOT NULL,
    creation_date TEXT NOT NULL,
    last_visit TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auth_events (
    auth_event_id INTEGER PRIMARY KEY NOT NULL,
    user_id INTEGER NOT NULL,
    auth_event TEXT NOT NULL,
    auth_event_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS password_change_audit (
    passwd_chg_id INTEGER PRIMARY KEY NOT NULL,
    updated_user INTEGER NOT NULL,
    updating_user INTEGER,
    passwd_chg_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instance_privilege_audit (
    priv_chg_id INTEGER PRIMARY KEY NOT NULL,
    updated_user INTEGER NOT NULL,
    updating_user INTEGER,
    is_enabled INTEGER NOT NULL,
    new_privileges TEXT NOT NULL,
    priv_chg_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workspace_audit (
    ws_audit_id INTEGER PRIMARY KEY NOT NULL,
    workspace_id INTEGER NOT NULL,
    acting_user INTEGER,
    audit_event TEXT NOT NULL,
    audit_date TEXT NOT NULL
);
"#;

/// SQL to create indexes for the common lookups
pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_access_workspace ON workspace_access(workspace_id);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_auth_events_user_date ON auth_events(user_id, auth_event, auth_event_date);
CREATE INDEX IF NOT EXISTS idx_passwd_audit_user ON password_change_audit(updated_user);
CREATE INDEX IF NOT EXISTS idx_priv_audit_user ON instance_privilege_audit(updated_user);
CREATE INDEX IF NOT EXISTS idx_ws_audit_workspace ON workspace_audit(workspace_id);
CREATE INDEX IF NOT EXISTS idx_ws_invitations_workspace ON workspace_invitations(workspace_id);
"#;
