//! Crate-level error type.

use thiserror::Error;
use trellis_config::ConfigError;

use crate::checker::AuthError;
use crate::graph::GraphStoreError;
use crate::logging::LoggingError;
use crate::privilege::PrivilegeError;
use crate::schema::SchemaError;
use crate::store::StoreError;
use crate::workflows::credentials::CredentialError;
use crate::workflows::invitations::InvitationError;

/// Errors surfaced by workflows and the mutation coordinator.
#[derive(Error, Debug)]
pub enum TrellisError {
    /// Relational store failure
    #[error("relational store error: {0}")]
    Store(#[from] StoreError),

    /// Graph store failure
    #[error("graph store error: {0}")]
    Graph(#[from] GraphStoreError),

    /// Element failed schema validation before submission
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Authorization failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    /// Referenced record does not exist
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// A unique name is already taken
    #[error("{entity} '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TrellisError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            name: name.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// True for an authorization denial (as opposed to a misconfigured action).
    pub fn is_insufficient_privileges(&self) -> bool {
        matches!(self, Self::Auth(AuthError::InsufficientPrivileges { .. }))
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;
