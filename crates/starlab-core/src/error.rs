// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for starlab-core.
//!
//! Provides a unified error type with stable machine-readable codes that the
//! transport layer maps onto response statuses.

use thiserror::Error;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while processing a request against the engine.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Input validation failed.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Entity was not found.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind (scope, star, calc, user).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Caller identity is missing, invalid, expired, or revoked.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but lacks the role or ownership for the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource is in the wrong lifecycle state, or a uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// An external collaborator (object store, cache) failed.
    #[error("{service} error: {details}")]
    Dependency {
        /// Collaborator name.
        service: &'static str,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Dependency { .. } => "DEPENDENCY_ERROR",
        }
    }

    /// Whether this error comes from infrastructure rather than the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database { .. } | Self::Dependency { .. })
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn database(operation: &str, details: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.to_string(),
            details: details.into(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::Database {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
