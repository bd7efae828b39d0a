//! Error taxonomy for the harness.
//!
//! Connection, provisioning and migration failures abort a scenario.
//! Teardown failures are only ever logged by the scenario driver.

use thiserror::Error;

/// Harness operation errors.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The database could not be reached or did not answer a ping
    #[error("Failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The container failed to start or never became ready
    #[error("Failed to provision database container: {message}")]
    Provisioning { message: String },

    /// The migration script failed
    #[error("Failed to execute migration on table '{table}': {source}")]
    Migration {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A verification query or write issued by the scenario failed
    #[error("Failed to {operation}: {source}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Observed data diverged from what the migration should have produced
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// A cleanup step failed
    #[error("Failed to tear down {resource}: {message}")]
    Teardown { resource: String, message: String },

    #[error(
        "Invalid table name '{0}': must start with a letter or underscore, contain only letters, numbers, underscores and dollar signs, and be at most 63 bytes"
    )]
    InvalidTableName(String),
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

impl HarnessError {
    pub(crate) fn provisioning(error: anyhow::Error) -> Self {
        HarnessError::Provisioning {
            message: format!("{:#}", error),
        }
    }

    pub(crate) fn query(operation: impl Into<String>, source: sqlx::Error) -> Self {
        HarnessError::Query {
            operation: operation.into(),
            source,
        }
    }
}
