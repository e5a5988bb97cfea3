//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Bad input; nothing was written.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Stage-gating violation; nothing was written.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The token or endorsement was already consumed.
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// A mail delivery attempt was made and failed.
    #[error("Mail transport failure: {0}")]
    TransportFailure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "validation_failed",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::NotFound(_) => "not_found",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::TransportFailure(_) => "transport_failure",
            Self::Database(_) => "database_error",
            Self::Migrate(_) => "migration_error",
            Self::Json(_) => "json_error",
            Self::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
