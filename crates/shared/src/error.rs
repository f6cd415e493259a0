//! Error types shared across Crewdesk crates

use thiserror::Error;

/// Errors from the shared database layer. Each crate layers its own error
/// enum on top of this for domain failures.
#[derive(Debug, Error)]
pub enum CrewdeskError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
