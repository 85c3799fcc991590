use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The caller supplied no instrument code. No storage was touched.
    #[error("Code required")]
    MissingCode,

    /// The primary key on `artifacts` was violated.
    #[error("Artifact table holds {rows} rows for code {code}")]
    DuplicateArtifact { code: String, rows: usize },

    #[error("{0}")]
    MalformedArtifact(#[from] core_types::CoreError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Timed out after {}ms waiting for the database", .0.as_millis())]
    Timeout(Duration),
}

impl ServiceError {
    /// Errors that indicate a corrupted store rather than a bad request or an outage.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ServiceError::DuplicateArtifact { .. } | ServiceError::MalformedArtifact(_)
        )
    }
}
