use crate::error::ServiceError;
use crate::policy::FailurePolicy;
use crate::bounded;
use configuration::DatabaseSettings;
use core_types::{ArtifactDocument, LookupOutcome, UnavailableReason};
use database::{ArtifactStore, DbError};
use std::sync::Arc;
use std::time::Duration;

/// Answers "is the artifact for this code ready, and if so what is it".
///
/// The service only reads. It never computes, enqueues or caches anything: a
/// missing artifact is reported as pending and left for the producer's next
/// batch run.
#[derive(Clone)]
pub struct LookupService {
    store: Option<Arc<dyn ArtifactStore>>,
    timeout: Duration,
}

impl LookupService {
    pub const FAILURE_POLICY: FailurePolicy = FailurePolicy::Surface;

    /// `store` is `None` when no connection string is configured.
    pub fn new(store: Option<Arc<dyn ArtifactStore>>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn from_settings(store: Option<Arc<dyn ArtifactStore>>, settings: &DatabaseSettings) -> Self {
        Self::new(store, settings.lookup_timeout())
    }

    /// Looks up the artifact for `code`.
    ///
    /// Returns `Err` only for a missing code or a store that breaks its own
    /// invariants. An unconfigured or unreachable store is an
    /// `Ok(LookupOutcome::Unavailable)`, not an error, and is never retried here.
    pub async fn lookup(&self, code: &str) -> Result<LookupOutcome, ServiceError> {
        if code.trim().is_empty() {
            return Err(ServiceError::MissingCode);
        }

        let Some(store) = self.store.as_ref() else {
            tracing::warn!(code, "Artifact lookup with no storage configured.");
            return Ok(LookupOutcome::Unavailable(UnavailableReason::NotConfigured));
        };

        let mut rows = match bounded(self.timeout, store.fetch_artifacts(code)).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(code, error = %err, "Artifact store unavailable.");
                return Ok(LookupOutcome::Unavailable(UnavailableReason::Store(
                    unavailable_detail(&err),
                )));
            }
        };

        match rows.len() {
            0 => {
                tracing::info!(code, "Artifact not computed yet; reporting pending.");
                Ok(LookupOutcome::pending())
            }
            1 => {
                let row = rows.remove(0);
                let document = ArtifactDocument::from_stored(&row.code, row.data, row.updated_at)
                    .inspect_err(|e| {
                        tracing::error!(code, error = %e, "Stored artifact is malformed.");
                    })?;
                tracing::debug!(code, updated_at = %row.updated_at, "Artifact ready.");
                Ok(LookupOutcome::Ready(document))
            }
            n => {
                tracing::error!(
                    code,
                    rows = n,
                    "Primary key violated on artifacts: more than one row for a single code."
                );
                Err(ServiceError::DuplicateArtifact {
                    code: code.to_string(),
                    rows: n,
                })
            }
        }
    }
}

/// The underlying message for an outage, without our own wrapping.
fn unavailable_detail(err: &ServiceError) -> String {
    match err {
        ServiceError::Database(DbError::ConnectionError(e)) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use database::MemoryRepository;
    use serde_json::json;

    fn service(repo: &Arc<MemoryRepository>) -> LookupService {
        LookupService::new(Some(repo.clone() as Arc<dyn ArtifactStore>), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn blank_code_is_a_client_error_without_io() {
        let repo = Arc::new(MemoryRepository::new());
        let err = service(&repo).lookup("  ").await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingCode));
        assert_eq!(repo.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_store_is_a_configuration_fault() {
        let outcome = LookupService::new(None, Duration::from_secs(1))
            .lookup("600519")
            .await
            .unwrap();
        assert_eq!(outcome, LookupOutcome::Unavailable(UnavailableReason::NotConfigured));
    }

    #[tokio::test]
    async fn outage_carries_underlying_message() {
        let repo = Arc::new(MemoryRepository::new());
        repo.fail_with("connection refused");

        match service(&repo).lookup("600519").await.unwrap() {
            LookupOutcome::Unavailable(UnavailableReason::Store(detail)) => {
                assert!(detail.contains("connection refused"), "{detail}");
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
        assert_eq!(repo.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_rows_are_an_invariant_violation() {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_artifact_row("600519", json!({}), Utc::now());
        repo.insert_artifact_row("600519", json!({}), Utc::now());

        let err = service(&repo).lookup("600519").await.unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(err, ServiceError::DuplicateArtifact { rows: 2, .. }));
    }

    #[tokio::test]
    async fn lookup_never_writes() {
        let repo = Arc::new(MemoryRepository::new());
        let svc = service(&repo);
        svc.lookup("000001").await.unwrap();
        repo.insert_artifact_row("000001", json!({"score": 60}), Utc::now());
        svc.lookup("000001").await.unwrap();
        assert_eq!(repo.writes(), 0);
    }
}
