use crate::bounded;
use crate::error::ServiceError;
use crate::policy::FailurePolicy;
use configuration::DatabaseSettings;
use core_types::{fallback_watchlist, WatchlistAction, WatchlistEntry};
use database::WatchlistStore;
use std::sync::Arc;
use std::time::Duration;

/// Why the fallback watchlist was served instead of stored entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    NotConfigured,
    Unavailable(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingSource {
    Store,
    Fallback(FallbackCause),
}

/// The entries to show, and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistListing {
    pub entries: Vec<WatchlistEntry>,
    pub source: ListingSource,
}

impl WatchlistListing {
    fn fallback(cause: FallbackCause) -> Self {
        Self {
            entries: fallback_watchlist(),
            source: ListingSource::Fallback(cause),
        }
    }
}

/// The result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// The full list after the mutation, most recent first.
    pub entries: Vec<WatchlistEntry>,
    /// `false` when no store is configured and the mutation was skipped.
    pub persisted: bool,
    /// Whether a row was actually inserted or deleted.
    pub changed: bool,
}

/// Lists and mutates the watchlist.
///
/// The watchlist is secondary UI furniture, so it favours availability:
/// listing never fails and a mutation without a configured store is a no-op.
/// Store errors during a mutation are still returned to the caller.
#[derive(Clone)]
pub struct WatchlistService {
    store: Option<Arc<dyn WatchlistStore>>,
    timeout: Duration,
}

impl WatchlistService {
    pub const FAILURE_POLICY: FailurePolicy = FailurePolicy::Degrade;

    /// `store` is `None` when no connection string is configured.
    pub fn new(store: Option<Arc<dyn WatchlistStore>>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn from_settings(store: Option<Arc<dyn WatchlistStore>>, settings: &DatabaseSettings) -> Self {
        Self::new(store, settings.watchlist_timeout())
    }

    /// Returns the stored entries, or the fallback list when the store is
    /// unconfigured, unreachable or empty.
    pub async fn list(&self) -> WatchlistListing {
        let Some(store) = self.store.as_ref() else {
            return WatchlistListing::fallback(FallbackCause::NotConfigured);
        };

        match self.read_all(store.as_ref()).await {
            Ok(entries) if entries.is_empty() => WatchlistListing::fallback(FallbackCause::Empty),
            Ok(entries) => WatchlistListing {
                entries,
                source: ListingSource::Store,
            },
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    policy = Self::FAILURE_POLICY.as_str(),
                    "Watchlist store unavailable; serving fallback list."
                );
                WatchlistListing::fallback(FallbackCause::Unavailable(err.to_string()))
            }
        }
    }

    /// Applies one add or remove and returns the updated list.
    ///
    /// Adding a code that is already present keeps the existing name; removing
    /// an absent code succeeds without change. Each action is a single
    /// statement, so a failure never leaves a partial change behind.
    pub async fn mutate(
        &self,
        action: WatchlistAction,
        code: &str,
        name: Option<&str>,
    ) -> Result<MutationOutcome, ServiceError> {
        if code.trim().is_empty() {
            return Err(ServiceError::MissingCode);
        }

        let Some(store) = self.store.as_ref() else {
            tracing::info!(
                %action,
                code,
                policy = Self::FAILURE_POLICY.as_str(),
                "No storage configured; watchlist mutation skipped."
            );
            return Ok(MutationOutcome {
                entries: fallback_watchlist(),
                persisted: false,
                changed: false,
            });
        };
        let store = store.as_ref();

        let result = async {
            bounded(self.timeout, store.ensure_watchlist_table()).await?;
            let changed = match action {
                WatchlistAction::Add => {
                    bounded(self.timeout, store.add_watchlist_entry(code, name)).await?
                }
                WatchlistAction::Remove => {
                    bounded(self.timeout, store.remove_watchlist_entry(code)).await?
                }
            };
            let entries = bounded(self.timeout, store.list_watchlist()).await?;
            Ok::<_, ServiceError>((changed, entries))
        }
        .await;

        match result {
            Ok((changed, entries)) => {
                tracing::info!(%action, code, changed, "Watchlist updated.");
                Ok(MutationOutcome {
                    entries,
                    persisted: true,
                    changed,
                })
            }
            Err(err) => {
                tracing::error!(%action, code, error = %err, "Watchlist mutation failed.");
                Err(err)
            }
        }
    }

    async fn read_all(&self, store: &dyn WatchlistStore) -> Result<Vec<WatchlistEntry>, ServiceError> {
        bounded(self.timeout, store.ensure_watchlist_table()).await?;
        bounded(self.timeout, store.list_watchlist()).await
    }
}
