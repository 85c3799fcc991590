//! An in-process store implementing the repository traits.
//!
//! It mirrors the Postgres semantics the services rely on (primary-key
//! conflicts, most-recent-first listing) and lets tests inject outages and
//! latency without a running database.

use crate::error::DbError;
use crate::repository::{
    check_publishable, ArtifactPublisher, ArtifactStore, StoredArtifact, WatchlistStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::WatchlistEntry;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    artifacts: Vec<StoredArtifact>,
    /// Most recent first.
    watchlist: Vec<WatchlistEntry>,
    watchlist_table: bool,
    failure: Option<String>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an artifact row directly, bypassing the primary key. Storing a
    /// second row for the same code simulates a corrupted table.
    pub fn insert_artifact_row(&self, code: &str, data: JsonValue, updated_at: DateTime<Utc>) {
        self.lock().artifacts.push(StoredArtifact {
            code: code.to_string(),
            data,
            updated_at,
        });
    }

    /// Makes every subsequent call fail as if the server refused connections.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    /// Delays every subsequent call by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Number of trait calls made against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that changed stored data.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn has_watchlist_table(&self) -> bool {
        self.lock().watchlist_table
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Common prologue of every call: count it, wait, then fail if an outage
    /// was injected.
    async fn enter(&self) -> Result<(), DbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failure.clone() {
            Some(message) => Err(DbError::ConnectionError(sqlx::Error::Io(
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message),
            ))),
            None => Ok(()),
        }
    }

    fn require_watchlist_table(state: &State) -> Result<(), DbError> {
        if state.watchlist_table {
            Ok(())
        } else {
            Err(DbError::ConnectionError(sqlx::Error::Protocol(
                "relation \"watchlist\" does not exist".to_string(),
            )))
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryRepository {
    async fn fetch_artifacts(&self, code: &str) -> Result<Vec<StoredArtifact>, DbError> {
        self.enter().await?;
        let state = self.lock();
        Ok(state
            .artifacts
            .iter()
            .filter(|row| row.code == code)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ArtifactPublisher for MemoryRepository {
    async fn ensure_artifact_table(&self) -> Result<(), DbError> {
        self.enter().await
    }

    async fn publish_artifact(
        &self,
        code: &str,
        data: &JsonValue,
    ) -> Result<DateTime<Utc>, DbError> {
        self.enter().await?;
        check_publishable(code, data)?;
        let updated_at = Utc::now();
        let mut state = self.lock();
        state.artifacts.retain(|row| row.code != code);
        state.artifacts.push(StoredArtifact {
            code: code.to_string(),
            data: data.clone(),
            updated_at,
        });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated_at)
    }
}

#[async_trait]
impl WatchlistStore for MemoryRepository {
    async fn ensure_watchlist_table(&self) -> Result<(), DbError> {
        self.enter().await?;
        self.lock().watchlist_table = true;
        Ok(())
    }

    async fn list_watchlist(&self) -> Result<Vec<WatchlistEntry>, DbError> {
        self.enter().await?;
        let state = self.lock();
        Self::require_watchlist_table(&state)?;
        Ok(state.watchlist.clone())
    }

    async fn add_watchlist_entry(&self, code: &str, name: Option<&str>) -> Result<bool, DbError> {
        self.enter().await?;
        let mut state = self.lock();
        Self::require_watchlist_table(&state)?;
        if state.watchlist.iter().any(|entry| entry.code == code) {
            return Ok(false);
        }
        state.watchlist.insert(
            0,
            WatchlistEntry {
                code: code.to_string(),
                name: name.map(str::to_string),
                added_at: Some(Utc::now()),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn remove_watchlist_entry(&self, code: &str) -> Result<bool, DbError> {
        self.enter().await?;
        let mut state = self.lock();
        Self::require_watchlist_table(&state)?;
        let before = state.watchlist.len();
        state.watchlist.retain(|entry| entry.code != code);
        let removed = state.watchlist.len() != before;
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn watchlist_requires_bootstrap() {
        let repo = MemoryRepository::new();
        assert!(repo.list_watchlist().await.is_err());

        repo.ensure_watchlist_table().await.unwrap();
        repo.ensure_watchlist_table().await.unwrap();
        assert!(repo.list_watchlist().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_ignores_conflicts_and_lists_newest_first() {
        let repo = MemoryRepository::new();
        repo.ensure_watchlist_table().await.unwrap();

        assert!(repo.add_watchlist_entry("300750", Some("宁德时代")).await.unwrap());
        assert!(repo.add_watchlist_entry("600519", Some("贵州茅台")).await.unwrap());
        assert!(!repo.add_watchlist_entry("300750", Some("renamed")).await.unwrap());

        let entries = repo.list_watchlist().await.unwrap();
        let pairs: Vec<(&str, Option<&str>)> = entries
            .iter()
            .map(|e| (e.code.as_str(), e.name.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![("600519", Some("贵州茅台")), ("300750", Some("宁德时代"))]
        );
        assert_eq!(repo.writes(), 2);
    }

    #[tokio::test]
    async fn publish_replaces_previous_artifact() {
        let repo = MemoryRepository::new();
        repo.publish_artifact("600519", &json!({"score": 55})).await.unwrap();
        repo.publish_artifact("600519", &json!({"score": 70})).await.unwrap();

        let rows = repo.fetch_artifacts("600519").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, json!({"score": 70}));
    }

    #[tokio::test]
    async fn injected_failure_applies_to_every_call() {
        let repo = MemoryRepository::new();
        repo.fail_with("connection refused");
        let err = repo.fetch_artifacts("600519").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));

        repo.recover();
        assert!(repo.fetch_artifacts("600519").await.unwrap().is_empty());
        assert_eq!(repo.calls(), 2);
    }
}
