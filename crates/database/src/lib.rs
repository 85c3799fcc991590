//! # StockAI Database Crate
//!
//! This crate is the application-specific interface to the PostgreSQL store
//! shared with the batch producer.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** All SQL lives here. The rest of the application talks to the
//!   repository traits (`ArtifactStore`, `ArtifactPublisher`, `WatchlistStore`)
//!   and never sees a query.
//! - **Pooled:** One `PgPool` is created at process start and closed at
//!   shutdown. Each call checks a connection out and hands it back when the
//!   query future completes or is dropped.
//! - **Swappable:** `MemoryRepository` implements the same traits in-process
//!   for tests. It is only compiled for this crate's tests or with the
//!   `test-utils` feature.
//!
//! ## Public API
//!
//! - `connect_lazy` / `connect`: pool construction from `DatabaseSettings`.
//! - `run_migrations`: applies the embedded schema.
//! - `DbRepository`: the Postgres implementation of every repository trait.
//! - `DbError`: the error type returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, connect_lazy, run_migrations};
pub use error::DbError;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRepository;
pub use repository::{
    ArtifactPublisher, ArtifactStore, DbRepository, StoredArtifact, WatchlistStore,
};
