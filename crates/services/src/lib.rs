//! Request-level services over the repository traits.
//!
//! `LookupService` answers whether an artifact is ready; `WatchlistService`
//! lists and mutates the watchlist. Neither holds state between calls beyond
//! its store handle, and every store call is bounded by a timeout.

use database::DbError;
use std::future::Future;
use std::time::Duration;

pub mod error;
pub mod lookup;
pub mod policy;
pub mod watchlist;

pub use error::ServiceError;
pub use lookup::LookupService;
pub use policy::FailurePolicy;
pub use watchlist::{FallbackCause, ListingSource, MutationOutcome, WatchlistListing, WatchlistService};

/// Runs a store call under `limit`. A call that overruns is dropped, which
/// returns its connection to the pool.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}
