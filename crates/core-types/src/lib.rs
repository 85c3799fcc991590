pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{UnavailableReason, WatchlistAction};
pub use error::CoreError;
pub use structs::{
    fallback_watchlist, ArtifactDocument, LookupOutcome, NewsItem, WatchlistEntry,
    FALLBACK_WATCHLIST, PENDING_MESSAGE,
};
