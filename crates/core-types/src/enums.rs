use serde::{Deserialize, Serialize};
use std::fmt;

/// A watchlist mutation requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchlistAction {
    Add,
    Remove,
}

impl WatchlistAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchlistAction::Add => "add",
            WatchlistAction::Remove => "remove",
        }
    }
}

impl fmt::Display for WatchlistAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an artifact lookup could not reach the store.
///
/// `NotConfigured` is permanent until the process is redeployed with a
/// connection string; `Store` is transient and may succeed on a later attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    NotConfigured,
    Store(String),
}

impl UnavailableReason {
    pub fn is_transient(&self) -> bool {
        matches!(self, UnavailableReason::Store(_))
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotConfigured => f.write_str("storage not configured"),
            UnavailableReason::Store(detail) => write!(f, "database error: {}", detail),
        }
    }
}
