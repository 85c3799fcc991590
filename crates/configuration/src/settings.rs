use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// Contains parameters for the HTTP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// The socket address to bind (e.g., "0.0.0.0:3000").
    pub addr: SocketAddr,
    /// The maximum accepted request body, in bytes.
    pub body_limit_bytes: usize,
}

/// Contains parameters for the shared artifact/watchlist store.
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    /// The Postgres connection string. `None` is a supported configuration:
    /// lookups report the store as unconfigured and the watchlist falls back
    /// to its defaults.
    pub url: Option<String>,
    pub max_connections: u32,
    /// Upper bound for acquiring a connection and running an artifact lookup.
    pub lookup_timeout_ms: u64,
    /// Upper bound for acquiring a connection and running a watchlist call.
    pub watchlist_timeout_ms: u64,
}

impl DatabaseSettings {
    /// The connection string, if one is set and non-blank.
    pub fn connection_string(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.connection_string().is_some()
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn watchlist_timeout(&self) -> Duration {
        Duration::from_millis(self.watchlist_timeout_ms)
    }

    /// The pool-wide acquire timeout: the longer of the two call bounds, so
    /// neither service is cut short by the pool before its own deadline.
    pub fn acquire_timeout(&self) -> Duration {
        self.lookup_timeout().max(self.watchlist_timeout())
    }
}

// Connection strings carry credentials, so they never reach the logs.
impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.connection_string().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .field("lookup_timeout_ms", &self.lookup_timeout_ms)
            .field("watchlist_timeout_ms", &self.watchlist_timeout_ms)
            .finish()
    }
}

/// Contains parameters for the tracing subscriber.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<String>,
}
