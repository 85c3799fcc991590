use crate::error::DbError;
use configuration::DatabaseSettings;
use sqlx::{postgres::PgPoolOptions, PgPool};

fn pool_options(settings: &DatabaseSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout())
}

/// Creates the process-wide connection pool without touching the network.
///
/// Returns `Ok(None)` when no connection string is configured, which is a
/// supported deployment: callers degrade instead of failing. Connections are
/// opened on first use, so a database that is down at startup only affects
/// the requests that need it.
pub fn connect_lazy(settings: &DatabaseSettings) -> Result<Option<PgPool>, DbError> {
    let Some(url) = settings.connection_string() else {
        return Ok(None);
    };

    let pool = pool_options(settings)
        .connect_lazy(url)
        .map_err(|e| DbError::ConnectionConfigError(e.to_string()))?;

    Ok(Some(pool))
}

/// Establishes a connection pool and verifies it with a first connection.
///
/// Used by the one-shot commands (`migrate`, `publish`), where there is no
/// point in continuing without a database.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, DbError> {
    let url = settings.connection_string().ok_or_else(|| {
        DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string())
    })?;

    let pool = pool_options(settings).connect(url).await?;

    Ok(pool)
}

/// Applies the embedded migrations (`./migrations`).
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    // Use a relative path from the crate root
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
