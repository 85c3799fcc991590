use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use configuration::Settings;
use database::{ArtifactStore, DbRepository, WatchlistStore};
use services::{LookupService, WatchlistService};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub lookup: LookupService,
    pub watchlist: WatchlistService,
}

impl AppState {
    pub fn new(lookup: LookupService, watchlist: WatchlistService) -> Self {
        Self { lookup, watchlist }
    }

    /// Wires both services to the same repository (or to none when storage
    /// is not configured).
    pub fn from_repository(repo: Option<DbRepository>, settings: &Settings) -> Self {
        let repo = repo.map(Arc::new);
        let artifacts = repo.clone().map(|r| r as Arc<dyn ArtifactStore>);
        let watchlist = repo.map(|r| r as Arc<dyn WatchlistStore>);
        Self::new(
            LookupService::from_settings(artifacts, &settings.database),
            WatchlistService::from_settings(watchlist, &settings.database),
        )
    }
}

fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/artifact", get(handlers::get_artifact))
        .route(
            "/watchlist",
            get(handlers::list_watchlist).post(handlers::mutate_watchlist),
        )
}

/// Builds the application router. Every route is served both at the root
/// and under `/api`.
pub fn app(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit_bytes))
}

/// The main function to configure and run the web server.
///
/// The pool is created lazily, so a missing or unreachable database never
/// prevents startup; it is closed after the listener has drained.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let pool = database::connect_lazy(&settings.database)?;
    if pool.is_none() {
        tracing::warn!("DATABASE_URL is not set: lookups will report storage as unconfigured and the watchlist will serve defaults.");
    }
    let repo = pool.map(DbRepository::new);

    let app_state = Arc::new(AppState::from_repository(repo.clone(), &settings));
    let app = app(app_state, settings.server.body_limit_bytes);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server started and listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(repo) = repo {
        repo.close().await;
        tracing::info!("Database pool closed.");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received; draining connections.");
}
