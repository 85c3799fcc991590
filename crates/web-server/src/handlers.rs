use crate::{error::AppError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use core_types::{LookupOutcome, WatchlistAction, WatchlistEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::{ListingSource, WatchlistService};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ArtifactQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MutateRequest {
    pub action: WatchlistAction,
    #[serde(default)]
    pub code: String,
    pub name: Option<String>,
}

/// Body of every watchlist response. The status code is always `200`; a
/// failed mutation is signalled by `error` instead of `data`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WatchlistReply {
    Data { data: Vec<WatchlistEntry> },
    Error { error: String },
}

impl IntoResponse for WatchlistReply {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// # GET /artifact?code=<code>
/// Returns the artifact if the producer has written it, or a pending notice.
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, AppError> {
    let code = query.code.unwrap_or_default();
    if code.trim().is_empty() {
        return Err(AppError::MissingCode);
    }

    match state.lookup.lookup(&code).await? {
        LookupOutcome::Ready(document) => Ok(Json(document).into_response()),
        LookupOutcome::Pending { message } => {
            Ok(Json(json!({ "status": "pending", "message": message })).into_response())
        }
        LookupOutcome::Unavailable(reason) => Err(AppError::Unavailable(reason)),
    }
}

/// # GET /watchlist
/// Lists the watchlist, falling back to the default entries on any storage problem.
pub async fn list_watchlist(State(state): State<Arc<AppState>>) -> WatchlistReply {
    let listing = state.watchlist.list().await;
    if let ListingSource::Fallback(cause) = &listing.source {
        tracing::debug!(
            cause = ?cause,
            policy = WatchlistService::FAILURE_POLICY.as_str(),
            "Serving fallback watchlist."
        );
    }
    WatchlistReply::Data {
        data: listing.entries,
    }
}

/// # POST /watchlist
/// Adds or removes one entry and returns the updated list.
pub async fn mutate_watchlist(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MutateRequest>, JsonRejection>,
) -> WatchlistReply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed watchlist mutation.");
            return WatchlistReply::Error {
                error: rejection.body_text(),
            };
        }
    };

    match state
        .watchlist
        .mutate(request.action, &request.code, request.name.as_deref())
        .await
    {
        Ok(outcome) => WatchlistReply::Data {
            data: outcome.entries,
        },
        Err(err) => WatchlistReply::Error {
            error: err.to_string(),
        },
    }
}
