use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_types::UnavailableReason;
use serde_json::json;
use services::ServiceError;
use thiserror::Error;

/// Failures of the artifact endpoint. The watchlist endpoints never produce
/// one of these; they report problems inside a `200` body instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Code required")]
    MissingCode,
    #[error("Storage unavailable: {0}")]
    Unavailable(UnavailableReason),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingCode => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Code required" })),
            )
                .into_response(),
            AppError::Unavailable(reason) => {
                tracing::error!(reason = %reason, transient = reason.is_transient(), "Artifact store unavailable.");
                server_error(reason.to_string())
            }
            AppError::Service(ServiceError::MissingCode) => AppError::MissingCode.into_response(),
            AppError::Service(service_err) => {
                tracing::error!(error = ?service_err, "Artifact lookup failed.");
                server_error(service_err.to_string())
            }
        }
    }
}

fn server_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}
