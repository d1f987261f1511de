//! JSON API for resolving remote handles and resyncing local endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fingerpost::ResolveError;
use fingerpost::webfinger::JrdResource;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::AppState;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::BadHandle(_) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub handle: String,
}

/// Resolve a remote handle to its webfinger document
async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<JrdResource>, ApiError> {
    let jrd = state.instance.resolve(&query.handle).await?;
    Ok(Json(jrd))
}

/// Reconcile a local account's webfinger endpoint with its profile
async fn resync(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if nickname.is_empty() || nickname.contains(['/', '@']) {
        return Err(ApiError::BadRequest(format!("Invalid nickname: {}", nickname)));
    }
    let changed = state.instance.resync(&nickname);
    Ok(Json(json!({ "changed": changed })))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/resolve", get(resolve))
        .route("/api/v1/accounts/{nickname}/webfinger/resync", post(resync))
}
