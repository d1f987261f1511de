//! Webfinger protocol endpoints based on RFC 7033.
//!
//! Serves the documents kept by the endpoint store, plus host-meta for
//! clients that discover the webfinger template through XRD.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use fingerpost::query::QueryParams;
use fingerpost::webfinger::JRD_CONTENT_TYPE;
use tracing::debug;

use crate::AppState;

/// Handles webfinger requests from the endpoint store
async fn handle_webfinger(State(state): State<AppState>, uri: Uri) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let Some(mut jrd) = state.instance.lookup(target) else {
        debug!("Webfinger resource not found: {}", target);
        return (StatusCode::NOT_FOUND, "Resource not found").into_response();
    };

    // Filter relations if requested
    let params = QueryParams::from_request_target(target);
    jrd.filter_links(&params.all("rel"));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JRD_CONTENT_TYPE)],
        Json(jrd),
    )
        .into_response()
}

/// Get host-meta for XRD discovery
async fn get_host_meta(State(state): State<AppState>) -> Response {
    let config = &state.instance.config;
    let host = fingerpost::handle::full_domain(&config.domain, config.port);
    let host_meta = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">
  <Link rel="lrdd" type="{}" template="{}://{}/.well-known/webfinger?resource={{uri}}"/>
</XRD>"#,
        JRD_CONTENT_TYPE, config.scheme, host
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xrd+xml")],
        host_meta,
    )
        .into_response()
}

/// Creates a router for webfinger endpoints
pub fn webfinger_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/webfinger", get(handle_webfinger))
        .route("/.well-known/host-meta", get(get_host_meta))
}
