//! Prometheus scrape endpoint

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// GET /metrics
///
/// Every `clanhall_*` series in the text exposition format.
async fn scrape() -> Response {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&families, &mut buffer) {
        tracing::error!(%error, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Router exposing `/metrics`, mergeable into any state
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
