//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `<path>`   : metrics scrape (default `/metrics`), text or OpenMetrics

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use rtmetrics_core::expo::{self, Format};

use crate::app_state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let _permit = match state.scrape_permit() {
        Ok(p) => p,
        Err(_) => {
            state.metrics().record_status(503);
            tracing::warn!("scrape rejected: too many requests in flight");
            return (StatusCode::SERVICE_UNAVAILABLE, "too many concurrent scrapes\n").into_response();
        }
    };
    let _in_flight = state.metrics().track_in_flight();

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = Format::negotiate(accept, state.cfg().exporter.enable_openmetrics);

    match state.registry().collect() {
        Ok(snapshot) => {
            let body = expo::encode(&snapshot, format);
            state.metrics().record_status(200);
            tracing::debug!(format = format.as_str(), samples = snapshot.len(), bytes = body.len(), "scrape served");
            (StatusCode::OK, [(header::CONTENT_TYPE, format.content_type())], body).into_response()
        }
        Err(e) => {
            state.metrics().record_status(500);
            tracing::error!(code = e.code().as_str(), error = %e, "metrics collection failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("error collecting metrics: {e}\n"),
            )
                .into_response()
        }
    }
}
