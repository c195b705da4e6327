//! HTTP surface: `POST /` runs one conversion, `GET /health` answers liveness.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::converter::Converter;
use crate::request::ConversionResult;

pub fn router(converter: Arc<Converter>) -> Router {
    Router::new()
        .route("/", post(convert))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(converter)
}

/// The body is taken as raw bytes so that malformed JSON and missing fields
/// are reported through the JSON error contract.
async fn convert(State(converter): State<Arc<Converter>>, body: Bytes) -> Response {
    let span = info_span!("convert", request_id = %Uuid::new_v4());
    match converter.handle(&body).instrument(span).await {
        Ok(download_url) => {
            (StatusCode::OK, Json(ConversionResult::success(download_url))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
