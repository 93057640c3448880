//! Thin status/control HTTP surface (SPEC_FULL.md §A.5).
//!
//! Exposes `connect` / `disconnect` / `getStatus` / `startRecording` /
//! `stopRecording` as JSON endpoints over the core's public contract
//! (spec §4.5). The byte-streaming framing layer itself is out of scope
//! (spec §1); a caller that wants the raw MPEG-TS bytes is expected to
//! supply its own framing layer driving the same `LiveStream` methods this
//! router calls.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::client::ClientKind;
use crate::error::{MuxError, MuxResult};
use crate::registry::LiveStreamRegistry;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LiveStreamRegistry>,
}

/// Builder for [`AppState`], mirroring the composition-root pattern used
/// for the rest of the crate's collaborators.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<LiveStreamRegistry>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<LiveStreamRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> AppState {
        AppState {
            registry: self.registry.expect("registry is required"),
        }
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Scans `start..=end` for the first port that can be bound, mirroring the
/// teacher's auto-discovered-port startup path.
async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    detail: String,
    started_at: i64,
    updated_at: i64,
    client_count: usize,
    is_recording: bool,
    recording_start_time: i64,
    recording_file_path: Option<String>,
}

#[derive(Serialize)]
struct ConnectResponse {
    client_id: String,
}

#[derive(Serialize)]
struct RecordingResponse {
    success: bool,
    message: String,
}

fn require_stream(
    state: &AppState,
    display_channel_id: &str,
    quality: &str,
) -> MuxResult<Arc<crate::live_stream::LiveStream>> {
    state
        .registry
        .get(display_channel_id, quality)
        .ok_or_else(|| MuxError::StreamNotFound(format!("{display_channel_id}/{quality}")))
}

async fn get_status_handler(
    State(state): State<AppState>,
    Path((display_channel_id, quality)): Path<(String, String)>,
) -> MuxResult<Json<StatusResponse>> {
    let stream = require_stream(&state, &display_channel_id, &quality)?;
    let snapshot = stream.get_status();
    Ok(Json(StatusResponse {
        status: snapshot.status.as_str(),
        detail: snapshot.detail,
        started_at: snapshot.started_at,
        updated_at: snapshot.updated_at,
        client_count: snapshot.client_count,
        is_recording: snapshot.is_recording,
        recording_start_time: snapshot.recording_start_time,
        recording_file_path: snapshot
            .recording_file_path
            .map(|p| p.to_string_lossy().into_owned()),
    }))
}

async fn connect_handler(
    State(state): State<AppState>,
    Path((display_channel_id, quality)): Path<(String, String)>,
) -> Json<ConnectResponse> {
    let stream = state.registry.get_or_create(&display_channel_id, &quality, None);
    let client = stream.connect(ClientKind::Mpegts, &state.registry).await;
    Json(ConnectResponse {
        client_id: client.client_id().to_string(),
    })
}

async fn disconnect_handler(
    State(state): State<AppState>,
    Path((display_channel_id, quality, client_id)): Path<(String, String, String)>,
) -> MuxResult<()> {
    let stream = require_stream(&state, &display_channel_id, &quality)?;
    stream.disconnect(&client_id);
    Ok(())
}

async fn start_recording_handler(
    State(state): State<AppState>,
    Path((display_channel_id, quality)): Path<(String, String)>,
) -> MuxResult<Json<RecordingResponse>> {
    let stream = require_stream(&state, &display_channel_id, &quality)?;
    let (success, message) = stream.start_recording().await;
    Ok(Json(RecordingResponse { success, message }))
}

async fn stop_recording_handler(
    State(state): State<AppState>,
    Path((display_channel_id, quality)): Path<(String, String)>,
) -> MuxResult<Json<RecordingResponse>> {
    let stream = require_stream(&state, &display_channel_id, &quality)?;
    let (success, message) = stream.stop_recording().await;
    Ok(Json(RecordingResponse { success, message }))
}

/// Builds the router exposing the thin status/control surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/streams/:channel/:quality/status", get(get_status_handler))
        .route("/streams/:channel/:quality/connect", post(connect_handler))
        .route(
            "/streams/:channel/:quality/clients/:client_id",
            axum::routing::delete(disconnect_handler),
        )
        .route(
            "/streams/:channel/:quality/recording/start",
            post(start_recording_handler),
        )
        .route(
            "/streams/:channel/:quality/recording/stop",
            post(stop_recording_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState, preferred_port: u16) -> Result<(), ServerError> {
    let (port, listener) = if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(49400, 49410).await?
    };

    log::info!("[Api] listening on http://0.0.0.0:{port}");
    let app = create_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
