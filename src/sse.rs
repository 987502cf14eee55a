use std::{convert::Infallible, net::SocketAddr};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    errors::{AppError, Result},
    models::{ImageData, Resolution},
    orchestrator::{Reply, SessionCommand},
    scenes::{SCENES, Scene},
    session::SessionView,
    util::download_file_name,
};

pub type BroadcastSender = broadcast::Sender<String>;

const INDEX_HTML: &str = include_str!("../static/index.html");
/// Room for the JSON envelope and data URI header around the base64 payload.
const UPLOAD_ENVELOPE_BYTES: usize = 64 * 1024;

pub fn message_bus() -> (BroadcastSender, broadcast::Receiver<String>) {
    broadcast::channel(256)
}

pub fn encode_message(event: &str, payload: Value) -> String {
    json!({
        "event": event,
        "payload": payload,
    })
    .to_string()
}

pub fn broadcast_json(sender: &BroadcastSender, event: &str, payload: Value) {
    let message = encode_message(event, payload);
    let _ = sender.send(message);
}

#[derive(Clone)]
struct AppState {
    broadcaster: BroadcastSender,
    command_tx: mpsc::Sender<SessionCommand>,
    max_upload_bytes: usize,
}

impl AppState {
    /// Sends a command to the controller and waits for its answer.
    async fn ask<T>(&self, make: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| AppError::ControllerUnavailable)?;
        response.await.map_err(|_| AppError::ControllerUnavailable)?
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialSelection {
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoUpload {
    data_uri: String,
}

#[derive(Debug, Deserialize)]
struct SceneSelection {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResolutionSelection {
    resolution: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload {
    data_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    scenes: &'static [Scene],
    resolutions: [Resolution; 3],
}

pub fn router(
    broadcaster: BroadcastSender,
    command_tx: mpsc::Sender<SessionCommand>,
    max_upload_bytes: usize,
) -> Router {
    let state = AppState {
        broadcaster,
        command_tx,
        max_upload_bytes,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/events", get(sse_handler))
        .route("/api/scenes", get(scenes_handler))
        .route("/api/state", get(state_handler))
        .route("/api/credential/select", post(select_credential_handler))
        .route(
            "/api/photo",
            get(photo_handler)
                .post(upload_photo_handler)
                .delete(clear_photo_handler),
        )
        .route("/api/scene", post(select_scene_handler))
        .route("/api/resolution", post(select_resolution_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/result", get(result_handler))
        .route("/api/result/download", get(download_handler))
        .layer(DefaultBodyLimit::max(request_body_limit(max_upload_bytes)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Photos arrive base64-encoded, so the body limit covers the encoded size;
/// the photo limit itself is checked on the decoded bytes.
fn request_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.div_ceil(3) * 4 + UPLOAD_ENVELOPE_BYTES
}

pub async fn run_server(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "server", %addr, "HTTP 服务已启动");

    axum::serve(listener, app)
        .await
        .map_err(|err| AppError::other(format!("HTTP 服务错误: {err}")))?;

    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(message) => Some(Ok(Event::default().data(message))),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn scenes_handler() -> Json<Catalog> {
    Json(Catalog {
        scenes: SCENES,
        resolutions: Resolution::ALL,
    })
}

async fn state_handler(State(state): State<AppState>) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::State { reply })
        .await?;
    Ok(Json(view))
}

async fn select_credential_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialSelection>,
) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::SelectCredential {
            api_key: body.api_key,
            reply,
        })
        .await?;
    Ok(Json(view))
}

async fn upload_photo_handler(
    State(state): State<AppState>,
    Json(body): Json<PhotoUpload>,
) -> Result<Json<SessionView>> {
    let image = ImageData::from_data_uri(&body.data_uri)?;
    if image.data.len() > state.max_upload_bytes {
        return Err(AppError::PhotoTooLarge {
            limit_mb: state.max_upload_bytes / (1024 * 1024),
        });
    }

    let view = state
        .ask(|reply| SessionCommand::UploadPhoto { image, reply })
        .await?;
    Ok(Json(view))
}

async fn photo_handler(State(state): State<AppState>) -> Result<Json<ImagePayload>> {
    let image = state
        .ask(|reply| SessionCommand::SourceImage { reply })
        .await?;
    Ok(Json(ImagePayload {
        data_uri: image.to_data_uri(),
        file_name: None,
    }))
}

async fn clear_photo_handler(State(state): State<AppState>) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::ClearPhoto { reply })
        .await?;
    Ok(Json(view))
}

async fn select_scene_handler(
    State(state): State<AppState>,
    Json(body): Json<SceneSelection>,
) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::SelectScene { id: body.id, reply })
        .await?;
    Ok(Json(view))
}

async fn select_resolution_handler(
    State(state): State<AppState>,
    Json(body): Json<ResolutionSelection>,
) -> Result<Json<SessionView>> {
    let resolution = body.resolution.parse::<Resolution>()?;
    let view = state
        .ask(|reply| SessionCommand::SelectResolution { resolution, reply })
        .await?;
    Ok(Json(view))
}

async fn generate_handler(State(state): State<AppState>) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::Generate { reply })
        .await?;
    Ok(Json(view))
}

async fn reset_handler(State(state): State<AppState>) -> Result<Json<SessionView>> {
    let view = state
        .ask(|reply| SessionCommand::Reset { reply })
        .await?;
    Ok(Json(view))
}

async fn result_handler(State(state): State<AppState>) -> Result<Json<ImagePayload>> {
    let image = state
        .ask(|reply| SessionCommand::ResultImage { reply })
        .await?;
    Ok(Json(ImagePayload {
        data_uri: image.to_data_uri(),
        file_name: Some(download_file_name(chrono::Utc::now())),
    }))
}

async fn download_handler(State(state): State<AppState>) -> Result<Response> {
    let image = state
        .ask(|reply| SessionCommand::ResultImage { reply })
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_file_name(chrono::Utc::now())
    );

    Ok((
        [
            (header::CONTENT_TYPE, image.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image.data,
    )
        .into_response())
}
