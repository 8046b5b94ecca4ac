use crate::core::SessionEvent;
use crate::view::SessionView;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use utawaku_proto::catalog::Catalog;
use utawaku_proto::protocol::{Command, ControlId, SessionSnapshot, VideoInfo};

#[derive(Clone)]
struct HttpState {
    view: Arc<SessionView>,
    catalog: Arc<Catalog>,
    event_tx: mpsc::Sender<SessionEvent>,
}

#[derive(Deserialize)]
struct VideoChoice {
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ChapterChoice {
    start: f64,
}

fn router(app_state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/videos", get(get_videos))
        .route("/api/video", post(choose_video))
        .route("/api/chapter", post(choose_chapter))
        .route("/api/control/:id", post(control))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    view: Arc<SessionView>,
    catalog: Arc<Catalog>,
    event_tx: mpsc::Sender<SessionEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState {
            view,
            catalog,
            event_tx,
        });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

/// Hand a command to the session core.  The outcome is observed through
/// `/api/state`, not the response.
async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    if state.event_tx.send(SessionEvent::Command(cmd)).await.is_err() {
        error!("HTTP API: session core gone, command dropped");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionSnapshot> {
    Json(state.view.snapshot())
}

async fn get_videos(State(state): State<HttpState>) -> Json<Vec<VideoInfo>> {
    let videos = state
        .catalog
        .videos()
        .iter()
        .enumerate()
        .map(|(index, v)| VideoInfo {
            index,
            video_id: v.video_id.clone(),
            video_name: v.video_name.clone(),
        })
        .collect();
    Json(videos)
}

async fn choose_video(State(state): State<HttpState>, Json(body): Json<VideoChoice>) -> StatusCode {
    info!("HTTP API: choose video {:?}", body.index);
    dispatch(&state, Command::ChooseVideo { index: body.index }).await
}

async fn choose_chapter(State(state): State<HttpState>, Json(body): Json<ChapterChoice>) -> StatusCode {
    info!("HTTP API: choose chapter {}s", body.start);
    dispatch(&state, Command::ChooseChapter { start: body.start }).await
}

async fn control(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    let id: ControlId = match id.parse() {
        Ok(id) => id,
        Err(e) => {
            info!("HTTP API: {}", e);
            return StatusCode::NOT_FOUND;
        }
    };
    info!("HTTP API: control {}", id);
    dispatch(&state, Command::Control { id }).await
}
