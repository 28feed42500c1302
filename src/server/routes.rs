//! HTTP and WebSocket routes
//!
//! | Method | Path                | Handler            |
//! |--------|---------------------|--------------------|
//! | POST   | `/{key}`            | [`publish_body`]   |
//! | GET    | `/{key}[.ts]`       | [`subscribe_live`] |
//! | GET    | `/ws/{key}`         | [`publish_ws`]     |
//! | GET    | `/hls/{key}/{file}` | [`serve_segment`]  |
//! | GET    | `/api/rooms`        | [`room_stats`]     |
//! | GET    | `/healthz`          | [`healthz`]        |

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Error, IngestError, Result};
use crate::ingest::websocket::{CLOSE_BAD_REQUEST, CLOSE_CONFLICT, CLOSE_NOT_FOUND, CLOSE_WORKER_FAILED};
use crate::ingest::{pump, run_credit_protocol, RemoteSource, StreamSource, WsChannel};
use crate::registry::{OutputMode, RegistryError, RoomRegistry, SessionKey};
use crate::segments::{is_manifest, SegmentStore};
use crate::session::{LiveSubscription, PublishContext, PublishSession, Transport};
use crate::stats::ServerStats;

use super::config::ServerConfig;

/// How often a manifest request rechecks for the file after the worker
/// announced it
const MANIFEST_RECHECK: Duration = Duration::from_millis(100);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub store: SegmentStore,
    pub config: Arc<ServerConfig>,
    pub http: reqwest::Client,
    pub started: Instant,
}

impl AppState {
    pub fn new(registry: Arc<RoomRegistry>, config: ServerConfig) -> Self {
        let store = SegmentStore::new(registry.config().worker.base_path.clone());

        Self {
            registry,
            store,
            config: Arc::new(config),
            http: reqwest::Client::new(),
            started: Instant::now(),
        }
    }

    fn mode_or_default(&self, requested: Option<&str>) -> Result<OutputMode> {
        match requested {
            Some(raw) => raw.parse().map_err(Error::BadRequest),
            None => Ok(self.config.default_mode),
        }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/rooms", get(room_stats))
        .route("/ws/{key}", get(publish_ws))
        .route("/hls/{key}/{file}", get(serve_segment))
        .route("/{key}", post(publish_body).get(subscribe_live))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishParams {
    /// `live` or `segmented`
    pub mode: Option<String>,
    /// Remote URL to pull instead of reading the socket (WebSocket only)
    pub source: Option<String>,
}

/// Publish over a streaming request body
///
/// The response is sent once the room has ended.
pub async fn publish_body(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    Query(params): Query<PublishParams>,
    body: Body,
) -> Result<Response> {
    let key = SessionKey::parse(&raw_key)?;
    let mode = state.mode_or_default(params.mode.as_deref())?;

    let context = PublishContext::new(key, mode, Transport::HttpBody);
    let session = PublishSession::open(&state.registry, context).await?;

    let mut source = StreamSource::new(body.into_data_stream());

    // Spawned so teardown still runs if this handler is dropped
    let run = tokio::spawn(session.run(move |mut sink| async move {
        pump(&mut source, &mut sink).await
    }));

    match run.await {
        Ok(summary) => match summary.error {
            None => Ok(StatusCode::OK.into_response()),
            Some(error) => Ok((StatusCode::INTERNAL_SERVER_ERROR, error).into_response()),
        },
        Err(e) => Err(Error::Io(std::io::Error::other(e))),
    }
}

/// Live subscribe
///
/// Waits a bounded time for a late publisher. Segmented rooms are
/// redirected to their manifest.
pub async fn subscribe_live(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let key = SessionKey::from_stream_name(&name)?;
    let registry_config = state.registry.config();

    let room = state
        .registry
        .wait_for_room(&key, registry_config.wait_timeout)
        .await?;

    if !room.mode().is_live() {
        let manifest = &registry_config.worker.manifest_name;
        return Ok(Redirect::temporary(&format!("/hls/{key}/{manifest}")).into_response());
    }

    let subscription = LiveSubscription::attach(room, registry_config.subscriber_buffer)
        .ok_or_else(|| RegistryError::SessionNotFound(key.clone()))?;

    Ok((
        [
            (header::CONTENT_TYPE, state.config.live_content_type.clone()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(subscription),
    )
        .into_response())
}

/// Publish over WebSocket
///
/// Binary frames carry media under the credit protocol. With `?source=`
/// the room is fed from a remote URL instead and the socket only holds the
/// session open.
pub async fn publish_ws(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    Query(params): Query<PublishParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| ws_session(state, raw_key, params, socket))
}

async fn ws_session(state: AppState, raw_key: String, params: PublishParams, socket: WebSocket) {
    let mut channel = WsChannel::new(socket);

    let key = match SessionKey::parse(&raw_key) {
        Ok(key) => key,
        Err(e) => return channel.close_with(CLOSE_NOT_FOUND, &e.to_string()).await,
    };
    let mode = match state.mode_or_default(params.mode.as_deref()) {
        Ok(mode) => mode,
        Err(e) => return channel.close_with(CLOSE_BAD_REQUEST, &e.to_string()).await,
    };

    let transport = match params.source {
        Some(_) => Transport::RemotePull,
        None => Transport::WebSocket,
    };
    let context = PublishContext::new(key, mode, transport);

    let session = match PublishSession::open(&state.registry, context).await {
        Ok(session) => session,
        Err(e) => {
            let code = if e.is_conflict() {
                CLOSE_CONFLICT
            } else {
                CLOSE_WORKER_FAILED
            };
            return channel.close_with(code, &e.to_string()).await;
        }
    };

    match params.source {
        None => {
            session
                .run(move |mut sink| async move { run_credit_protocol(&mut channel, &mut sink).await })
                .await;
        }
        Some(url) => {
            let client = state.http.clone();
            session
                .run(move |mut sink| async move {
                    let cancel = CancellationToken::new();
                    let pull = async {
                        let mut remote = RemoteSource::open(&client, &url, cancel.clone()).await?;
                        pump(&mut remote, &mut sink).await
                    };

                    tokio::select! {
                        result = pull => result,
                        _ = channel.wait_closed() => {
                            cancel.cancel();
                            Err(IngestError::Cancelled)
                        }
                    }
                })
                .await;
        }
    }
}

/// Serve a manifest or segment from the segment store
///
/// For a live segmented room the manifest is only served once the worker
/// has announced it, waiting up to the subscriber wait timeout.
pub async fn serve_segment(
    State(state): State<AppState>,
    Path((raw_key, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = SessionKey::parse(&raw_key)?;
    let path = state.store.resolve(&key, &file)?;

    if is_manifest(&file) {
        if let Some(room) = state.registry.lookup(&key).await {
            let announced = room.worker().is_ready() && state.store.exists(&path).await;
            if !room.mode().is_live() && !announced {
                let wait = state.registry.config().wait_timeout;
                let deadline = tokio::time::Instant::now() + wait;

                if room.worker().wait_ready(wait).await {
                    // The worker announces the file as it opens it
                    while !state.store.exists(&path).await
                        && tokio::time::Instant::now() < deadline
                    {
                        tokio::time::sleep(MANIFEST_RECHECK).await;
                    }
                }
            }
        }
    }

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    Ok(state.store.serve(&path, range).await?)
}

/// Live room statistics
pub async fn room_stats(State(state): State<AppState>) -> Json<ServerStats> {
    let rooms = state.registry.stats().await;
    Json(ServerStats::from_rooms(state.started.elapsed(), rooms))
}

pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::registry::RegistryConfig;
    use crate::worker::WorkerConfig;

    fn test_state(dir: &std::path::Path) -> AppState {
        let worker = WorkerConfig::with_program("cat", Vec::<String>::new(), Vec::<String>::new())
            .base_path(dir);
        let registry = RoomRegistry::with_config(
            RegistryConfig::default()
                .worker(worker)
                .wait_timeout(Duration::from_millis(100)),
        );
        AppState::new(Arc::new(registry), ServerConfig::default())
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_subscribe_unknown_key_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/nobody.ts").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_key_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/bad%20key").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_mode_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::post("/room?mode=vhs")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_header_present() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::get("/healthz")
                    .header(header::ORIGIN, "https://viewer.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_publish_body_then_stats_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::post("/room").body(Body::from("payload")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry.room_count().await, 0);

        let response = app
            .oneshot(Request::get("/api/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(stats["active_rooms"], 0);
    }

    #[tokio::test]
    async fn test_segment_range_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let session = dir.path().join("cam");
        std::fs::create_dir_all(&session).unwrap();
        std::fs::write(session.join("segment_00000.ts"), vec![1u8; 1000]).unwrap();

        let response = app
            .oneshot(
                Request::get("/hls/cam/segment_00000.ts")
                    .header(header::RANGE, "bytes=0-99")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/1000");
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes().len(), 100);
    }

    #[tokio::test]
    async fn test_republished_room_never_serves_old_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("cam");
        std::fs::create_dir_all(&session).unwrap();
        std::fs::write(session.join("index.m3u8"), "#EXTM3U\n#OLD-SESSION\n").unwrap();

        // Announces its manifest only after a delay
        let script = r#"sleep 0.3
printf '#EXTM3U\n#NEW-SESSION\n' > "$0/index.m3u8"
echo "Opening '$0/index.m3u8' for writing" >&2
cat > /dev/null"#;
        let worker = WorkerConfig::with_program("sh", Vec::<String>::new(), ["-c", script, "{output_dir}"])
            .base_path(dir.path());
        let registry = Arc::new(RoomRegistry::with_config(
            RegistryConfig::default()
                .worker(worker)
                .wait_timeout(Duration::from_secs(5)),
        ));
        let state = AppState::new(Arc::clone(&registry), ServerConfig::default());

        let key = SessionKey::parse("cam").unwrap();
        let published = registry.publish(&key, OutputMode::SegmentedFile).await.unwrap();

        let response = router(state)
            .oneshot(Request::get("/hls/cam/index.m3u8").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let manifest = body_string(response).await;
        assert!(manifest.contains("#NEW-SESSION"), "{manifest:?}");
        assert!(!manifest.contains("#OLD-SESSION"), "{manifest:?}");

        registry
            .close_room(&published.room, crate::registry::CloseReason::Shutdown)
            .await;
    }

    #[tokio::test]
    async fn test_missing_segment_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/hls/cam/index.m3u8").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
