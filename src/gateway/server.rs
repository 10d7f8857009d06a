use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::auth;
use crate::config::DialogConfig;
use crate::pipeline::{Pipeline, PipelineError};

/// Body returned for any failure inside the pipeline.
pub const GENERIC_FAILURE: &str = "An error occurred";

pub struct AppState {
    pub token: Option<String>,
    pub pipeline: Pipeline,
    /// Open WebSocket connections.
    pub clients: AtomicUsize,
}

impl AppState {
    pub fn new(pipeline: Pipeline, token: Option<String>) -> Self {
        Self {
            token,
            pipeline,
            clients: AtomicUsize::new(0),
        }
    }
}

pub async fn run(config: DialogConfig, token: Option<String>) -> anyhow::Result<()> {
    if !auth::is_loopback(&config.gateway.bind) && token.is_none() {
        anyhow::bail!(
            "Auth token required when binding to non-loopback address. \
             Set --token or PCM_DIALOG_TOKEN env var."
        );
    }

    let pipeline = Pipeline::from_config(&config).await?;
    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    serve(&addr, Arc::new(AppState::new(pipeline, token))).await
}

/// Bind `addr` and serve the gateway routes until the task is dropped.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let loopback = state.token.is_none();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;

    info!("pcm-dialog gateway listening on {addr}");
    if loopback {
        info!("no auth token set, expecting local access only");
    } else {
        info!("bearer token required on every route except /health");
    }

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", post(handle))
        .route("/start", post(start))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_token,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = uuid::Uuid::new_v4();
                tracing::info_span!(
                    "request",
                    %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth::verify_bearer(request.headers(), &state.token) {
        Ok(next.run(request).await)
    } else {
        warn!("rejected request with missing or invalid bearer token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn health() -> &'static str {
    "ok"
}

/// `POST /`: the body is one protocol line; the response is the task result.
async fn handle(State(state): State<Arc<AppState>>, body: String) -> (StatusCode, String) {
    match state.pipeline.process(&body).await {
        Ok(output) => (StatusCode::OK, output),
        Err(PipelineError::Decode(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(PipelineError::Failed(e)) => {
            warn!("error handling request: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
        }
    }
}

/// `POST /start`: the body names the session whose ledgers to load.
async fn start(State(state): State<Arc<AppState>>, body: String) -> (StatusCode, String) {
    match state.pipeline.start_session(&body).await {
        Ok(()) => (StatusCode::OK, String::new()),
        Err(e) => {
            warn!("error starting session: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(mut socket: WebSocket, state: Arc<AppState>) {
    let total = state.clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!(clients = total, "client connected");

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => {
                let echo = format!("Echo: {}", text.as_str());
                if socket.send(Message::Text(echo.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("websocket connection closed with error: {e}");
                break;
            }
        }
    }

    let total = state.clients.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(clients = total, "client disconnected");
}
