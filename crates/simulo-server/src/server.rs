//! HTTP listener and top-level server wiring.
//!
//! This module:
//! - Builds the collaborators and the compile loop from `Config`.
//! - Serves the session socket, the agent endpoint and signed objects.
//! - Assigns each socket a `ConnectionId` and holds one of
//!   `max_clients` slots for as long as it is open.
//! - Spawns a writer task per socket that owns the sink half.
//!
//! The per-connection logic lives in `connection`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use simulo_core::memory::{MemoryIdentityProvider, MemoryProjectStore, Seed};
use simulo_core::{IdentityProvider, ObjectStore, PresenceRegistry, ProjectStore};
use simulo_protocol::wire_types::MAX_EDITOR_FRAME_LEN;
use simulo_protocol::Frame;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::api;
use crate::codegen::OpenAiGenerator;
use crate::compile_queue::CompileQueue;
use crate::config::Config;
use crate::connection;
use crate::deploy::Deployer;
use crate::identity::HttpIdentityProvider;
use crate::object_store::FsObjectStore;
use crate::toolchain::CargoToolchain;
use crate::types::{ConnectionId, Inbound, Outbound, OutboundRx, OutboundTx};

/// Largest frame or message a socket accepts. Anything an editor may
/// legally send has to fit.
pub const MAX_SOCKET_MESSAGE: usize = MAX_EDITOR_FRAME_LEN;

/// Counter for assigning unique `ConnectionId`s.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Everything a connection or request handler can reach.
pub struct AppState {
    /// Machines with an authenticated socket open.
    pub presence: PresenceRegistry,

    /// One permit per open socket, `max_clients` in total.
    pub connection_slots: Arc<Semaphore>,
    pub projects: Arc<dyn ProjectStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub deployer: Deployer,

    /// Serves `GET /objects/{key}`; absent when objects live elsewhere.
    pub object_files: Option<Arc<FsObjectStore>>,

    /// Browser origin allowed to open sockets; any origin when `None`.
    pub allowed_origin: Option<String>,
}

impl AppState {
    /// Build production collaborators from `config` and start the
    /// compile loop.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let seed = match &config.seed_file {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read seed file {}", path.display()))?;
                Seed::from_json(&text)
                    .with_context(|| format!("invalid seed file {}", path.display()))?
            }
            None => Seed::default(),
        };

        let identity: Arc<dyn IdentityProvider> = match &config.identity {
            Some(identity) => Arc::new(HttpIdentityProvider::new(identity)),
            None => {
                warn!("SIMULO_IDENTITY_URL unset, accepting seed tokens only");
                Arc::new(MemoryIdentityProvider::new(seed.tokens.clone()))
            }
        };

        let projects: Arc<dyn ProjectStore> = Arc::new(MemoryProjectStore::from_seed(seed));
        let object_files = Arc::new(FsObjectStore::new(&config.objects));
        let objects: Arc<dyn ObjectStore> = object_files.clone();

        let toolchain = Arc::new(CargoToolchain::new(&config.toolchain));
        let (queue, _worker) = CompileQueue::start(config.toolchain.work_dir.clone(), toolchain);
        let generator = Arc::new(OpenAiGenerator::new(&config.codegen));
        let deployer = Deployer::new(projects.clone(), objects.clone(), generator, queue);

        Ok(AppState {
            presence: PresenceRegistry::default(),
            connection_slots: Arc::new(Semaphore::new(config.max_clients)),
            projects,
            objects,
            identity,
            deployer,
            object_files: Some(object_files),
            allowed_origin: config.cors_origin.clone(),
        })
    }
}

/// Routes of the hub.
pub fn router(state: Arc<AppState>) -> Router {
    let origin = match state
        .allowed_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health))
        .route("/projects/{id}/agent", post(api::agent))
        .route("/objects/{key}", get(api::get_object))
        .layer(cors)
        .with_state(state)
}

/// Run the hub with the given configuration.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config).await?);

    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, max_clients = config.max_clients, "listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let (Some(allowed), Some(origin)) = (&state.allowed_origin, headers.get(header::ORIGIN)) {
        if origin.as_bytes() != allowed.as_bytes() {
            warn!(origin = ?origin, "rejecting socket from foreign origin");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let slot = match state.connection_slots.clone().try_acquire_owned() {
        Ok(slot) => slot,
        Err(_) => {
            warn!("rejecting socket: max_clients reached");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    ws.max_frame_size(MAX_SOCKET_MESSAGE)
        .max_message_size(MAX_SOCKET_MESSAGE)
        .on_upgrade(move |socket| handle_socket(socket, state, slot))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, slot: OwnedSemaphorePermit) {
    let conn = next_connection_id();
    let (sink, stream) = socket.split();

    let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
    info!(connection = conn.0, "socket opened");

    let writer = tokio::spawn(run_writer(conn, sink, out_rx));

    let inbound = Box::pin(stream.filter_map(|msg| async move {
        match msg {
            Ok(Message::Text(text)) => Some(Inbound::Text(text.as_str().to_string())),
            Ok(Message::Binary(data)) => Some(Inbound::Binary(data.to_vec())),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Ok(Message::Close(_)) | Err(_) => Some(Inbound::Closed),
        }
    }));

    connection::run_connection(state.clone(), conn, inbound, out_tx).await;

    let _ = writer.await;
    drop(slot);
    info!(connection = conn.0, "socket closed");
}

/// Sole writer of one socket.
async fn run_writer(conn: ConnectionId, mut sink: SplitSink<WebSocket, Message>, mut rx: OutboundRx) {
    while let Some(outbound) = rx.recv().await {
        let (message, last) = match outbound {
            Outbound::Frame(Frame::Text(text)) => (Message::Text(text.into()), false),
            Outbound::Frame(Frame::Binary(data)) => (Message::Binary(data.into()), false),
            Outbound::Ping => (Message::Ping(Bytes::new()), false),
            Outbound::Close(code) => (
                Message::Close(Some(CloseFrame {
                    code: code.code(),
                    reason: code.reason().into(),
                })),
                true,
            ),
        };

        if let Err(e) = sink.send(message).await {
            warn!(connection = conn.0, error = %e, "socket write failed");
            break;
        }
        if last {
            break;
        }
    }
}
