//! Per-connection session loop.
//!
//! The first frame decides the [`Session`]; afterwards frames are handled
//! one at a time in arrival order. A keepalive task pings the peer for as
//! long as the connection is open. Nothing here touches the socket
//! directly: frames arrive as [`Inbound`] and leave through the
//! connection's [`OutboundTx`], drained by a single writer.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use simulo_core::{EditorPush, MachineId};
use simulo_protocol::{encode_push, CloseCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth;
use crate::editor;
use crate::server::AppState;
use crate::types::{ConnectionId, Inbound, Outbound, OutboundTx};

/// Interval between keepalive pings.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Lifetime of every URL handed to a client.
pub const PRESIGN_TTL: Duration = Duration::from_secs(5 * 60);

/// Role of an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Machine { machine_id: MachineId },
    User { user_id: String, project_id: String },
}

/// Aborts the keepalive when the connection loop ends, however it ends.
struct Keepalive(JoinHandle<()>);

impl Keepalive {
    fn spawn(out: OutboundTx) -> Self {
        Keepalive(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if out.send(Outbound::Ping).is_err() {
                    break;
                }
            }
        }))
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one connection from its first frame until it closes.
pub async fn run_connection<S>(state: Arc<AppState>, conn: ConnectionId, mut inbound: S, out: OutboundTx)
where
    S: Stream<Item = Inbound> + Unpin + Send,
{
    let _keepalive = Keepalive::spawn(out.clone());

    let first = match inbound.next().await {
        Some(Inbound::Closed) | None => {
            debug!(connection = conn.0, "closed before authenticating");
            return;
        }
        Some(frame) => frame,
    };

    let session = match auth::authenticate(&state, conn, first, &out).await {
        Ok(session) => session,
        Err(code) => {
            close(&out, conn, code);
            return;
        }
    };

    if let Some(code) = read_loop(&state, conn, &session, &mut inbound, &out).await {
        close(&out, conn, code);
    }

    if let Session::Machine { machine_id } = session {
        if state.presence.release(machine_id, conn.0).await {
            info!(machine_id = %machine_id, "machine disconnected");
        } else {
            debug!(machine_id = %machine_id, connection = conn.0, "stale machine socket closed");
        }
    }
}

/// Handle frames until the peer goes away (`None`) or a frame is
/// rejected (`Some(code)`).
async fn read_loop<S>(
    state: &AppState,
    conn: ConnectionId,
    session: &Session,
    inbound: &mut S,
    out: &OutboundTx,
) -> Option<CloseCode>
where
    S: Stream<Item = Inbound> + Unpin + Send,
{
    while let Some(frame) = inbound.next().await {
        match (session, frame) {
            (_, Inbound::Closed) => break,

            (Session::Machine { machine_id }, frame) => match frame {
                Inbound::Text(text) => info!(machine_id = %machine_id, message = %text, "machine message"),
                Inbound::Binary(data) => info!(machine_id = %machine_id, bytes = data.len(), "machine message"),
                Inbound::Closed => break,
            },

            (Session::User { project_id, .. }, Inbound::Binary(data)) => {
                if let Err(code) = editor::handle_editor_frame(state, project_id, &data, out).await {
                    return Some(code);
                }
            }

            (Session::User { project_id, .. }, Inbound::Text(_)) => {
                warn!(connection = conn.0, project_id = %project_id, "text frame after authentication");
                return Some(CloseCode::UnsupportedFrame);
            }
        }
    }
    None
}

fn close(out: &OutboundTx, conn: ConnectionId, code: CloseCode) {
    info!(connection = conn.0, code = code.code(), reason = code.reason(), "closing connection");
    let _ = out.send(Outbound::Close(code));
}

/// Queue a push for an editor.
pub fn send_push(out: &OutboundTx, push: &EditorPush) {
    match encode_push(push) {
        Ok(frame) => {
            let _ = out.send(Outbound::Frame(frame));
        }
        Err(e) => warn!(error = %e, "failed to encode editor push"),
    }
}
