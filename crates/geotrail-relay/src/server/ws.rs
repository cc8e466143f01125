//! `GET /ws`: the live channel.
//!
//! Each connection gets a bounded outbound queue drained by its own writer
//! task, so frames reach a client in the order they were queued. Inbound
//! frames are handled one at a time per connection. A peer that lets its
//! queue fill up, or stalls a single write past the send timeout, is
//! disconnected; broadcasters never wait on it.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::gateway::{Envelope, Gateway};

use super::AppState;
use super::error::ApiError;

/// How long one socket write may take before the peer is considered gone.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection bounds.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Outbound queue capacity. A peer that lets it fill up is dropped.
    pub queue: usize,
    pub send_timeout: Duration,
}

impl ConnectionLimits {
    pub const fn new(queue: usize) -> Self {
        Self {
            queue,
            send_timeout: SEND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Access token; browsers cannot set headers on a WebSocket handshake.
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let claims = params
        .token
        .as_deref()
        .and_then(|token| state.jwt.validate_access(token));
    if claims.is_none() && state.require_ws_token {
        return ApiError::Unauthorized("Valid access token required".into()).into_response();
    }
    if claims.is_none() && params.token.is_some() {
        warn!("Ignoring invalid token on live connection");
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let user_id = claims.map(|c| c.sub);
    let gateway = Arc::clone(&state.gateway);
    let limits = ConnectionLimits::new(state.outbound_queue);
    upgrade.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_connection(sink, stream, gateway, limits, user_id).await;
    })
}

/// Drive one connection until the peer closes, the stream ends, or the
/// writer gives up on the peer.
pub async fn serve_connection<S, R, E>(
    mut sink: S,
    mut stream: R,
    gateway: Arc<Gateway>,
    limits: ConnectionLimits,
    user_id: Option<String>,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (frame_tx, mut frame_rx) = mpsc::channel::<Envelope>(limits.queue.max(1));
    let (control_tx, mut control_rx) = mpsc::channel::<Message>(8);
    let conn_id = gateway.connect(frame_tx).await;
    info!(
        conn_id = %conn_id,
        user_id = user_id.as_deref().unwrap_or("anonymous"),
        "Live connection opened"
    );

    let writer_conn = conn_id.clone();
    let send_timeout = limits.send_timeout;
    let mut writer = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                Some(control) = control_rx.recv() => control,
                frame = frame_rx.recv() => match frame {
                    Some(frame) => match frame.to_text() {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            warn!(conn_id = %writer_conn, error = %e, "Dropping unencodable frame");
                            continue;
                        }
                    },
                    // The gateway no longer knows this connection.
                    None => break,
                },
            };
            match timeout(send_timeout, sink.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => break,
                Err(_) => {
                    warn!(conn_id = %writer_conn, "Socket write timed out, closing connection");
                    break;
                }
            }
        }
    });

    let mut writer_done = false;
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        };
        let Some(frame) = frame else { break };
        match frame {
            Ok(Message::Text(text)) => match Envelope::parse(text.as_str()) {
                Ok(envelope) => {
                    gateway
                        .receive_event(&conn_id, &envelope.event, envelope.data)
                        .await;
                }
                Err(e) => warn!(conn_id = %conn_id, error = %e, "Ignoring frame"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Live connection errored");
                break;
            }
        }
    }

    // Dropping the gateway entry closes the frame queue, which lets the
    // writer flush and exit.
    gateway.on_disconnect(&conn_id).await;
    drop(control_tx);
    if !writer_done {
        let _ = writer.await;
    }
}
