//! WebSocket signaling endpoint.
//!
//! Each accepted socket is split three ways:
//!
//! ```text
//!  client ──frames──▶ reader loop ──decode──▶ ConnectionActor
//!  client ◀─frames─── writer task ◀─encode─── outbound queue ◀── actor, candidate sink
//! ```
//!
//! The reader owns the socket's lifetime: when the client goes away it
//! cancels the connection token, the actor tears down, drops its end of the
//! outbound queue and the writer finishes.

use crate::actors::{ConnectionActor, ConnectionActorHandle, ConnectionContext};
use crate::errors::{BcError, ProtocolError};
use crate::observability::metrics as prom;
use crate::protocol::{decode, encode, ServerMessage};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::types::ConnectionId;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Shared state for the signaling route.
#[derive(Clone)]
pub struct SignalingState {
    ctx: ConnectionContext,
    root_token: CancellationToken,
    outbound_queue: usize,
}

impl SignalingState {
    /// `root_token` is the parent of every connection token.
    #[must_use]
    pub fn new(ctx: ConnectionContext, root_token: CancellationToken, outbound_queue: usize) -> Self {
        Self {
            ctx,
            root_token,
            outbound_queue: outbound_queue.max(1),
        }
    }
}

/// Router serving the signaling socket at `ws_path`.
pub fn signaling_router(ws_path: &str, state: SignalingState) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
) -> impl IntoResponse {
    let connection_id = ConnectionId::new();
    ws.on_upgrade(move |socket| handle_socket(socket, connection_id, state))
}

#[instrument(skip_all, name = "bc.transport.ws", fields(connection_id = %connection_id))]
async fn handle_socket(socket: WebSocket, connection_id: ConnectionId, state: Arc<SignalingState>) {
    let connection_token = state.root_token.child_token();
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMessage>(state.outbound_queue);
    let (handle, actor_task) = ConnectionActor::spawn(
        connection_id,
        connection_token.clone(),
        outbound_tx,
        state.ctx.clone(),
    );

    info!(
        target: "bc.transport.ws",
        connection_id = %connection_id,
        "Signaling socket opened"
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_frames(
        ws_tx,
        outbound_rx,
        connection_id,
        connection_token.clone(),
    ));

    loop {
        tokio::select! {
            () = connection_token.cancelled() => break,

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if dispatch(&handle, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        prom::record_protocol_error("malformed");
                        debug!(
                            target: "bc.transport.ws",
                            connection_id = %connection_id,
                            len = bytes.len(),
                            "Ignoring binary frame"
                        );
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings are answered by axum
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "bc.transport.ws",
                            connection_id = %connection_id,
                            error = %e,
                            "Socket read failed"
                        );
                        break;
                    }
                }
            }
        }
    }

    connection_token.cancel();
    if let Err(e) = actor_task.await {
        if e.is_panic() {
            state
                .ctx
                .metrics
                .record_panic(crate::actors::ActorType::Connection);
        }
    }
    let _ = writer.await;

    info!(
        target: "bc.transport.ws",
        connection_id = %connection_id,
        "Signaling socket closed"
    );
}

/// Decode one text frame and hand it to the actor.
///
/// Undecodable frames are logged and ignored. Fails only if the actor is gone.
async fn dispatch(handle: &ConnectionActorHandle, text: &str) -> Result<(), BcError> {
    match decode(text) {
        Ok(message) => handle.deliver(message).await,
        Err(e) => {
            let label = match &e {
                ProtocolError::UnknownKind(_) => "unknown-kind",
                ProtocolError::Malformed(_) => "malformed",
            };
            prom::record_protocol_error(label);
            warn!(
                target: "bc.transport.ws",
                connection_id = %handle.connection_id(),
                error = %e,
                "Ignoring inbound frame"
            );
            Ok(())
        }
    }
}

async fn write_frames(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    connection_id: ConnectionId,
    connection_token: CancellationToken,
) {
    while let Some(message) = outbound_rx.recv().await {
        let text = match encode(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    target: "bc.transport.ws",
                    connection_id = %connection_id,
                    kind = message.kind(),
                    error = %e,
                    "Failed to encode outbound message"
                );
                continue;
            }
        };

        if ws_tx.send(Message::Text(text)).await.is_err() {
            debug!(
                target: "bc.transport.ws",
                connection_id = %connection_id,
                "Socket write failed"
            );
            connection_token.cancel();
            return;
        }
    }

    let _ = ws_tx.close().await;
}
