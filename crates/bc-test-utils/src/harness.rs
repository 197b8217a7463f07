//! Drive connection actors without sockets.
//!
//! A [`TestHarness`] owns a registry and a media backend; each
//! [`TestPeer`] is one spawned `ConnectionActor` plus the receiving end of
//! its outbound queue, standing in for the socket writer.

use crate::mock_media::{MediaLog, MockMediaBackend};
use bc_service::actors::{
    ActorMetrics, ConnectionActor, ConnectionActorHandle, ConnectionContext, ConnectionState,
    RegistryHandle,
};
use bc_service::protocol::{ClientMessage, ServerMessage};
use common::types::ConnectionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `recv` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry plus backend shared by every peer.
pub struct TestHarness {
    pub registry: RegistryHandle,
    pub ctx: ConnectionContext,
    log: Arc<MediaLog>,
    root_token: CancellationToken,
}

impl TestHarness {
    #[must_use]
    pub fn new(backend: MockMediaBackend) -> Self {
        Self::with_timeout(backend, Duration::from_secs(20))
    }

    /// Harness with a custom negotiation timeout.
    #[must_use]
    pub fn with_timeout(backend: MockMediaBackend, negotiation_timeout: Duration) -> Self {
        let log = backend.log();
        let registry = RegistryHandle::new(CancellationToken::new());
        let ctx = ConnectionContext {
            registry: registry.clone(),
            backend: Arc::new(backend),
            metrics: ActorMetrics::new(),
            mailbox_capacity: 64,
            negotiation_timeout,
        };
        Self {
            registry,
            ctx,
            log,
            root_token: CancellationToken::new(),
        }
    }

    /// Spawn a connection actor.
    #[must_use]
    pub fn connect(&self) -> TestPeer {
        let (tx, rx) = mpsc::channel(64);
        let (handle, task) = ConnectionActor::spawn(
            ConnectionId::new(),
            self.root_token.child_token(),
            tx,
            self.ctx.clone(),
        );
        TestPeer {
            handle,
            outbound: rx,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn media(&self) -> Arc<MediaLog> {
        Arc::clone(&self.log)
    }

    /// Cancel every peer, as a server shutdown would.
    pub fn shutdown(&self) {
        self.root_token.cancel();
    }
}

/// One connection under test.
pub struct TestPeer {
    pub handle: ConnectionActorHandle,
    outbound: mpsc::Receiver<ServerMessage>,
    task: Option<JoinHandle<()>>,
}

impl TestPeer {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.handle.connection_id()
    }

    /// Deliver a client message.
    pub async fn send(&self, message: ClientMessage) {
        self.handle
            .deliver(message)
            .await
            .expect("connection actor gone");
    }

    /// Next server message; panics after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("outbound queue closed")
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(window, self.outbound.recv()).await {
            panic!("expected no message, got {message:?}");
        }
    }

    /// Messages already queued, without waiting.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub async fn state(&self) -> ConnectionState {
        self.handle.state().await.expect("connection actor gone")
    }

    /// Close the socket and wait for the actor to finish teardown.
    pub async fn close(&mut self) {
        self.handle.close();
        if let Some(task) = self.task.take() {
            tokio::time::timeout(RECV_TIMEOUT, task)
                .await
                .expect("actor did not exit")
                .expect("actor panicked");
        }
    }
}
