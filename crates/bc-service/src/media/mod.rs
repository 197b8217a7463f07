//! Media negotiation boundary.
//!
//! The signaling core never touches media. It drives one
//! [`NegotiationAdapter`] per connection session, created by a
//! [`MediaBackend`]:
//!
//! ```text
//! ConnectionActor ──create_answer(offer)──▶ NegotiationAdapter ──▶ media server
//!        ▲                                          │
//!        └──────── iceCandidate ◀── CandidateSink ◀─┘ (local candidates)
//! ```
//!
//! Topology: a single shared publisher feed. The backend connects the
//! presenter's endpoint to every viewer endpoint it creates, so admitting a
//! viewer never requires renegotiating the presenter.

pub mod dry_run;

pub use dry_run::DryRunBackend;

use crate::config::MediaBackendKind;
use crate::protocol::{IceCandidate, ServerMessage};
use async_trait::async_trait;
use common::types::{ConnectionId, SlotId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors reported by a negotiation adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The media side refused the offer.
    #[error("Offer rejected: {0}")]
    OfferRejected(String),

    /// The media side refused a remote candidate.
    #[error("Candidate rejected: {0}")]
    CandidateRejected(String),

    /// The adapter was already disposed.
    #[error("Adapter disposed")]
    Disposed,
}

/// Per-peer negotiation handle.
///
/// Owned exclusively by one connection actor. `dispose` must be idempotent
/// and safe to call while an answer is still pending elsewhere. Must be `Sync`:
/// the spawned actor future holds `&self` across awaits.
#[async_trait]
pub trait NegotiationAdapter: Send + Sync {
    /// Process the client's offer and produce the SDP answer.
    async fn create_answer(&mut self, sdp_offer: &str) -> Result<String, NegotiationError>;

    /// Hand a remote ICE candidate to the media side.
    async fn add_remote_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError>;

    /// Start gathering local candidates; they arrive through the [`CandidateSink`].
    async fn gather_candidates(&mut self) -> Result<(), NegotiationError>;

    /// Release media resources.
    async fn dispose(&mut self);
}

/// Factory for negotiation adapters.
pub trait MediaBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Adapter for the publishing side.
    fn presenter(
        &self,
        connection_id: ConnectionId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter>;

    /// Adapter for a viewer occupying `slot_id`, fed from the current presenter.
    fn viewer(
        &self,
        connection_id: ConnectionId,
        slot_id: SlotId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter>;
}

/// Build the configured backend.
#[must_use]
pub fn build_backend(kind: MediaBackendKind) -> Arc<dyn MediaBackend> {
    match kind {
        MediaBackendKind::DryRun => Arc::new(DryRunBackend::new()),
    }
}

/// Forwards locally gathered candidates to the client as `iceCandidate`.
///
/// Bound to one negotiation session: once the session token is cancelled
/// (stop, teardown), late candidates are dropped instead of reaching a client
/// that already moved on.
#[derive(Debug, Clone)]
pub struct CandidateSink {
    connection_id: ConnectionId,
    outbound: mpsc::Sender<ServerMessage>,
    session_token: CancellationToken,
}

impl CandidateSink {
    /// Create a sink for one session.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerMessage>,
        session_token: CancellationToken,
    ) -> Self {
        Self {
            connection_id,
            outbound,
            session_token,
        }
    }

    /// Emit one local candidate. Returns false if it was dropped.
    pub fn emit(&self, candidate: IceCandidate) -> bool {
        if self.session_token.is_cancelled() {
            debug!(
                target: "bc.media",
                connection_id = %self.connection_id,
                "Dropping local candidate for closed session"
            );
            return false;
        }

        match self.outbound.try_send(ServerMessage::IceCandidate { candidate }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    target: "bc.media",
                    connection_id = %self.connection_id,
                    "Outbound queue full, dropping local candidate"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn candidate(n: u16) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 UDP 1 10.0.0.1 5000 typ host"),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }

    #[tokio::test]
    async fn test_sink_forwards_as_ice_candidate() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = CandidateSink::new(ConnectionId::new(), tx, CancellationToken::new());

        assert!(sink.emit(candidate(1)));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, ServerMessage::IceCandidate { candidate: candidate(1) });
    }

    #[tokio::test]
    async fn test_sink_drops_after_session_cancelled() {
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let sink = CandidateSink::new(ConnectionId::new(), tx, token.clone());

        token.cancel();
        assert!(!sink.emit(candidate(1)));
        assert!(rx.try_recv().is_err());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_adapter_objects_are_shareable() {
        fn assert_sync<T: Sync + ?Sized>() {}
        assert_sync::<dyn NegotiationAdapter>();
        assert_sync::<Option<Box<dyn NegotiationAdapter>>>();
    }

    #[tokio::test]
    async fn test_adapter_reference_held_across_await_is_send() {
        let (tx, _rx) = mpsc::channel(4);
        let sink = CandidateSink::new(ConnectionId::new(), tx, CancellationToken::new());
        let adapter = build_backend(MediaBackendKind::DryRun).presenter(ConnectionId::new(), sink);

        let future = async {
            let held = &adapter;
            tokio::task::yield_now().await;
            std::hint::black_box(held);
        };
        assert_send(&future);
        future.await;
    }

    #[test]
    fn test_build_backend() {
        assert_eq!(build_backend(MediaBackendKind::DryRun).name(), "dry-run");
    }

    #[tokio::test]
    async fn test_sink_drops_when_queue_full() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = CandidateSink::new(ConnectionId::new(), tx, CancellationToken::new());

        assert!(sink.emit(candidate(1)));
        assert!(!sink.emit(candidate(2)));
    }
}
