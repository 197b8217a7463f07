//! Mock media backend.
//!
//! Can be configured to:
//! - Fail answer creation (all peers, or viewers only)
//! - Delay answers, or never answer at all
//! - Emit scripted local candidates when gathering starts
//! - Reject remote candidates, or accept them slowly
//!
//! Every call is recorded in a shared [`MediaLog`].
//!
//! # Example
//!
//! ```rust,ignore
//! use bc_test_utils::MockMediaBackend;
//!
//! let backend = MockMediaBackend::builder()
//!     .fail_viewer_answers()
//!     .local_candidates(vec![host_candidate(1)])
//!     .build();
//! let log = backend.log();
//! ```

use async_trait::async_trait;
use bc_service::media::{CandidateSink, MediaBackend, NegotiationAdapter, NegotiationError};
use bc_service::protocol::IceCandidate;
use common::types::{ConnectionId, SlotId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Record of every adapter call.
#[derive(Debug, Default)]
pub struct MediaLog {
    presenters: AtomicUsize,
    viewers: AtomicUsize,
    answers: AtomicUsize,
    gathers: AtomicUsize,
    disposed: AtomicUsize,
    offers: Mutex<Vec<(ConnectionId, String)>>,
    remote_candidates: Mutex<Vec<(ConnectionId, IceCandidate)>>,
}

impl MediaLog {
    /// Presenter adapters created.
    #[must_use]
    pub fn presenters(&self) -> usize {
        self.presenters.load(Ordering::SeqCst)
    }

    /// Viewer adapters created.
    #[must_use]
    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }

    /// Answers successfully produced.
    #[must_use]
    pub fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    /// `gather_candidates` calls.
    #[must_use]
    pub fn gathers(&self) -> usize {
        self.gathers.load(Ordering::SeqCst)
    }

    /// Adapters disposed (each adapter counts once).
    #[must_use]
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Offers received, in order.
    #[must_use]
    pub fn offers(&self) -> Vec<(ConnectionId, String)> {
        self.offers.lock().unwrap().clone()
    }

    /// Remote candidates handed to `connection_id`'s adapters, in order.
    #[must_use]
    pub fn remote_candidates_for(&self, connection_id: ConnectionId) -> Vec<IceCandidate> {
        self.remote_candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == connection_id)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    fail_answers: bool,
    fail_viewer_answers: bool,
    hang_answers: bool,
    answer_delay: Option<Duration>,
    local_candidates: Vec<IceCandidate>,
    reject_remote_candidates: bool,
    candidate_delay: Option<Duration>,
}

/// Mock backend for signaling tests.
#[derive(Debug, Clone, Default)]
pub struct MockMediaBackend {
    behavior: Behavior,
    log: Arc<MediaLog>,
}

impl MockMediaBackend {
    /// Backend that answers every offer immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> MockMediaBackendBuilder {
        MockMediaBackendBuilder::default()
    }

    /// Shared call log.
    #[must_use]
    pub fn log(&self) -> Arc<MediaLog> {
        Arc::clone(&self.log)
    }

    fn adapter(&self, connection_id: ConnectionId, sink: CandidateSink, viewer: bool) -> MockAdapter {
        MockAdapter {
            connection_id,
            sink,
            fail_answer: self.behavior.fail_answers || (viewer && self.behavior.fail_viewer_answers),
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
            disposed: false,
        }
    }
}

impl MediaBackend for MockMediaBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn presenter(
        &self,
        connection_id: ConnectionId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter> {
        self.log.presenters.fetch_add(1, Ordering::SeqCst);
        Box::new(self.adapter(connection_id, sink, false))
    }

    fn viewer(
        &self,
        connection_id: ConnectionId,
        _slot_id: SlotId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter> {
        self.log.viewers.fetch_add(1, Ordering::SeqCst);
        Box::new(self.adapter(connection_id, sink, true))
    }
}

/// Builder for [`MockMediaBackend`].
#[derive(Debug, Default)]
pub struct MockMediaBackendBuilder {
    behavior: Behavior,
}

impl MockMediaBackendBuilder {
    /// Every answer fails.
    #[must_use]
    pub fn fail_answers(mut self) -> Self {
        self.behavior.fail_answers = true;
        self
    }

    /// Viewer answers fail; presenters succeed.
    #[must_use]
    pub fn fail_viewer_answers(mut self) -> Self {
        self.behavior.fail_viewer_answers = true;
        self
    }

    /// Answers never complete.
    #[must_use]
    pub fn hang_answers(mut self) -> Self {
        self.behavior.hang_answers = true;
        self
    }

    /// Answers complete after `delay`.
    #[must_use]
    pub fn answer_delay(mut self, delay: Duration) -> Self {
        self.behavior.answer_delay = Some(delay);
        self
    }

    /// Candidates emitted through the sink when gathering starts.
    #[must_use]
    pub fn local_candidates(mut self, candidates: Vec<IceCandidate>) -> Self {
        self.behavior.local_candidates = candidates;
        self
    }

    /// Each `add_remote_ice_candidate` takes `delay`.
    #[must_use]
    pub fn candidate_delay(mut self, delay: Duration) -> Self {
        self.behavior.candidate_delay = Some(delay);
        self
    }

    /// `add_remote_ice_candidate` always fails.
    #[must_use]
    pub fn reject_remote_candidates(mut self) -> Self {
        self.behavior.reject_remote_candidates = true;
        self
    }

    #[must_use]
    pub fn build(self) -> MockMediaBackend {
        MockMediaBackend {
            behavior: self.behavior,
            log: Arc::new(MediaLog::default()),
        }
    }
}

struct MockAdapter {
    connection_id: ConnectionId,
    sink: CandidateSink,
    fail_answer: bool,
    behavior: Behavior,
    log: Arc<MediaLog>,
    disposed: bool,
}

#[async_trait]
impl NegotiationAdapter for MockAdapter {
    async fn create_answer(&mut self, sdp_offer: &str) -> Result<String, NegotiationError> {
        self.log
            .offers
            .lock()
            .unwrap()
            .push((self.connection_id, sdp_offer.to_string()));

        if self.behavior.hang_answers {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.behavior.answer_delay {
            tokio::time::sleep(delay).await;
        }
        if self.disposed {
            return Err(NegotiationError::Disposed);
        }
        if self.fail_answer {
            return Err(NegotiationError::OfferRejected(
                "scripted answer failure".to_string(),
            ));
        }

        self.log.answers.fetch_add(1, Ordering::SeqCst);
        Ok(mock_answer(self.connection_id))
    }

    async fn add_remote_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        if let Some(delay) = self.behavior.candidate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.reject_remote_candidates {
            return Err(NegotiationError::CandidateRejected(
                "scripted candidate rejection".to_string(),
            ));
        }
        self.log
            .remote_candidates
            .lock()
            .unwrap()
            .push((self.connection_id, candidate));
        Ok(())
    }

    async fn gather_candidates(&mut self) -> Result<(), NegotiationError> {
        self.log.gathers.fetch_add(1, Ordering::SeqCst);
        for candidate in &self.behavior.local_candidates {
            self.sink.emit(candidate.clone());
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.log.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// The answer the mock produces for `connection_id`.
#[must_use]
pub fn mock_answer(connection_id: ConnectionId) -> String {
    format!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-{connection_id}\r\nt=0 0\r\n")
}
