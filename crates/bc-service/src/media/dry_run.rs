//! Signaling-only media backend.
//!
//! Answers every offer with a synthetic SDP that declines each offered
//! m-line (port 0, `a=inactive`) and never gathers candidates. Lets the
//! signaling plane run end to end without a media server attached.

use super::{CandidateSink, MediaBackend, NegotiationAdapter, NegotiationError};
use crate::protocol::IceCandidate;
use async_trait::async_trait;
use common::types::{ConnectionId, SlotId};
use std::fmt::Write as _;
use tracing::debug;

/// Backend producing [`DryRunAdapter`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

impl DryRunBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn presenter(
        &self,
        connection_id: ConnectionId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter> {
        Box::new(DryRunAdapter::new(connection_id, sink))
    }

    fn viewer(
        &self,
        connection_id: ConnectionId,
        _slot_id: SlotId,
        sink: CandidateSink,
    ) -> Box<dyn NegotiationAdapter> {
        Box::new(DryRunAdapter::new(connection_id, sink))
    }
}

/// Adapter that answers locally.
#[derive(Debug)]
pub struct DryRunAdapter {
    connection_id: ConnectionId,
    // Held so the session's candidate channel has an owner, even though
    // this adapter never gathers.
    _sink: CandidateSink,
    remote_candidates: usize,
    disposed: bool,
}

impl DryRunAdapter {
    fn new(connection_id: ConnectionId, sink: CandidateSink) -> Self {
        Self {
            connection_id,
            _sink: sink,
            remote_candidates: 0,
            disposed: false,
        }
    }
}

#[async_trait]
impl NegotiationAdapter for DryRunAdapter {
    async fn create_answer(&mut self, sdp_offer: &str) -> Result<String, NegotiationError> {
        if self.disposed {
            return Err(NegotiationError::Disposed);
        }
        let (session_id, _) = self.connection_id.0.as_u64_pair();
        synthesize_answer(sdp_offer, session_id)
    }

    async fn add_remote_ice_candidate(
        &mut self,
        _candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        if self.disposed {
            return Err(NegotiationError::Disposed);
        }
        self.remote_candidates += 1;
        Ok(())
    }

    async fn gather_candidates(&mut self) -> Result<(), NegotiationError> {
        if self.disposed {
            return Err(NegotiationError::Disposed);
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            debug!(
                target: "bc.media",
                connection_id = %self.connection_id,
                remote_candidates = self.remote_candidates,
                "Dry-run adapter disposed"
            );
        }
    }
}

/// Build an answer that declines every m-line of `offer`.
fn synthesize_answer(offer: &str, session_id: u64) -> Result<String, NegotiationError> {
    if !offer.trim_start().starts_with("v=0") {
        return Err(NegotiationError::OfferRejected(
            "offer is not an SDP session description".to_string(),
        ));
    }

    let mut answer = format!("v=0\r\no=- {session_id} 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n");
    let mut media_sections = 0usize;

    for line in offer.lines().map(str::trim_end) {
        if let Some(rest) = line.strip_prefix("m=") {
            let mut parts = rest.split_whitespace();
            let (Some(media), Some(_port), Some(proto)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(NegotiationError::OfferRejected(format!(
                    "malformed media line: {line}"
                )));
            };
            let formats: Vec<&str> = parts.collect();
            let _ = write!(answer, "m={media} 0 {proto} {}\r\na=inactive\r\n", formats.join(" "));
            media_sections += 1;
        } else if let Some(mid) = line.strip_prefix("a=mid:") {
            let _ = write!(answer, "a=mid:{mid}\r\n");
        }
    }

    if media_sections == 0 {
        return Err(NegotiationError::OfferRejected(
            "offer has no media sections".to_string(),
        ));
    }

    Ok(answer)
}
