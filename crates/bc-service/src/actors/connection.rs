//! `ConnectionActor` - per-socket signaling state machine.
//!
//! Each `ConnectionActor`:
//! - Handles exactly one signaling socket
//! - Holds at most one role (teacher or student) at a time
//! - Owns that session's `NegotiationAdapter`
//! - Writes every outbound message for its client
//!
//! # Phases
//!
//! ```text
//! Idle ──claim──▶ OfferSent ──answer──▶ Answered ──gather──▶ Active
//!   ▲                │                                         │
//!   │                └──── failure / stop / teacher-left ──────┤
//!   │                                                          ▼
//!   └────────────────────── claim again ◀──────────────────  Closed
//! ```
//!
//! While the adapter is producing an answer the actor keeps reading its
//! mailbox. `stop`, teacher-left and cancellation interrupt the negotiation;
//! remote candidates are buffered and flushed after the answer; everything
//! else is replayed in arrival order once the negotiation settles.
//!
//! # Lifecycle
//!
//! Created by the transport when a socket is accepted and runs until its
//! token is cancelled (socket closed or server shutdown). Teardown always
//! runs on exit.

use crate::errors::BcError;
use crate::media::{CandidateSink, MediaBackend, NegotiationAdapter, NegotiationError};
use crate::observability::metrics as prom;
use crate::protocol::{ClientMessage, IceCandidate, ServerMessage};

use super::fanout;
use super::messages::{ConnectionMessage, ConnectionState, Phase, TeacherTenure};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::registry::RegistryHandle;

use common::types::{ConnectionId, Role, SlotId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Remote candidates held while an answer is pending.
const MAX_PENDING_CANDIDATES: usize = 128;

/// Other messages held while an answer is pending.
const MAX_DEFERRED_MESSAGES: usize = 32;

/// Shared dependencies for every connection actor.
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: RegistryHandle,
    pub backend: Arc<dyn MediaBackend>,
    pub metrics: Arc<ActorMetrics>,
    /// Mailbox capacity per connection.
    pub mailbox_capacity: usize,
    /// Upper bound on answer creation.
    pub negotiation_timeout: Duration,
}

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    /// A handle with no actor behind it.
    ///
    /// Messages sent to the handle are readable from the returned receiver.
    /// Used where only the registry side of a connection matters.
    #[must_use]
    pub fn detached() -> (Self, mpsc::Receiver<ConnectionMessage>) {
        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(64);
        let handle = Self {
            sender,
            cancel_token: CancellationToken::new(),
            connection_id,
            mailbox: Arc::new(MailboxMonitor::new(
                ActorType::Connection,
                connection_id.to_string(),
            )),
        };
        (handle, receiver)
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Deliver a decoded client frame, waiting for mailbox space.
    ///
    /// # Errors
    ///
    /// `ChannelClosed` if the actor has exited.
    pub async fn deliver(&self, message: ClientMessage) -> Result<(), BcError> {
        self.sender
            .send(ConnectionMessage::Inbound { message })
            .await
            .map_err(|_| BcError::ChannelClosed)?;
        self.mailbox.record_enqueue();
        Ok(())
    }

    /// Best-effort notice from another actor. Returns false if dropped.
    ///
    /// Never waits: actors notify each other in both directions, and a
    /// blocking send could deadlock two full mailboxes.
    pub fn notify(&self, message: ConnectionMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Tell a student that `tenure` ended. Never dropped while the actor lives.
    pub fn notify_teacher_left(&self, tenure: TeacherTenure) {
        match self.sender.try_send(ConnectionMessage::TeacherLeft { tenure }) {
            Ok(()) => self.mailbox.record_enqueue(),
            Err(TrySendError::Full(message)) => {
                let sender = self.sender.clone();
                let mailbox = Arc::clone(&self.mailbox);
                tokio::spawn(async move {
                    if sender.send(message).await.is_ok() {
                        mailbox.record_enqueue();
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Current phase, role and slot.
    pub async fn state(&self) -> Result<ConnectionState, BcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ConnectionMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| BcError::ChannelClosed)?;
        self.mailbox.record_enqueue();

        rx.await.map_err(|_| BcError::ChannelClosed)
    }

    /// Close the connection. The actor tears down and exits.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

enum NegotiationOutcome {
    Answer(Result<String, NegotiationError>),
    TimedOut,
    Interrupted(Interrupt),
}

#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Stop,
    TeacherLeft,
    Closed,
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: ConnectionId,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    /// Our own handle, registered with the registry on a role claim.
    self_handle: ConnectionActorHandle,
    ctx: ConnectionContext,
    outbound: mpsc::Sender<ServerMessage>,
    mailbox: Arc<MailboxMonitor>,
    phase: Phase,
    role: Role,
    slot_id: Option<SlotId>,
    /// Teacher this student was admitted under.
    teacher: Option<ConnectionActorHandle>,
    tenure: Option<TeacherTenure>,
    adapter: Option<Box<dyn NegotiationAdapter>>,
    /// Cancelled when the session ends; silences the candidate sink.
    session_token: Option<CancellationToken>,
    /// Messages that arrived during a negotiation, replayed afterwards.
    deferred: VecDeque<ConnectionMessage>,
}

impl ConnectionActor {
    /// Spawn a connection actor writing to `outbound`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        cancel_token: CancellationToken,
        outbound: mpsc::Sender<ServerMessage>,
        ctx: ConnectionContext,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ctx.mailbox_capacity.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.to_string(),
        ));

        let handle = ConnectionActorHandle {
            sender,
            cancel_token: cancel_token.clone(),
            connection_id,
            mailbox: Arc::clone(&mailbox),
        };

        ctx.metrics.connection_created();

        let actor = Self {
            connection_id,
            receiver,
            cancel_token,
            self_handle: handle.clone(),
            ctx,
            outbound,
            mailbox,
            phase: Phase::Idle,
            role: Role::Unassigned,
            slot_id: None,
            teacher: None,
            tenure: None,
            adapter: None,
            session_token: None,
            deferred: VecDeque::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "bc.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            let message = if let Some(message) = self.deferred.pop_front() {
                message
            } else {
                tokio::select! {
                    () = self.cancel_token.cancelled() => {
                        debug!(
                            target: "bc.actor.connection",
                            connection_id = %self.connection_id,
                            "ConnectionActor received cancellation signal"
                        );
                        break;
                    }

                    msg = self.receiver.recv() => {
                        let Some(message) = msg else { break };
                        self.mailbox.record_dequeue();
                        message
                    }
                }
            };

            self.handle_message(message).await;
            self.ctx.metrics.record_message_processed();
        }

        self.end_session("closed").await;
        self.ctx.metrics.connection_closed();

        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ConnectionMessage) {
        match message {
            ConnectionMessage::Inbound { message } => self.handle_client_message(message).await,
            ConnectionMessage::TeacherLeft { tenure } => self.handle_teacher_left(tenure).await,
            ConnectionMessage::StudentJoined { slot_id } => {
                self.forward_roster(ServerMessage::AddStudentToTeacher { slot_id })
                    .await;
            }
            ConnectionMessage::StudentLeft { slot_id } => {
                self.forward_roster(ServerMessage::RemoveStudentToTeacher { slot_id })
                    .await;
            }
            ConnectionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    async fn handle_client_message(&mut self, message: ClientMessage) {
        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            kind = message.kind(),
            phase = self.phase.as_str(),
            "Client message"
        );

        match message {
            ClientMessage::AddTeacher { sdp_offer } => self.claim_teacher(sdp_offer).await,
            ClientMessage::AddStudent { sdp_offer } => self.claim_student(sdp_offer).await,
            ClientMessage::OnIceCandidate { candidate } => {
                self.add_remote_candidate(candidate).await;
            }
            ClientMessage::Stop => {
                if self.phase.in_session() {
                    self.end_session("stop").await;
                } else {
                    debug!(
                        target: "bc.actor.connection",
                        connection_id = %self.connection_id,
                        "Stop outside a session ignored"
                    );
                }
            }
        }
    }

    async fn claim_teacher(&mut self, sdp_offer: String) {
        if self.phase.in_session() {
            self.reject(Role::Teacher, &BcError::RoleHeld).await;
            return;
        }

        if let Err(e) = self
            .ctx
            .registry
            .try_register_teacher(self.self_handle.clone())
            .await
        {
            self.reject(Role::Teacher, &e).await;
            return;
        }

        prom::record_role_claim(Role::Teacher.as_str(), true, "none");
        let sink = self.begin_session(Role::Teacher, None);
        let adapter = self.ctx.backend.presenter(self.connection_id, sink);
        self.negotiate(adapter, sdp_offer).await;
    }

    async fn claim_student(&mut self, sdp_offer: String) {
        if self.phase.in_session() {
            let error = if self.role == Role::Student {
                BcError::AlreadyViewing
            } else {
                BcError::RoleHeld
            };
            self.reject(Role::Student, &error).await;
            return;
        }

        let admission = match self
            .ctx
            .registry
            .register_student(self.self_handle.clone())
            .await
        {
            Ok(admission) => admission,
            Err(e) => {
                self.reject(Role::Student, &e).await;
                return;
            }
        };

        prom::record_role_claim(Role::Student.as_str(), true, "none");
        self.teacher = Some(admission.teacher);
        self.tenure = Some(admission.tenure);
        let sink = self.begin_session(Role::Student, Some(admission.slot_id));
        let adapter = self
            .ctx
            .backend
            .viewer(self.connection_id, admission.slot_id, sink);
        self.negotiate(adapter, sdp_offer).await;
    }

    fn begin_session(&mut self, role: Role, slot_id: Option<SlotId>) -> CandidateSink {
        let session_token = self.cancel_token.child_token();
        let sink = CandidateSink::new(
            self.connection_id,
            self.outbound.clone(),
            session_token.clone(),
        );

        self.session_token = Some(session_token);
        self.role = role;
        self.slot_id = slot_id;
        self.phase = Phase::OfferSent;
        sink
    }

    async fn reject(&self, role: Role, error: &BcError) {
        prom::record_role_claim(role.as_str(), false, error.reason_code());
        info!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            role = role.as_str(),
            reason = error.reason_code(),
            "Role claim rejected"
        );
        self.send_to_client(rejection(role, error)).await;
    }

    /// Run answer creation while still servicing the mailbox.
    async fn negotiate(&mut self, mut adapter: Box<dyn NegotiationAdapter>, sdp_offer: String) {
        let started = Instant::now();
        let timeout = self.ctx.negotiation_timeout;
        let mut pending_candidates: Vec<IceCandidate> = Vec::new();

        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            role = self.role.as_str(),
            offer_len = sdp_offer.len(),
            "Creating answer"
        );

        let outcome = {
            let answer = adapter.create_answer(&sdp_offer);
            tokio::pin!(answer);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    result = &mut answer => break NegotiationOutcome::Answer(result),

                    () = &mut deadline => break NegotiationOutcome::TimedOut,

                    () = self.cancel_token.cancelled() => {
                        break NegotiationOutcome::Interrupted(Interrupt::Closed);
                    }

                    msg = self.receiver.recv() => {
                        let Some(message) = msg else {
                            break NegotiationOutcome::Interrupted(Interrupt::Closed);
                        };
                        self.mailbox.record_dequeue();

                        match message {
                            ConnectionMessage::Inbound { message: ClientMessage::Stop } => {
                                break NegotiationOutcome::Interrupted(Interrupt::Stop);
                            }
                            ConnectionMessage::TeacherLeft { tenure }
                                if self.tenure == Some(tenure) =>
                            {
                                break NegotiationOutcome::Interrupted(Interrupt::TeacherLeft);
                            }
                            ConnectionMessage::TeacherLeft { tenure } => {
                                self.ignore_stale_teacher_left(tenure);
                            }
                            ConnectionMessage::Inbound {
                                message: ClientMessage::OnIceCandidate { candidate },
                            } => {
                                if pending_candidates.len() < MAX_PENDING_CANDIDATES {
                                    pending_candidates.push(candidate);
                                } else {
                                    self.drop_during_negotiation("onIceCandidate");
                                }
                            }
                            ConnectionMessage::GetState { respond_to } => {
                                let _ = respond_to.send(self.state());
                            }
                            other => {
                                if self.deferred.len() < MAX_DEFERRED_MESSAGES {
                                    self.deferred.push_back(other);
                                } else {
                                    self.drop_during_negotiation(message_kind(&other));
                                }
                            }
                        }
                    }
                }
            }
        };

        match outcome {
            NegotiationOutcome::Answer(Ok(sdp_answer)) => {
                prom::record_negotiation_duration(self.role.as_str(), started.elapsed());
                self.complete_negotiation(adapter, sdp_answer, pending_candidates)
                    .await;
            }
            NegotiationOutcome::Answer(Err(e)) => {
                self.fail_negotiation(adapter, BcError::NegotiationFailure(e.to_string()))
                    .await;
            }
            NegotiationOutcome::TimedOut => {
                let error = BcError::NegotiationFailure(format!(
                    "no answer within {}s",
                    timeout.as_secs_f32()
                ));
                self.fail_negotiation(adapter, error).await;
            }
            NegotiationOutcome::Interrupted(interrupt) => {
                debug!(
                    target: "bc.actor.connection",
                    connection_id = %self.connection_id,
                    interrupt = ?interrupt,
                    "Negotiation interrupted"
                );
                self.adapter = Some(adapter);
                match interrupt {
                    Interrupt::Stop => self.end_session("stop").await,
                    Interrupt::TeacherLeft => self.stop_for_teacher_left().await,
                    Interrupt::Closed => self.end_session("closed").await,
                }
            }
        }
    }

    async fn complete_negotiation(
        &mut self,
        mut adapter: Box<dyn NegotiationAdapter>,
        sdp_answer: String,
        pending_candidates: Vec<IceCandidate>,
    ) {
        let response = match (self.role, self.slot_id) {
            (Role::Student, Some(slot_id)) => ServerMessage::student_accepted(sdp_answer, slot_id),
            _ => ServerMessage::teacher_accepted(sdp_answer),
        };
        self.send_to_client(response).await;
        self.phase = Phase::Answered;

        for candidate in pending_candidates {
            if let Err(e) = adapter.add_remote_ice_candidate(candidate).await {
                warn!(
                    target: "bc.actor.connection",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Buffered remote candidate rejected"
                );
            }
        }

        if let Err(e) = adapter.gather_candidates().await {
            warn!(
                target: "bc.actor.connection",
                connection_id = %self.connection_id,
                error = %e,
                "Candidate gathering failed to start"
            );
        }

        self.adapter = Some(adapter);
        self.phase = Phase::Active;

        info!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            role = self.role.as_str(),
            slot_id = ?self.slot_id.map(|s| s.0),
            "Session active"
        );

        if let (Role::Student, Some(teacher), Some(slot_id)) =
            (self.role, self.teacher.as_ref(), self.slot_id)
        {
            fanout::on_student_joined(teacher, slot_id);
        }
    }

    /// Roll back the registration, reject the claim and close.
    async fn fail_negotiation(&mut self, adapter: Box<dyn NegotiationAdapter>, error: BcError) {
        let role = self.role;
        warn!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            role = role.as_str(),
            error = %error,
            "Negotiation failed"
        );
        prom::record_negotiation_failure(role.as_str());

        self.adapter = Some(adapter);
        self.end_session(error.reason_code()).await;
        self.send_to_client(rejection(role, &error)).await;
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        let in_session = self.phase.in_session();
        match self.adapter.as_mut() {
            Some(adapter) if in_session => {
                if let Err(e) = adapter.add_remote_ice_candidate(candidate).await {
                    warn!(
                        target: "bc.actor.connection",
                        connection_id = %self.connection_id,
                        error = %e,
                        "Remote candidate rejected"
                    );
                }
            }
            _ => {
                debug!(
                    target: "bc.actor.connection",
                    connection_id = %self.connection_id,
                    phase = self.phase.as_str(),
                    "Candidate outside a session dropped"
                );
            }
        }
    }

    async fn handle_teacher_left(&mut self, tenure: TeacherTenure) {
        if self.role != Role::Student || !self.phase.in_session() {
            debug!(
                target: "bc.actor.connection",
                connection_id = %self.connection_id,
                "Teacher-left notice ignored"
            );
            return;
        }
        if self.tenure != Some(tenure) {
            self.ignore_stale_teacher_left(tenure);
            return;
        }

        self.stop_for_teacher_left().await;
    }

    /// A notice from a tenure this connection is no longer viewing under.
    fn ignore_stale_teacher_left(&self, tenure: TeacherTenure) {
        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            teacher = %tenure.teacher,
            term = tenure.term,
            "Stale teacher-left notice ignored"
        );
    }

    fn drop_during_negotiation(&self, kind: &'static str) {
        self.mailbox.record_drop();
        debug!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            kind,
            "Negotiation buffer full, message dropped"
        );
    }

    /// The registry already drained this student under its tenure.
    async fn stop_for_teacher_left(&mut self) {
        self.send_to_client(ServerMessage::StopCommunication).await;
        prom::record_stop_communication();
        self.close_session("teacher-left").await;
    }

    async fn forward_roster(&self, notice: ServerMessage) {
        if self.role == Role::Teacher && self.phase.in_session() {
            self.send_to_client(notice).await;
        } else {
            debug!(
                target: "bc.actor.connection",
                connection_id = %self.connection_id,
                kind = notice.kind(),
                "Roster notice ignored"
            );
        }
    }

    /// Leave the registry, notify affected peers and close. Idempotent.
    async fn end_session(&mut self, reason: &'static str) {
        if !self.phase.in_session() {
            return;
        }

        match self.role {
            Role::Teacher => match self.ctx.registry.unregister_teacher(self.connection_id).await {
                Ok(drained) => {
                    fanout::on_teacher_left(drained);
                }
                Err(e) => {
                    warn!(
                        target: "bc.actor.connection",
                        connection_id = %self.connection_id,
                        error = %e,
                        "Failed to unregister teacher"
                    );
                }
            },
            Role::Student => match self.ctx.registry.unregister_student(self.connection_id).await {
                // The teacher only heard about students that reached Active.
                Ok(Some(release)) if self.phase == Phase::Active => {
                    fanout::on_student_left(release.teacher.as_ref(), release.slot_id);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        target: "bc.actor.connection",
                        connection_id = %self.connection_id,
                        error = %e,
                        "Failed to unregister student"
                    );
                }
            },
            Role::Unassigned => {}
        }

        self.close_session(reason).await;
    }

    /// Dispose media state and move to `Closed`.
    async fn close_session(&mut self, reason: &'static str) {
        if let Some(token) = self.session_token.take() {
            token.cancel();
        }
        if let Some(mut adapter) = self.adapter.take() {
            adapter.dispose().await;
        }

        info!(
            target: "bc.actor.connection",
            connection_id = %self.connection_id,
            role = self.role.as_str(),
            slot_id = ?self.slot_id.map(|s| s.0),
            reason,
            "Session closed"
        );

        self.phase = Phase::Closed;
        self.role = Role::Unassigned;
        self.slot_id = None;
        self.teacher = None;
        self.tenure = None;
    }

    async fn send_to_client(&self, message: ServerMessage) {
        let kind = message.kind();
        if self.outbound.send(message).await.is_err() {
            debug!(
                target: "bc.actor.connection",
                connection_id = %self.connection_id,
                kind,
                "Client writer gone, message dropped"
            );
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState {
            connection_id: self.connection_id,
            phase: self.phase,
            role: self.role,
            slot_id: self.slot_id,
        }
    }
}

fn message_kind(message: &ConnectionMessage) -> &'static str {
    match message {
        ConnectionMessage::Inbound { message } => message.kind(),
        ConnectionMessage::TeacherLeft { .. } => "teacher-left",
        ConnectionMessage::StudentJoined { .. } => "student-joined",
        ConnectionMessage::StudentLeft { .. } => "student-left",
        ConnectionMessage::GetState { .. } => "get-state",
    }
}

fn rejection(role: Role, error: &BcError) -> ServerMessage {
    match role {
        Role::Student => ServerMessage::student_rejected(error.client_message()),
        Role::Teacher | Role::Unassigned => ServerMessage::teacher_rejected(error.client_message()),
    }
}
