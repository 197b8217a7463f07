//! `RegistryActor` - owner of the broadcast's role assignments.
//!
//! Holds the single teacher slot and the student set. Every mutation goes
//! through this actor's mailbox, so two concurrent `addTeacher` claims are
//! decided in arrival order and exactly one wins.
//!
//! The registry never awaits a negotiation. Callers register, get the reply,
//! run their adapter, and unregister if the adapter fails.
//!
//! # Slots
//!
//! Each admitted student gets the lowest slot id not currently held. Slots
//! freed by leaving students are reused; a slot is never handed out twice
//! while held.

use crate::errors::BcError;
use crate::observability::metrics as prom;

use super::connection::ConnectionActorHandle;
use super::messages::{
    RegisteredStudent, RegistryMessage, RegistrySnapshot, StudentAdmission, StudentRelease,
    StudentSlot, TeacherTenure,
};
use super::metrics::{ActorType, MailboxMonitor};

use common::types::{ConnectionId, SlotId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RegistryActor`.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RegistryHandle {
    /// Spawn the registry actor and return a handle to it.
    ///
    /// The actor stops when `cancel_token` is cancelled.
    #[must_use]
    pub fn new(cancel_token: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Registry, "registry"));

        let actor = RegistryActor {
            receiver,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
            teacher: None,
            students: HashMap::new(),
            free_slots: BTreeSet::new(),
            next_slot: 0,
            next_term: 0,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    /// Claim the teacher role for `handle`'s connection.
    ///
    /// # Errors
    ///
    /// - `RoleConflict` if another connection is teacher
    /// - `RoleHeld` if this connection already holds a role
    pub async fn try_register_teacher(&self, handle: ConnectionActorHandle) -> Result<(), BcError> {
        self.request(|respond_to| RegistryMessage::RegisterTeacher { handle, respond_to })
            .await?
    }

    /// Admit `handle`'s connection as a student.
    ///
    /// # Errors
    ///
    /// - `NoTeacherAvailable` if no teacher is registered
    /// - `AlreadyViewing` if the connection is already a student
    /// - `RoleHeld` if the connection is the teacher
    pub async fn register_student(
        &self,
        handle: ConnectionActorHandle,
    ) -> Result<StudentAdmission, BcError> {
        self.request(|respond_to| RegistryMessage::RegisterStudent { handle, respond_to })
            .await?
    }

    /// Clear the teacher if it is `connection_id` and drain every student.
    ///
    /// Idempotent: returns an empty list if `connection_id` is not the teacher.
    pub async fn unregister_teacher(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Vec<RegisteredStudent>, BcError> {
        self.request(|respond_to| RegistryMessage::UnregisterTeacher {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Remove a student and free its slot. Idempotent.
    pub async fn unregister_student(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<StudentRelease>, BcError> {
        self.request(|respond_to| RegistryMessage::UnregisterStudent {
            connection_id,
            respond_to,
        })
        .await
    }

    pub async fn current_teacher(&self) -> Result<Option<ConnectionId>, BcError> {
        self.request(|respond_to| RegistryMessage::CurrentTeacher { respond_to })
            .await
    }

    /// Students ordered by slot.
    pub async fn current_students(&self) -> Result<Vec<StudentSlot>, BcError> {
        self.request(|respond_to| RegistryMessage::CurrentStudents { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, BcError> {
        self.request(|respond_to| RegistryMessage::Snapshot { respond_to })
            .await
    }

    /// Stop the registry actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, BcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| BcError::Internal(format!("registry send failed: {e}")))?;
        self.mailbox.record_enqueue();

        rx.await
            .map_err(|e| BcError::Internal(format!("registry response failed: {e}")))
    }
}

struct TeacherEntry {
    connection_id: ConnectionId,
    handle: ConnectionActorHandle,
    term: u64,
}

impl TeacherEntry {
    fn tenure(&self) -> TeacherTenure {
        TeacherTenure {
            teacher: self.connection_id,
            term: self.term,
        }
    }
}

struct StudentEntry {
    slot_id: SlotId,
    handle: ConnectionActorHandle,
    tenure: TeacherTenure,
}

/// The registry actor. Owns all role state.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    teacher: Option<TeacherEntry>,
    students: HashMap<ConnectionId, StudentEntry>,
    /// Released slots below `next_slot`.
    free_slots: BTreeSet<u32>,
    next_slot: u32,
    next_term: u64,
}

impl RegistryActor {
    #[instrument(skip_all, name = "bc.actor.registry")]
    async fn run(mut self) {
        debug!(target: "bc.actor.registry", "RegistryActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "bc.actor.registry",
                        "RegistryActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            self.handle_message(message);
                        }
                        None => {
                            debug!(target: "bc.actor.registry", "Registry channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "bc.actor.registry",
            teacher_present = self.teacher.is_some(),
            students = self.students.len(),
            "RegistryActor stopped"
        );
    }

    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::RegisterTeacher { handle, respond_to } => {
                let _ = respond_to.send(self.register_teacher(handle));
            }
            RegistryMessage::RegisterStudent { handle, respond_to } => {
                let _ = respond_to.send(self.register_student(handle));
            }
            RegistryMessage::UnregisterTeacher {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.unregister_teacher(connection_id));
            }
            RegistryMessage::UnregisterStudent {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.unregister_student(connection_id));
            }
            RegistryMessage::CurrentTeacher { respond_to } => {
                let _ = respond_to.send(self.teacher.as_ref().map(|t| t.connection_id));
            }
            RegistryMessage::CurrentStudents { respond_to } => {
                let _ = respond_to.send(self.student_slots());
            }
            RegistryMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(RegistrySnapshot {
                    teacher: self.teacher.as_ref().map(|t| t.connection_id),
                    students: self.student_slots(),
                });
            }
        }
    }

    fn register_teacher(&mut self, handle: ConnectionActorHandle) -> Result<(), BcError> {
        let connection_id = handle.connection_id();

        if self.holds_role(connection_id) {
            return Err(BcError::RoleHeld);
        }
        if let Some(current) = &self.teacher {
            debug!(
                target: "bc.actor.registry",
                connection_id = %connection_id,
                current_teacher = %current.connection_id,
                "Teacher claim rejected, role occupied"
            );
            return Err(BcError::RoleConflict);
        }

        let term = self.next_term;
        self.next_term = self.next_term.wrapping_add(1);
        self.teacher = Some(TeacherEntry {
            connection_id,
            handle,
            term,
        });
        prom::set_teacher_present(true);
        info!(
            target: "bc.actor.registry",
            connection_id = %connection_id,
            term,
            "Teacher registered"
        );
        Ok(())
    }

    fn register_student(
        &mut self,
        handle: ConnectionActorHandle,
    ) -> Result<StudentAdmission, BcError> {
        let connection_id = handle.connection_id();

        if self.students.contains_key(&connection_id) {
            return Err(BcError::AlreadyViewing);
        }
        let (teacher, tenure) = match &self.teacher {
            Some(t) if t.connection_id == connection_id => return Err(BcError::RoleHeld),
            Some(t) => (t.handle.clone(), t.tenure()),
            None => return Err(BcError::NoTeacherAvailable),
        };

        let slot_id = self.allocate_slot();
        self.students.insert(
            connection_id,
            StudentEntry {
                slot_id,
                handle,
                tenure,
            },
        );
        prom::set_students_active(self.students.len());
        info!(
            target: "bc.actor.registry",
            connection_id = %connection_id,
            slot_id = %slot_id,
            students = self.students.len(),
            "Student registered"
        );

        Ok(StudentAdmission {
            slot_id,
            teacher,
            tenure,
        })
    }

    fn unregister_teacher(&mut self, connection_id: ConnectionId) -> Vec<RegisteredStudent> {
        match &self.teacher {
            Some(t) if t.connection_id == connection_id => {}
            _ => return Vec::new(),
        }
        self.teacher = None;

        let mut drained: Vec<RegisteredStudent> = self
            .students
            .drain()
            .map(|(_, entry)| RegisteredStudent {
                slot_id: entry.slot_id,
                handle: entry.handle,
                tenure: entry.tenure,
            })
            .collect();
        drained.sort_by_key(|s| s.slot_id);
        self.free_slots.clear();
        self.next_slot = 0;

        prom::set_teacher_present(false);
        prom::set_students_active(0);
        info!(
            target: "bc.actor.registry",
            connection_id = %connection_id,
            drained = drained.len(),
            "Teacher unregistered"
        );
        drained
    }

    fn unregister_student(&mut self, connection_id: ConnectionId) -> Option<StudentRelease> {
        let entry = self.students.remove(&connection_id)?;
        self.release_slot(entry.slot_id);
        prom::set_students_active(self.students.len());
        debug!(
            target: "bc.actor.registry",
            connection_id = %connection_id,
            slot_id = %entry.slot_id,
            "Student unregistered"
        );

        Some(StudentRelease {
            slot_id: entry.slot_id,
            teacher: self.teacher.as_ref().map(|t| t.handle.clone()),
        })
    }

    fn holds_role(&self, connection_id: ConnectionId) -> bool {
        self.teacher
            .as_ref()
            .is_some_and(|t| t.connection_id == connection_id)
            || self.students.contains_key(&connection_id)
    }

    fn allocate_slot(&mut self) -> SlotId {
        if let Some(slot) = self.free_slots.pop_first() {
            return SlotId(slot);
        }
        let slot = self.next_slot;
        self.next_slot = self.next_slot.saturating_add(1);
        SlotId(slot)
    }

    fn release_slot(&mut self, slot_id: SlotId) {
        if slot_id.0.saturating_add(1) == self.next_slot {
            // Shrink past the top, then past any free slots now at the top.
            self.next_slot = slot_id.0;
            while self.next_slot > 0 && self.free_slots.remove(&(self.next_slot - 1)) {
                self.next_slot -= 1;
            }
        } else {
            self.free_slots.insert(slot_id.0);
        }
    }

    fn student_slots(&self) -> Vec<StudentSlot> {
        let mut slots: Vec<StudentSlot> = self
            .students
            .iter()
            .map(|(connection_id, entry)| StudentSlot {
                connection_id: *connection_id,
                slot_id: entry.slot_id,
            })
            .collect();
        slots.sort_by_key(|s| s.slot_id);
        slots
    }
}
