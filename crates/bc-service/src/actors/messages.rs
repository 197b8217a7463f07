//! Message types for actor communication.
//!
//! Request/response messages carry a `oneshot::Sender` named `respond_to`.

use crate::errors::BcError;
use crate::protocol::ClientMessage;

use super::connection::ConnectionActorHandle;

use common::types::{ConnectionId, SlotId};
use serde::Serialize;
use tokio::sync::oneshot;

// ============================================================================
// Connection actor messages
// ============================================================================

/// Messages delivered to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// A decoded frame from this connection's client.
    Inbound { message: ClientMessage },

    /// The teacher this student was viewing has left.
    ///
    /// Carries the tenure the student was admitted under; a notice for an
    /// earlier tenure is stale and ignored.
    TeacherLeft { tenure: TeacherTenure },

    /// Roster notice for a teacher: a viewer took `slot_id`.
    StudentJoined { slot_id: SlotId },

    /// Roster notice for a teacher: a viewer released `slot_id`.
    StudentLeft { slot_id: SlotId },

    /// Report the current session state.
    GetState {
        respond_to: oneshot::Sender<ConnectionState>,
    },
}

/// Negotiation phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Connected, no role claimed.
    Idle,
    /// Role admitted by the registry, offer is with the adapter.
    OfferSent,
    /// Answer delivered to the client.
    Answered,
    /// Local candidate gathering started.
    Active,
    /// Session ended; the socket may claim a role again.
    Closed,
}

impl Phase {
    /// Whether the connection currently holds a role.
    #[must_use]
    pub const fn in_session(&self) -> bool {
        matches!(self, Phase::OfferSent | Phase::Answered | Phase::Active)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::OfferSent => "offer_sent",
            Phase::Answered => "answered",
            Phase::Active => "active",
            Phase::Closed => "closed",
        }
    }
}

/// Point-in-time view of a connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub connection_id: ConnectionId,
    pub phase: Phase,
    pub role: common::types::Role,
    pub slot_id: Option<SlotId>,
}

// ============================================================================
// Registry actor messages
// ============================================================================

/// Messages delivered to the `RegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    RegisterTeacher {
        handle: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<(), BcError>>,
    },

    RegisterStudent {
        handle: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<StudentAdmission, BcError>>,
    },

    /// Returns the students drained from the registry.
    UnregisterTeacher {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Vec<RegisteredStudent>>,
    },

    UnregisterStudent {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<StudentRelease>>,
    },

    CurrentTeacher {
        respond_to: oneshot::Sender<Option<ConnectionId>>,
    },

    CurrentStudents {
        respond_to: oneshot::Sender<Vec<StudentSlot>>,
    },

    Snapshot {
        respond_to: oneshot::Sender<RegistrySnapshot>,
    },
}

/// One teacher's continuous hold on the role.
///
/// `term` increases with every successful teacher registration, so a
/// connection that leaves and reclaims the role starts a new tenure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeacherTenure {
    pub teacher: ConnectionId,
    pub term: u64,
}

/// Result of a successful student registration.
#[derive(Debug, Clone)]
pub struct StudentAdmission {
    pub slot_id: SlotId,
    /// Teacher the student was admitted under, for roster notices.
    pub teacher: ConnectionActorHandle,
    pub tenure: TeacherTenure,
}

/// A student removed from the registry.
#[derive(Debug, Clone)]
pub struct StudentRelease {
    pub slot_id: SlotId,
    /// Teacher at the time of release, if any.
    pub teacher: Option<ConnectionActorHandle>,
}

/// A student entry drained when the teacher left.
#[derive(Debug, Clone)]
pub struct RegisteredStudent {
    pub slot_id: SlotId,
    pub handle: ConnectionActorHandle,
    /// Tenure the student was admitted under.
    pub tenure: TeacherTenure,
}

/// Student connection and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StudentSlot {
    pub connection_id: ConnectionId,
    pub slot_id: SlotId,
}

/// Registry contents at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub teacher: Option<ConnectionId>,
    /// Ordered by slot.
    pub students: Vec<StudentSlot>,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teacher.is_none() && self.students.is_empty()
    }
}
