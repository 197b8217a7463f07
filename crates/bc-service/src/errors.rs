//! Broadcast Controller error types.
//!
//! Error types map to the rejection reasons sent back to clients.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Client-visible reason for a rejected teacher claim.
pub const MSG_ALREADY_OCCUPIED: &str =
    "Another user is currently acting as sender. Try again later ...";

/// Client-visible reason for a student joining before any teacher.
pub const MSG_NO_TEACHER: &str = "No active sender now. Become sender or try again later ...";

/// Client-visible reason for a duplicate student registration.
pub const MSG_ALREADY_VIEWING: &str = "You are already viewing in this session. \
     Use a different browser to add additional students.";

/// Client-visible reason for claiming a second role on one connection.
pub const MSG_ROLE_HELD: &str =
    "This connection already holds a role. Stop it before claiming another.";

/// Client-visible message for any unexpected failure.
pub const MSG_UNKNOWN_ERROR: &str = "unknown error";

/// Broadcast Controller error type.
#[derive(Debug, Error)]
pub enum BcError {
    /// Another connection already holds the teacher role.
    #[error("Teacher role already occupied")]
    RoleConflict,

    /// This connection already holds a role and tried to claim another.
    #[error("Connection already holds a role")]
    RoleHeld,

    /// A student tried to join before any teacher registered.
    #[error("No teacher available")]
    NoTeacherAvailable,

    /// The connection is already registered as a student.
    #[error("Connection already viewing")]
    AlreadyViewing,

    /// The negotiation adapter could not produce an answer.
    #[error("Negotiation failed: {0}")]
    NegotiationFailure(String),

    /// The client channel went away.
    #[error("Channel closed")]
    ChannelClosed,

    /// Internal error (actor mailbox failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors decoding an inbound protocol message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The `id` field named a message kind we do not handle.
    #[error("Unrecognized message kind: {0}")]
    UnknownKind(String),

    /// The frame was not a well-formed message.
    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl BcError {
    /// Returns a short machine-readable reason code, used in logs and metric labels.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            BcError::RoleConflict => "already-occupied",
            BcError::RoleHeld => "role-held",
            BcError::NoTeacherAvailable => "no-teacher",
            BcError::AlreadyViewing => "already-viewing",
            BcError::NegotiationFailure(_) => "negotiation-failure",
            BcError::ChannelClosed => "channel-closed",
            BcError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BcError::RoleConflict => MSG_ALREADY_OCCUPIED.to_string(),
            BcError::RoleHeld => MSG_ROLE_HELD.to_string(),
            BcError::NoTeacherAvailable => MSG_NO_TEACHER.to_string(),
            BcError::AlreadyViewing => MSG_ALREADY_VIEWING.to_string(),
            BcError::NegotiationFailure(_) | BcError::ChannelClosed | BcError::Internal(_) => {
                MSG_UNKNOWN_ERROR.to_string()
            }
        }
    }
}
