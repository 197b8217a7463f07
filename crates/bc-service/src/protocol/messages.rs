//! Wire message types.
//!
//! Every message is a JSON object whose `id` field selects the kind.
//! Field names are camelCase to match the browser client.

use common::types::SlotId;
use serde::{Deserialize, Serialize};

/// An ICE candidate as exchanged with the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The `candidate:` attribute line.
    pub candidate: String,
    /// Media stream identification tag.
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Index of the m-line this candidate belongs to.
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Claim the teacher role.
    #[serde(rename_all = "camelCase")]
    AddTeacher { sdp_offer: String },

    /// Join as a viewer.
    #[serde(rename_all = "camelCase")]
    AddStudent { sdp_offer: String },

    /// Remote ICE candidate from the browser.
    OnIceCandidate { candidate: IceCandidate },

    /// Explicit leave.
    Stop,
}

impl ClientMessage {
    /// Wire kind, for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ClientMessage::AddTeacher { .. } => "addTeacher",
            ClientMessage::AddStudent { .. } => "addStudent",
            ClientMessage::OnIceCandidate { .. } => "onIceCandidate",
            ClientMessage::Stop => "stop",
        }
    }
}

/// Outcome carried by the `*Response` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Accepted,
    Rejected,
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Result of an `addTeacher` claim.
    #[serde(rename_all = "camelCase")]
    AddTeacherResponse {
        response: ResponseStatus,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sdp_answer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message: Option<String>,
    },

    /// Result of an `addStudent` join.
    #[serde(rename_all = "camelCase")]
    AddStudentResponse {
        response: ResponseStatus,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sdp_answer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        slot_id: Option<SlotId>,
    },

    /// Local ICE candidate gathered by the media side.
    IceCandidate { candidate: IceCandidate },

    /// Server-initiated teardown.
    StopCommunication,

    /// Roster notice to the teacher: a viewer took a slot.
    #[serde(rename_all = "camelCase")]
    AddStudentToTeacher { slot_id: SlotId },

    /// Roster notice to the teacher: a viewer released a slot.
    #[serde(rename_all = "camelCase")]
    RemoveStudentToTeacher { slot_id: SlotId },
}

impl ServerMessage {
    /// Accepted teacher claim.
    #[must_use]
    pub fn teacher_accepted(sdp_answer: String) -> Self {
        ServerMessage::AddTeacherResponse {
            response: ResponseStatus::Accepted,
            sdp_answer: Some(sdp_answer),
            message: None,
        }
    }

    /// Rejected teacher claim.
    #[must_use]
    pub fn teacher_rejected(message: String) -> Self {
        ServerMessage::AddTeacherResponse {
            response: ResponseStatus::Rejected,
            sdp_answer: None,
            message: Some(message),
        }
    }

    /// Accepted student join.
    #[must_use]
    pub fn student_accepted(sdp_answer: String, slot_id: SlotId) -> Self {
        ServerMessage::AddStudentResponse {
            response: ResponseStatus::Accepted,
            sdp_answer: Some(sdp_answer),
            message: None,
            slot_id: Some(slot_id),
        }
    }

    /// Rejected student join.
    #[must_use]
    pub fn student_rejected(message: String) -> Self {
        ServerMessage::AddStudentResponse {
            response: ResponseStatus::Rejected,
            sdp_answer: None,
            message: Some(message),
            slot_id: None,
        }
    }

    /// Wire kind, for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ServerMessage::AddTeacherResponse { .. } => "addTeacherResponse",
            ServerMessage::AddStudentResponse { .. } => "addStudentResponse",
            ServerMessage::IceCandidate { .. } => "iceCandidate",
            ServerMessage::StopCommunication => "stopCommunication",
            ServerMessage::AddStudentToTeacher { .. } => "addStudentToTeacher",
            ServerMessage::RemoveStudentToTeacher { .. } => "removeStudentToTeacher",
        }
    }
}
