//! Sample offers, candidates and wire frames.

use bc_service::protocol::{ClientMessage, IceCandidate, ResponseStatus, ServerMessage};
use serde_json::{json, Value};

/// A browser-like sendrecv offer with audio and video.
pub const SAMPLE_OFFER: &str = "v=0\r\n\
    o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
    s=-\r\n\
    t=0 0\r\n\
    a=group:BUNDLE 0 1\r\n\
    m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=mid:0\r\n\
    a=sendrecv\r\n\
    a=rtpmap:111 opus/48000/2\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=mid:1\r\n\
    a=sendrecv\r\n\
    a=rtpmap:96 VP8/90000\r\n";

/// A host candidate numbered `n`.
#[must_use]
pub fn host_candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!(
            "candidate:{n} 1 UDP 2122252543 192.168.1.{} {} typ host",
            n % 250 + 1,
            50_000 + u32::from(n)
        ),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
    }
}

#[must_use]
pub fn add_teacher() -> ClientMessage {
    ClientMessage::AddTeacher {
        sdp_offer: SAMPLE_OFFER.to_string(),
    }
}

#[must_use]
pub fn add_student() -> ClientMessage {
    ClientMessage::AddStudent {
        sdp_offer: SAMPLE_OFFER.to_string(),
    }
}

#[must_use]
pub fn on_ice_candidate(n: u16) -> ClientMessage {
    ClientMessage::OnIceCandidate {
        candidate: host_candidate(n),
    }
}

/// Whether `message` is an accepted `addTeacherResponse` or `addStudentResponse`.
#[must_use]
pub fn is_accepted(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::AddTeacherResponse {
            response: ResponseStatus::Accepted,
            ..
        } | ServerMessage::AddStudentResponse {
            response: ResponseStatus::Accepted,
            ..
        }
    )
}

/// The rejection text carried by a response, if it is a rejection.
#[must_use]
pub fn rejection_message(message: &ServerMessage) -> Option<&str> {
    match message {
        ServerMessage::AddTeacherResponse {
            response: ResponseStatus::Rejected,
            message,
            ..
        }
        | ServerMessage::AddStudentResponse {
            response: ResponseStatus::Rejected,
            message,
            ..
        } => message.as_deref(),
        _ => None,
    }
}

// ============================================================================
// Raw JSON frames, as a browser would send them
// ============================================================================

#[must_use]
pub fn add_teacher_frame() -> Value {
    json!({"id": "addTeacher", "sdpOffer": SAMPLE_OFFER})
}

#[must_use]
pub fn add_student_frame() -> Value {
    json!({"id": "addStudent", "sdpOffer": SAMPLE_OFFER})
}

#[must_use]
pub fn ice_candidate_frame(n: u16) -> Value {
    let candidate = host_candidate(n);
    json!({
        "id": "onIceCandidate",
        "candidate": {
            "candidate": candidate.candidate,
            "sdpMid": candidate.sdp_mid,
            "sdpMLineIndex": candidate.sdp_m_line_index,
        }
    })
}

#[must_use]
pub fn stop_frame() -> Value {
    json!({"id": "stop"})
}
