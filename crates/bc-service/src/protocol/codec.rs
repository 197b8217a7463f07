//! JSON text-frame codec for signaling messages.

use super::messages::{ClientMessage, ServerMessage};
use crate::errors::ProtocolError;

/// Inbound kinds this server understands.
const KNOWN_KINDS: [&str; 4] = ["addTeacher", "addStudent", "onIceCandidate", "stop"];

/// Decode one inbound text frame.
///
/// Distinguishes an unrecognized `id` from a malformed payload so the two
/// can be logged differently.
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing string field 'id'".to_string()))?;

    if !KNOWN_KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encode one outbound message as a JSON text frame.
pub fn encode(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::protocol::messages::IceCandidate;
    use common::types::SlotId;
    use serde_json::json;

    #[test]
    fn test_decode_add_teacher() {
        let msg = decode(r#"{"id":"addTeacher","sdpOffer":"v=0 offer"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AddTeacher {
                sdp_offer: "v=0 offer".to_string()
            }
        );
    }

    #[test]
    fn test_decode_ice_candidate_from_browser() {
        let text = json!({
            "id": "onIceCandidate",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2122252543 192.168.1.4 53421 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0,
                "usernameFragment": "abcd"
            }
        })
        .to_string();

        let msg = decode(&text).unwrap();
        let ClientMessage::OnIceCandidate { candidate } = msg else {
            panic!("expected OnIceCandidate, got {msg:?}");
        };
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
    }

    #[test]
    fn test_decode_stop_without_fields() {
        assert_eq!(decode(r#"{"id":"stop"}"#).unwrap(), ClientMessage::Stop);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = decode(r#"{"id":"record"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownKind("record".to_string()));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"sdpOffer":"x"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        // Known kind with missing field
        assert!(matches!(
            decode(r#"{"id":"addStudent"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_rejection_omits_answer() {
        let text = encode(&ServerMessage::teacher_rejected("busy".to_string())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": "addTeacherResponse", "response": "rejected", "message": "busy"})
        );
    }

    #[test]
    fn test_encode_student_acceptance_carries_slot() {
        let text = encode(&ServerMessage::student_accepted(
            "v=0 answer".to_string(),
            SlotId(2),
        ))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "addStudentResponse",
                "response": "accepted",
                "sdpAnswer": "v=0 answer",
                "slotId": 2
            })
        );
    }

    #[test]
    fn test_encode_notices() {
        let stop = encode(&ServerMessage::StopCommunication).unwrap();
        assert_eq!(stop, r#"{"id":"stopCommunication"}"#);

        let joined = encode(&ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }).unwrap();
        assert_eq!(joined, r#"{"id":"addStudentToTeacher","slotId":0}"#);

        let candidate = encode(&ServerMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:2".to_string(),
                sdp_mid: Some("video".to_string()),
                sdp_m_line_index: Some(1),
            },
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&candidate).unwrap();
        assert_eq!(value["id"], "iceCandidate");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 1);
        assert_eq!(value["candidate"]["sdpMid"], "video");
    }
}
