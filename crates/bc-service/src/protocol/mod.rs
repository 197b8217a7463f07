//! Signaling wire protocol (JSON text frames keyed by `id`).

pub mod codec;
pub mod messages;

pub use codec::{decode, encode};
pub use messages::{ClientMessage, IceCandidate, ResponseStatus, ServerMessage};
