//! Client-facing transport.

pub mod websocket;

pub use websocket::{signaling_router, SignalingState};
