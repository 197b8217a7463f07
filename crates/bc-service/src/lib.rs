//! Broadcast Controller (BC) Service Library
//!
//! Signaling core for a one-teacher, many-students live broadcast:
//!
//! - A single presenter ("teacher") publishes a stream
//! - Any number of viewers ("students") receive it
//! - Clients negotiate over a WebSocket carrying JSON messages
//!
//! # Architecture
//!
//! ```text
//! axum /call ──▶ ConnectionActor (one per socket) ──▶ NegotiationAdapter
//!                       │  ▲
//!                       ▼  │ fan-out notices
//!                  RegistryActor (singleton)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Registry, per-connection state machine and fan-out
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-safe messages
//! - [`media`] - Negotiation adapter boundary and backends
//! - [`observability`] - Health checks and metrics
//! - [`protocol`] - Wire messages and JSON codec
//! - [`transport`] - WebSocket endpoint

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod protocol;
pub mod transport;
