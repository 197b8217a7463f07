//! # BC Test Utilities
//!
//! Shared test utilities for the Broadcast Controller (BC) service.
//!
//! ## Modules
//!
//! - `mock_media` - Scriptable media backend (fail, delay or hang answers,
//!   record candidates and dispose calls)
//! - `harness` - Drive connection actors directly, without sockets
//! - `ws_client` - Minimal signaling client over a real WebSocket
//! - `fixtures` - Sample offers, candidates and wire frames
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let backend = MockMediaBackend::builder()
//!         .answer_delay(Duration::from_millis(50))
//!         .build();
//!     let harness = TestHarness::new(backend);
//!
//!     let mut teacher = harness.connect();
//!     teacher.send(add_teacher()).await;
//!     assert!(is_accepted(&teacher.recv().await));
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_media;
pub mod ws_client;

pub use fixtures::*;
pub use harness::{TestHarness, TestPeer};
pub use mock_media::{MediaLog, MockMediaBackend, MockMediaBackendBuilder};
pub use ws_client::WsClient;
