//! Actor model for the signaling core.
//!
//! ```text
//! RegistryActor (singleton)
//! └── knows the teacher and every student by ConnectionActorHandle
//!
//! ConnectionActor (one per signaling socket)
//! ├── owns its NegotiationAdapter
//! └── writes every message for its client
//! ```
//!
//! # Key Design Decisions
//!
//! - **Registry serializes role claims**: no locks, and never held across a
//!   media negotiation
//! - **Fan-out via mailboxes**: peers exchange notices, never socket writes
//! - **CancellationToken propagation**: the server's root token is the parent
//!   of every connection token
//!
//! # Modules
//!
//! - [`registry`] - `RegistryActor` and its handle
//! - [`connection`] - `ConnectionActor` signaling state machine
//! - [`fanout`] - notices between teacher and students
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod fanout;
pub mod messages;
pub mod metrics;
pub mod registry;

pub use connection::{ConnectionActor, ConnectionActorHandle, ConnectionContext};
pub use messages::{
    ConnectionMessage, ConnectionState, Phase, RegisteredStudent, RegistrySnapshot,
    StudentAdmission, StudentRelease, StudentSlot, TeacherTenure,
};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use registry::{RegistryActor, RegistryHandle};
