//! Health checks and Prometheus metrics.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
