//! Metrics definitions for the Broadcast Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `role`: teacher, student
//! - `outcome`: accepted, rejected
//! - `reason`: bounded by `BcError::reason_code` (~8 values)
//! - `actor_type`: registry, connection
//! - `kind`: bounded by `ProtocolError` variants (2 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Answer creation talks to a media server; allow multi-second tails
        .set_buckets_for_metric(
            Matcher::Prefix("bc_negotiation".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
                20.000,
            ],
        )
        .map_err(|e| format!("Failed to set negotiation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `bc_connections_active`
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_connections_active").set(count as f64);
}

/// Metric: `bc_students_active`
///
/// Students currently holding a viewer slot.
pub fn set_students_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_students_active").set(count as f64);
}

/// Metric: `bc_teacher_present` (0 or 1)
pub fn set_teacher_present(present: bool) {
    gauge!("bc_teacher_present").set(if present { 1.0 } else { 0.0 });
}

/// Metric: `bc_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Metric: `bc_role_claims_total`
/// Labels: `role`, `outcome`, `reason`
///
/// `reason` is `none` for accepted claims.
pub fn record_role_claim(role: &'static str, accepted: bool, reason: &'static str) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(
        "bc_role_claims_total",
        "role" => role,
        "outcome" => outcome,
        "reason" => reason
    )
    .increment(1);
}

/// Metric: `bc_negotiation_failures_total`
/// Labels: `role`
pub fn record_negotiation_failure(role: &'static str) {
    counter!("bc_negotiation_failures_total", "role" => role).increment(1);
}

/// Metric: `bc_protocol_errors_total`
/// Labels: `kind` (`unknown-kind`, `malformed`)
pub fn record_protocol_error(kind: &'static str) {
    counter!("bc_protocol_errors_total", "kind" => kind).increment(1);
}

/// Metric: `bc_stop_communication_total`
///
/// Server-initiated teardowns delivered to students.
pub fn record_stop_communication() {
    counter!("bc_stop_communication_total").increment(1);
}

/// Metric: `bc_actor_messages_dropped_total`
/// Labels: `actor_type`
pub fn record_message_dropped(actor_type: &'static str) {
    counter!("bc_actor_messages_dropped_total", "actor_type" => actor_type).increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Metric: `bc_negotiation_duration_seconds`
/// Labels: `role`
pub fn record_negotiation_duration(role: &'static str, duration: Duration) {
    histogram!("bc_negotiation_duration_seconds", "role" => role).record(duration.as_secs_f64());
}
