//! Broadcast Controller configuration.
//!
//! Configuration is loaded from environment variables with defaults for
//! every field, so a bare `bc-service` starts a usable signaling server.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default signaling (WebSocket) bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8443";

/// Default path the signaling WebSocket is served on.
pub const DEFAULT_WS_PATH: &str = "/call";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default connection actor mailbox capacity.
pub const DEFAULT_CONNECTION_MAILBOX: usize = 200;

/// Default outbound (server -> client) queue capacity per socket.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Default time allowed for the media side to produce an answer.
pub const DEFAULT_NEGOTIATION_TIMEOUT_SECONDS: u64 = 20;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "bc";

/// Which media backend produces answers for client offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaBackendKind {
    /// Signaling-only backend with synthetic answers.
    DryRun,
}

impl FromStr for MediaBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry-run" | "dryrun" => Ok(MediaBackendKind::DryRun),
            other => Err(ConfigError::InvalidValue(format!(
                "BC_MEDIA_BACKEND: unknown backend '{other}'"
            ))),
        }
    }
}

/// Broadcast Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signaling server bind address (default: "0.0.0.0:8443").
    pub bind_address: String,

    /// WebSocket path (default: "/call").
    pub ws_path: String,

    /// Health/metrics endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Connection actor mailbox capacity.
    pub connection_mailbox: usize,

    /// Outbound queue capacity per socket.
    pub outbound_queue: usize,

    /// Maximum time for the media side to answer an offer.
    pub negotiation_timeout: Duration,

    /// Media backend selection.
    pub media_backend: MediaBackendKind,

    /// Unique identifier for this instance (appears in logs).
    pub instance_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            health_bind_address: DEFAULT_HEALTH_BIND_ADDRESS.to_string(),
            connection_mailbox: DEFAULT_CONNECTION_MAILBOX,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            negotiation_timeout: Duration::from_secs(DEFAULT_NEGOTIATION_TIMEOUT_SECONDS),
            media_backend: MediaBackendKind::DryRun,
            instance_id: format!("{DEFAULT_INSTANCE_ID_PREFIX}-local"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let ws_path = vars
            .get("BC_WS_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
        if !ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "BC_WS_PATH must start with '/', got '{ws_path}'"
            )));
        }

        let health_bind_address = vars
            .get("BC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let connection_mailbox =
            parse_positive(vars, "BC_CONNECTION_MAILBOX", DEFAULT_CONNECTION_MAILBOX)?;

        let outbound_queue = parse_positive(vars, "BC_OUTBOUND_QUEUE", DEFAULT_OUTBOUND_QUEUE)?;

        let negotiation_timeout_seconds = parse_positive(
            vars,
            "BC_NEGOTIATION_TIMEOUT_SECONDS",
            DEFAULT_NEGOTIATION_TIMEOUT_SECONDS,
        )?;

        let media_backend = match vars.get("BC_MEDIA_BACKEND") {
            Some(value) => value.parse()?,
            None => MediaBackendKind::DryRun,
        };

        // Generate instance ID
        let instance_id = vars.get("BC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            ws_path,
            health_bind_address,
            connection_mailbox,
            outbound_queue,
            negotiation_timeout: Duration::from_secs(negotiation_timeout_seconds),
            media_backend,
            instance_id,
        })
    }
}

/// Parse an optional numeric variable that must be greater than zero.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = vars.get(key) else {
        return Ok(default);
    };

    let value: T = raw
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{key}: '{raw}' is not a number")))?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{key}: must be greater than zero"
        )));
    }

    Ok(value)
}
