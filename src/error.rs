// =============================================================================
// Error taxonomy for the signal pipeline
// =============================================================================
//
// Six error kinds, matching the recovery policy each one gets:
//   TransportError — network/timeout against the exchange. Recovered locally.
//   ExchangeError  — non-success status code. Fatal from loadUniverse, logged
//                    and skipped elsewhere.
//   ParseError     — malformed stream frame or REST body. Logged, discarded.
//   StoreError     — optional external store (Redis) unavailable. Failed over
//                    to in-process state.
//   SinkError      — notification delivery failed. Logged, no retry.
//   ConfigError     — missing required configuration. Fatal at startup.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("exchange returned {status}: {body}")]
    Exchange { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataError {
    /// Whether this error should abort the process rather than be recovered
    /// locally by the component that raised it. Only `loadUniverse`'s
    /// instrument fetch and startup configuration errors are fatal; every
    /// other error kind is handled by its owning component.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, DataError::Exchange { .. } | DataError::Config(_))
    }
}

impl From<reqwest::Error> for DataError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() || value.is_connect() {
            DataError::Transport(value.to_string())
        } else {
            DataError::Transport(value.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(value: serde_json::Error) -> Self {
        DataError::Parse(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DataError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        DataError::Transport(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_and_config_errors_are_fatal_at_startup() {
        assert!(DataError::Exchange {
            status: 500,
            body: "boom".into()
        }
        .is_fatal_at_startup());
        assert!(DataError::Config("missing url".into()).is_fatal_at_startup());
    }

    #[test]
    fn other_errors_are_locally_recoverable() {
        assert!(!DataError::Transport("timeout".into()).is_fatal_at_startup());
        assert!(!DataError::Parse("bad frame".into()).is_fatal_at_startup());
        assert!(!DataError::Store("redis down".into()).is_fatal_at_startup());
        assert!(!DataError::Sink("webhook 500".into()).is_fatal_at_startup());
    }
}
