use std::fmt;

use reqwest::Method;

/// Classification of a fatal request failure, used upstream for alerting
/// and user messaging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Misconfiguration on the caller's side (bad credentials, malformed
    /// request construction). Never retried.
    Config,
    /// Rate-limited, server-side, or network failure. Retried up to the
    /// resolved attempt/time budget before escalating.
    Transient,
    /// Non-retryable or unrecognized outcome. Fatal on first occurrence.
    System,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FailureKind::Config => "config",
            FailureKind::Transient => "transient",
            FailureKind::System => "system",
        };
        f.write_str(kind)
    }
}

/// Failure below the HTTP layer: the request never produced a response.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established (refused, reset, DNS failure).
    #[error("connection failed: {0}")]
    Connect(String),
    /// The transport's own per-call timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            TransportError::Timeout(message)
        } else if err.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Other(message)
        }
    }
}

/// Error type returned by this crate.
///
/// Fatal errors carry a full internal diagnostic (method, URL, status if
/// any, parsed or raw body excerpt) separately from the optional concise
/// message intended for user-facing surfaces.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// Request construction was rejected before any network call.
    #[error("invalid request for {method} {url}: {message}")]
    InvalidRequest {
        method: Method,
        url: String,
        message: String,
    },
    /// Terminal request failure, raised either immediately or after the
    /// retry budget was exhausted.
    #[error("{internal_message}")]
    Failed {
        kind: FailureKind,
        method: Method,
        url: String,
        /// HTTP status of the final attempt, absent for transport errors.
        status: Option<u16>,
        /// Full diagnostic for operational logs.
        internal_message: String,
        /// Optional concise message for user-facing surfaces.
        message: Option<String>,
    },
}

impl ExecuteError {
    /// Failure kind of this error. Construction errors are always
    /// [`FailureKind::Config`].
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExecuteError::InvalidRequest { .. } => FailureKind::Config,
            ExecuteError::Failed { kind, .. } => *kind,
        }
    }

    /// HTTP status attached to the error, if the final attempt produced a
    /// response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecuteError::InvalidRequest { .. } => None,
            ExecuteError::Failed { status, .. } => *status,
        }
    }

    /// Concise user-facing message, falling back to the internal
    /// diagnostic when the classification supplied none.
    pub fn user_message(&self) -> String {
        match self {
            ExecuteError::InvalidRequest { message, .. } => message.clone(),
            ExecuteError::Failed {
                message,
                internal_message,
                ..
            } => message.clone().unwrap_or_else(|| internal_message.clone()),
        }
    }
}
