use std::time::Duration;

use crate::{CallOutcome, FailureKind, Response, TransportError};

/// What the executor should do with a classified outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseAction {
    /// Return the outcome to the caller.
    Succeed,
    /// Raise a terminal error without retrying.
    Fail,
    /// Log the outcome and return it to the caller as-is.
    Ignore,
    /// Back off and attempt again, within the retry budget.
    Retry,
}

/// Classification of one attempt's outcome: the action to take, the
/// failure kind if the outcome is a failure, and an optional concise
/// message for user-facing surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorResolution {
    action: ResponseAction,
    failure_kind: Option<FailureKind>,
    message: Option<String>,
}

impl ErrorResolution {
    pub fn success() -> Self {
        Self {
            action: ResponseAction::Succeed,
            failure_kind: None,
            message: None,
        }
    }

    pub fn ignore() -> Self {
        Self {
            action: ResponseAction::Ignore,
            failure_kind: None,
            message: None,
        }
    }

    pub fn retry(kind: FailureKind) -> Self {
        Self {
            action: ResponseAction::Retry,
            failure_kind: Some(kind),
            message: None,
        }
    }

    pub fn fail(kind: FailureKind) -> Self {
        Self {
            action: ResponseAction::Fail,
            failure_kind: Some(kind),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn action(&self) -> ResponseAction {
        self.action
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Classifies attempt outcomes into resolutions.
///
/// `max_retries` and `max_time` are optional overrides consulted by the
/// executor before any backoff strategy's overrides and before the
/// built-in defaults.
pub trait ErrorHandler: Send + Sync {
    fn interpret(&self, outcome: &CallOutcome) -> ErrorResolution;

    fn max_retries(&self) -> Option<u32> {
        None
    }

    fn max_time(&self) -> Option<Duration> {
        None
    }
}

/// Status-driven default classification.
///
/// 2xx succeeds; 408, 429, and 5xx retry as transient; 401/403 fail as
/// config errors; remaining 4xx and anything unrecognized fail as system
/// errors. Connection and timeout transport errors retry as transient.
#[derive(Clone, Debug, Default)]
pub struct HttpStatusHandler {
    max_retries: Option<u32>,
    max_time: Option<Duration>,
}

impl HttpStatusHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
}

impl ErrorHandler for HttpStatusHandler {
    fn interpret(&self, outcome: &CallOutcome) -> ErrorResolution {
        match outcome {
            CallOutcome::Response(response) => {
                let status = response.status();
                if status.is_success() {
                    return ErrorResolution::success();
                }
                match status.as_u16() {
                    401 => ErrorResolution::fail(FailureKind::Config)
                        .with_message("Unauthorized. Please check your credentials."),
                    403 => ErrorResolution::fail(FailureKind::Config)
                        .with_message("Forbidden. Please check your permissions."),
                    408 | 429 => ErrorResolution::retry(FailureKind::Transient),
                    500..=599 => ErrorResolution::retry(FailureKind::Transient),
                    _ => ErrorResolution::fail(FailureKind::System),
                }
            }
            CallOutcome::Transport(err) => match err {
                TransportError::Connect(_) | TransportError::Timeout(_) => {
                    ErrorResolution::retry(FailureKind::Transient)
                }
                TransportError::Other(_) => ErrorResolution::fail(FailureKind::System),
            },
        }
    }

    fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    fn max_time(&self) -> Option<Duration> {
        self.max_time
    }
}

/// Derives a human-readable message from an error response body.
pub trait ErrorMessageParser: Send + Sync {
    fn parse_error_message(&self, response: &Response) -> String;
}

const ERROR_MESSAGE_KEYS: [&str; 8] = [
    "message", "messages", "error", "errors", "failures", "failure", "detail", "details",
];

const DEFAULT_MESSAGE_LIMIT: usize = 512;

/// Probes a structured error body for common message keys, falling back
/// to the raw body text. Output is bounded in size.
#[derive(Clone, Debug)]
pub struct JsonErrorMessageParser {
    message_limit: usize,
}

impl Default for JsonErrorMessageParser {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }
}

impl JsonErrorMessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }
}

impl ErrorMessageParser for JsonErrorMessageParser {
    fn parse_error_message(&self, response: &Response) -> String {
        if let Ok(body) = response.json() {
            if let Some(message) = probe_error_message(&body) {
                return bound_message(&message, self.message_limit);
            }
        }
        response.excerpt(self.message_limit)
    }
}

fn probe_error_message(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(probe_error_message).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        serde_json::Value::Object(map) => ERROR_MESSAGE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(probe_error_message)),
        _ => None,
    }
}

fn bound_message(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_owned();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
