use std::borrow::Cow;

use reqwest::{header::HeaderMap, StatusCode};

use crate::TransportError;

/// An HTTP response with its body buffered as raw bytes.
///
/// Text and JSON views are computed on demand so that classification of a
/// large streamed body does not pay decoding cost unless something
/// actually reads it.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }

    /// Body text truncated to at most `limit` bytes, for diagnostics.
    pub fn excerpt(&self, limit: usize) -> String {
        let text = self.text();
        if text.len() <= limit {
            return text.into_owned();
        }
        let mut end = limit;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// Outcome of one network attempt: a response, or a failure below the
/// HTTP layer.
///
/// This is what error handlers classify, and what `send` hands back to
/// the caller — for an outcome classified as ignorable there may be no
/// response at all, only the transport error.
#[derive(Clone, Debug)]
pub enum CallOutcome {
    Response(Response),
    Transport(TransportError),
}

impl CallOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            CallOutcome::Response(response) => Some(response),
            CallOutcome::Transport(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            CallOutcome::Response(response) => Some(response),
            CallOutcome::Transport(_) => None,
        }
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            CallOutcome::Response(_) => None,
            CallOutcome::Transport(err) => Some(err),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(Response::status)
    }
}
