use std::fmt;

use reqwest::header::{self, HeaderValue};

use crate::{ExecuteError, PreparedRequest, Result};

/// Capability invoked during request construction to attach credentials
/// or a signature to the outgoing request.
///
/// Implementations are opaque to the execution layer; they may mutate
/// headers, the URL, or the body.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &mut PreparedRequest) -> Result<()>;
}

/// Bearer-token authenticator.
///
/// If the token is missing the `Bearer ` prefix, it is added
/// automatically.
pub struct BearerAuth {
    authorization: String,
}

impl BearerAuth {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            authorization: normalize_bearer_authorization(token.as_ref()),
        }
    }

    /// Uses the value verbatim as `Authorization: <value>`, for custom
    /// schemes.
    pub fn raw(authorization: impl Into<String>) -> Self {
        Self {
            authorization: authorization.into(),
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("authorization", &"<redacted>")
            .finish()
    }
}

impl Authenticator for BearerAuth {
    fn authenticate(&self, request: &mut PreparedRequest) -> Result<()> {
        let value = HeaderValue::from_str(&self.authorization).map_err(|err| {
            ExecuteError::InvalidRequest {
                method: request.method.clone(),
                url: request.url.to_string(),
                message: format!("authorization value is not a valid header: {err}"),
            }
        })?;
        request.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
