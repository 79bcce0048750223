use std::collections::BTreeMap;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::Serialize;

use crate::{Authenticator, ExecuteError, Result};

/// Raw (non-JSON) request payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawBody {
    /// Plain text body.
    Text(String),
    /// Arbitrary bytes.
    Bytes(Vec<u8>),
    /// URL-encoded form fields.
    Form(BTreeMap<String, String>),
}

/// Specification of one logical HTTP call.
///
/// The body is either structured JSON or raw data; supplying both is a
/// configuration error surfaced by [`RequestSpec::build`] before any
/// network activity.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    json: Option<serde_json::Value>,
    raw: Option<RawBody>,
    dedupe_query_params: bool,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            json: None,
            raw: None,
            dedupe_query_params: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attaches a structured JSON body, encoded from any serializable
    /// value.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|err| ExecuteError::InvalidRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            message: format!("JSON body failed to encode: {err}"),
        })?;
        self.json = Some(value);
        Ok(self)
    }

    /// Attaches a raw body (text, bytes, or form fields).
    pub fn with_raw_body(mut self, body: RawBody) -> Self {
        self.raw = Some(body);
        self
    }

    /// Attaches URL-encoded form fields as the body.
    pub fn with_form<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.with_raw_body(RawBody::Form(fields))
    }

    /// When set, query parameters whose value is already encoded in the
    /// URL's query string are dropped from the parameter mapping.
    pub fn with_dedupe_query_params(mut self, dedupe: bool) -> Self {
        self.dedupe_query_params = dedupe;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validates the spec and produces the request handed to the
    /// transport.
    ///
    /// Fails with a config error — before any network call — when the URL
    /// is malformed, a header is invalid, or both a JSON and a raw body
    /// were supplied.
    pub fn build(self, authenticator: Option<&dyn Authenticator>) -> Result<PreparedRequest> {
        if self.json.is_some() && self.raw.is_some() {
            return Err(self.invalid(
                "request body may be supplied as structured JSON or as raw data, not both",
            ));
        }

        let mut url = Url::parse(&self.url)
            .map_err(|err| self.invalid(format!("URL failed to parse: {err}")))?;

        let params = if self.dedupe_query_params {
            dedupe_query_params(&url, &self.params)
        } else {
            self.params.clone()
        };
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| self.invalid(format!("header name '{name}' is invalid: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| self.invalid(format!("header value for '{name}' is invalid: {err}")))?;
            headers.insert(name, value);
        }

        let body = if !body_carrying_method(&self.method) {
            None
        } else if let Some(json) = self.json {
            Some(RequestBody::Json(json))
        } else {
            self.raw.map(|raw| match raw {
                RawBody::Text(text) => RequestBody::Text(text),
                RawBody::Bytes(bytes) => RequestBody::Bytes(bytes),
                RawBody::Form(fields) => RequestBody::Form(fields),
            })
        };

        let mut request = PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
        };
        if let Some(authenticator) = authenticator {
            authenticator.authenticate(&mut request)?;
        }
        Ok(request)
    }

    fn invalid(&self, message: impl Into<String>) -> ExecuteError {
        ExecuteError::InvalidRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            message: message.into(),
        }
    }
}

/// Prepared body attached to an outgoing request.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    Form(BTreeMap<String, String>),
}

/// A fully-built request: final URL with merged query parameters, headers
/// after authentication, and the prepared body.
///
/// Returned to the caller alongside the outcome so pagination layers can
/// inspect exactly what was sent.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

fn body_carrying_method(method: &Method) -> bool {
    [Method::GET, Method::POST, Method::PUT, Method::PATCH].contains(method)
}

/// Drops parameters whose value is already encoded for the same key in
/// the URL's query string.
///
/// Only the first URL-embedded value per key is considered, and only an
/// exact string match removes the parameter — a key present on both sides
/// with differing values is kept, so both values are sent rather than one
/// silently overwriting the other.
fn dedupe_query_params(url: &Url, params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut embedded: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        embedded.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
        .iter()
        .filter(|&(key, value)| embedded.get(key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
