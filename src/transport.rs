use async_trait::async_trait;

use crate::{PreparedRequest, RequestBody, Response, TransportError};

/// Executes a fully-built request and returns its outcome.
///
/// The transport owns everything below the HTTP layer: connection
/// handling, TLS, per-call timeouts, and any local response cache.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &PreparedRequest) -> Result<Response, TransportError>;

    /// Whether the next [`execute`](Transport::execute) of this request
    /// would be served from a local cache without reaching the network.
    ///
    /// The executor skips call-rate budget acquisition when this returns
    /// true, so cached replays do not consume third-party quota.
    fn serves_from_cache(&self, _request: &PreparedRequest) -> bool {
        false
    }
}

/// Transport backed by a `reqwest` client.
///
/// Per-call timeouts, pooling, and TLS configuration belong to the
/// supplied client.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &PreparedRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let response = builder.send().await.map_err(TransportError::from)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(TransportError::from)?
            .to_vec();

        Ok(Response::new(status, headers, body))
    }
}
