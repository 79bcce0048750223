use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, Level};

use crate::{
    ApiBudget, Authenticator, BackoffStrategy, CallOutcome, ErrorHandler, ErrorMessageParser,
    ErrorResolution, ExecuteError, FailureKind, HttpStatusHandler, HttpTransport,
    JsonErrorMessageParser, PreparedRequest, RequestSpec, Response, ResponseAction, Result,
    RetryAfterBackoff, Transport,
};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_MAX_TIME: Duration = Duration::from_secs(600);
const DEFAULT_RETRY_FACTOR: f64 = 5.0;

/// Cap on the exponent of the exponential fallback, far above any sane
/// retry budget.
const MAX_BACKOFF_EXPONENT: u32 = 16;

const RESPONSE_LOG_LIMIT: usize = 2048;

/// Limits in force for one logical request, resolved once per `send`.
///
/// Precedence per limit: error-handler override, then the first backoff
/// strategy in declared order exposing one, then the built-in default.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ResolvedLimits {
    max_tries: u32,
    max_time: Duration,
    factor: f64,
}

/// Mutable state of one logical request's retry sequence. Created fresh
/// inside `send` and discarded when it returns; never shared between
/// requests.
struct RetryContext {
    attempt: u32,
    started: Instant,
    limits: ResolvedLimits,
}

impl RetryContext {
    fn new(limits: ResolvedLimits) -> Self {
        Self {
            attempt: 1,
            started: Instant::now(),
            limits,
        }
    }
}

/// Executes logical HTTP requests with classification-driven retries,
/// pluggable backoff, and call-rate budgeting.
///
/// One executor instance is shared by many concurrent logical requests;
/// all collaborators sit behind `Arc`s and the budget's bookkeeping is
/// concurrency-safe. Cloning is cheap and shares the same budget.
#[derive(Clone)]
pub struct HttpExecutor {
    transport: Arc<dyn Transport>,
    budget: Arc<ApiBudget>,
    error_handler: Arc<dyn ErrorHandler>,
    backoff_strategies: Vec<Arc<dyn BackoffStrategy>>,
    message_parser: Arc<dyn ErrorMessageParser>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("backoff_strategies", &self.backoff_strategies.len())
            .field("authenticated", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor {
    /// Creates an executor with the default collaborators: a plain
    /// `reqwest` transport, an unlimited budget, status-driven
    /// classification, and Retry-After-aware backoff.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(HttpTransport::default()),
            budget: Arc::new(ApiBudget::unlimited()),
            error_handler: Arc::new(HttpStatusHandler::new()),
            backoff_strategies: vec![Arc::new(RetryAfterBackoff::new())],
            message_parser: Arc::new(JsonErrorMessageParser::new()),
            authenticator: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_api_budget(mut self, budget: Arc<ApiBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Replaces the backoff strategy set. Strategies are consulted in
    /// the given order; an empty set leaves only the exponential
    /// fallback.
    pub fn with_backoff_strategies(mut self, strategies: Vec<Arc<dyn BackoffStrategy>>) -> Self {
        self.backoff_strategies = strategies;
        self
    }

    pub fn with_message_parser(mut self, parser: Arc<dyn ErrorMessageParser>) -> Self {
        self.message_parser = parser;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Sends one logical request, retrying as classified, and returns
    /// the issued request together with the final outcome.
    ///
    /// The outcome is a response for successful and most ignored calls;
    /// an ignored transport failure is handed back as the error itself.
    /// Everything else surfaces as [`ExecuteError`].
    pub async fn send(&self, spec: RequestSpec) -> Result<(PreparedRequest, CallOutcome)> {
        let request = spec.build(self.authenticator.as_deref())?;
        let mut ctx = RetryContext::new(self.resolve_limits());

        loop {
            if !self.transport.serves_from_cache(&request) {
                self.budget.acquire(&request).await;
            }

            debug!(
                method = %request.method,
                url = %request.url,
                attempt = ctx.attempt,
                "sending outbound API request"
            );

            let outcome = match self.transport.execute(&request).await {
                Ok(response) => CallOutcome::Response(response),
                Err(err) => CallOutcome::Transport(err),
            };

            // Body decoding can be heavy; only pay for it when debug
            // logging is enabled.
            if tracing::enabled!(Level::DEBUG) {
                if let CallOutcome::Response(response) = &outcome {
                    debug!(
                        status = response.status().as_u16(),
                        body = %response.excerpt(RESPONSE_LOG_LIMIT),
                        "received response"
                    );
                }
            }

            let resolution = self.error_handler.interpret(&outcome);

            match resolution.action() {
                ResponseAction::Fail => {
                    return Err(self.terminal_error(&request, &outcome, &resolution, None));
                }
                ResponseAction::Ignore => {
                    let log_message = match &outcome {
                        CallOutcome::Response(response) => format!(
                            "Ignoring response for '{}' request to '{}' with response code '{}'",
                            request.method,
                            request.url,
                            response.status().as_u16()
                        ),
                        CallOutcome::Transport(err) => format!(
                            "Ignoring response for '{}' request to '{}' with error '{err}'",
                            request.method, request.url
                        ),
                    };
                    info!("{}", resolution.message().unwrap_or(&log_message));
                    return Ok((request, outcome));
                }
                ResponseAction::Retry => {
                    let delay = self.backoff_delay(&outcome, ctx.attempt, ctx.limits.factor);
                    let out_of_attempts = ctx.attempt >= ctx.limits.max_tries;
                    let out_of_time = ctx.started.elapsed() + delay > ctx.limits.max_time;
                    if out_of_attempts || out_of_time {
                        return Err(self.terminal_error(
                            &request,
                            &outcome,
                            &resolution,
                            Some(ctx.attempt),
                        ));
                    }
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = ctx.attempt,
                        "backing off before retry"
                    );
                    sleep(delay).await;
                    ctx.attempt += 1;
                }
                ResponseAction::Succeed => {
                    match &outcome {
                        CallOutcome::Response(response) if !response.status().is_success() => {
                            return Err(self.unclassified_error(&request, response));
                        }
                        CallOutcome::Transport(_) => {
                            return Err(self.terminal_error(
                                &request,
                                &outcome,
                                &ErrorResolution::fail(FailureKind::System),
                                None,
                            ));
                        }
                        CallOutcome::Response(_) => {}
                    }
                    return Ok((request, outcome));
                }
            }
        }
    }

    fn resolve_limits(&self) -> ResolvedLimits {
        let max_retries = self
            .error_handler
            .max_retries()
            .or_else(|| {
                self.backoff_strategies
                    .iter()
                    .find_map(|strategy| strategy.max_retries())
            })
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let max_time = self
            .error_handler
            .max_time()
            .or_else(|| {
                self.backoff_strategies
                    .iter()
                    .find_map(|strategy| strategy.max_time())
            })
            .unwrap_or(DEFAULT_MAX_TIME);
        let factor = self
            .backoff_strategies
            .iter()
            .find_map(|strategy| strategy.factor())
            .unwrap_or(DEFAULT_RETRY_FACTOR);

        ResolvedLimits {
            max_tries: max_retries.saturating_add(1),
            max_time,
            factor,
        }
    }

    /// First strategy returning a delay wins; with none, fall back to
    /// exponential backoff `factor * 2^(attempt - 1)` seconds.
    fn backoff_delay(&self, outcome: &CallOutcome, attempt: u32, factor: f64) -> Duration {
        for strategy in &self.backoff_strategies {
            if let Some(delay) = strategy.backoff_time(outcome, attempt) {
                return delay;
            }
        }
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        Duration::from_secs_f64(factor * 2f64.powi(exponent as i32))
    }

    fn terminal_error(
        &self,
        request: &PreparedRequest,
        outcome: &CallOutcome,
        resolution: &ErrorResolution,
        attempts: Option<u32>,
    ) -> ExecuteError {
        let (status, diagnostic) = match outcome {
            CallOutcome::Response(response) => (
                Some(response.status().as_u16()),
                format!(
                    "'{}' request to '{}' failed with status code '{}' and error message '{}'",
                    request.method,
                    request.url,
                    response.status().as_u16(),
                    self.message_parser.parse_error_message(response)
                ),
            ),
            CallOutcome::Transport(err) => (
                None,
                format!(
                    "'{}' request to '{}' failed with transport error: '{err}'",
                    request.method, request.url
                ),
            ),
        };
        let internal_message = match attempts {
            Some(attempts) => format!("{diagnostic}; giving up after {attempts} attempts"),
            None => diagnostic,
        };

        ExecuteError::Failed {
            kind: resolution.failure_kind().unwrap_or(FailureKind::System),
            method: request.method.clone(),
            url: request.url.to_string(),
            status,
            internal_message,
            message: resolution.message().map(str::to_owned),
        }
    }

    fn unclassified_error(&self, request: &PreparedRequest, response: &Response) -> ExecuteError {
        ExecuteError::Failed {
            kind: FailureKind::System,
            method: request.method.clone(),
            url: request.url.to_string(),
            status: Some(response.status().as_u16()),
            internal_message: format!(
                "'{}' request to '{}' returned unhandled status code '{}' with error message '{}'",
                request.method,
                request.url,
                response.status().as_u16(),
                self.message_parser.parse_error_message(response)
            ),
            message: None,
        }
    }
}
