use std::time::Duration;

use reqwest::header::RETRY_AFTER;

use crate::CallOutcome;

/// Computes the delay before the next attempt.
///
/// Strategies are consulted in declared order; the first to return a
/// delay wins. A strategy with no opinion for an outcome returns `None`,
/// deferring to later strategies and ultimately to the executor's
/// exponential fallback.
///
/// `max_retries`, `max_time`, and `factor` are optional limit overrides;
/// the executor consults the first strategy exposing each one.
pub trait BackoffStrategy: Send + Sync {
    fn backoff_time(&self, outcome: &CallOutcome, attempt: u32) -> Option<Duration>;

    fn max_retries(&self) -> Option<u32> {
        None
    }

    fn max_time(&self) -> Option<Duration> {
        None
    }

    fn factor(&self) -> Option<f64> {
        None
    }
}

/// Honors a `Retry-After` response header carrying a delay in seconds;
/// abstains otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryAfterBackoff;

impl RetryAfterBackoff {
    pub fn new() -> Self {
        Self
    }
}

impl BackoffStrategy for RetryAfterBackoff {
    fn backoff_time(&self, outcome: &CallOutcome, _attempt: u32) -> Option<Duration> {
        let response = outcome.response()?;
        let seconds = response
            .headers()
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()?;
        Some(Duration::from_secs(seconds))
    }
}

/// Always proposes the same fixed delay.
#[derive(Clone, Copy, Debug)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn backoff_time(&self, _outcome: &CallOutcome, _attempt: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackoffStrategy, ConstantBackoff, RetryAfterBackoff};
    use crate::{CallOutcome, Response, TransportError};
    use reqwest::{header::HeaderMap, StatusCode};
    use std::time::Duration;

    fn rate_limited(retry_after: Option<&str>) -> CallOutcome {
        let mut headers = HeaderMap::new();
        if let Some(value) = retry_after {
            headers.insert("retry-after", value.parse().expect("header value"));
        }
        CallOutcome::Response(Response::new(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Vec::new(),
        ))
    }

    #[test]
    fn retry_after_header_is_honored() {
        let delay = RetryAfterBackoff::new().backoff_time(&rate_limited(Some("5")), 1);
        assert_eq!(delay, Some(Duration::from_secs(5)));
    }

    #[test]
    fn missing_header_yields_no_opinion() {
        assert_eq!(RetryAfterBackoff::new().backoff_time(&rate_limited(None), 1), None);
    }

    #[test]
    fn unparseable_header_yields_no_opinion() {
        let delay =
            RetryAfterBackoff::new().backoff_time(&rate_limited(Some("Fri, 01 Jan 2027 00:00:00 GMT")), 1);
        assert_eq!(delay, None);
    }

    #[test]
    fn transport_errors_yield_no_opinion() {
        let outcome = CallOutcome::Transport(TransportError::Timeout("deadline".to_owned()));
        assert_eq!(RetryAfterBackoff::new().backoff_time(&outcome, 1), None);
    }

    #[test]
    fn constant_backoff_always_proposes_its_delay() {
        let strategy = ConstantBackoff::new(Duration::from_millis(250));
        assert_eq!(
            strategy.backoff_time(&rate_limited(None), 3),
            Some(Duration::from_millis(250))
        );
    }
}
