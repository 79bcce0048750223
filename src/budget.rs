use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Method;

use crate::PreparedRequest;

/// A call-rate quota: `calls` admissions per `window`.
///
/// An admitted burst of up to `calls` is followed by a steady spacing of
/// `window / calls` between further admissions. The minimum inter-call
/// interval form is [`CallRate::interval`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallRate {
    calls: NonZeroU32,
    window: Duration,
}

impl CallRate {
    /// `calls` per `window`. A zero call count is clamped to one.
    pub fn new(calls: u32, window: Duration) -> Self {
        Self {
            calls: NonZeroU32::new(calls.max(1)).unwrap_or(NonZeroU32::MIN),
            window,
        }
    }

    pub fn per_second(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(1))
    }

    pub fn per_minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    pub fn per_hour(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(3600))
    }

    /// One call per `interval`.
    pub fn interval(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    fn quota(&self) -> Quota {
        let period = (self.window / self.calls.get()).max(Duration::from_nanos(1));
        Quota::with_period(period)
            .map(|quota| quota.allow_burst(self.calls))
            .unwrap_or_else(|| Quota::per_second(self.calls))
    }
}

/// Predicate over an outgoing request's method and URL path.
///
/// An unset field matches everything; the default matcher matches every
/// request.
#[derive(Clone, Debug, Default)]
pub struct RequestMatcher {
    method: Option<Method>,
    path_prefix: Option<String>,
}

impl RequestMatcher {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One rate policy: a matcher and the quota governing matched requests.
pub struct BudgetPolicy {
    matcher: RequestMatcher,
    rate: CallRate,
    limiter: DefaultDirectRateLimiter,
}

impl BudgetPolicy {
    pub fn new(matcher: RequestMatcher, rate: CallRate) -> Self {
        Self {
            matcher,
            limiter: RateLimiter::direct(rate.quota()),
            rate,
        }
    }

    pub fn rate(&self) -> CallRate {
        self.rate
    }
}

impl fmt::Debug for BudgetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetPolicy")
            .field("matcher", &self.matcher)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

/// Ordered set of call-rate policies shared by every request flowing
/// through one executor.
///
/// The first matching policy governs a request; a request matching no
/// policy is unthrottled. Acquisition is safe for concurrent use from
/// many tasks.
#[derive(Debug, Default)]
pub struct ApiBudget {
    policies: Vec<BudgetPolicy>,
}

impl ApiBudget {
    pub fn new(policies: Vec<BudgetPolicy>) -> Self {
        Self { policies }
    }

    /// A budget with no policies: every request is admitted immediately.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Suspends the calling task until the first matching policy admits
    /// the request. Returns immediately when no policy matches.
    pub async fn acquire(&self, request: &PreparedRequest) {
        let path = request.url.path();
        if let Some(policy) = self
            .policies
            .iter()
            .find(|policy| policy.matcher.matches(&request.method, path))
        {
            tracing::trace!(
                method = %request.method,
                path,
                rate = ?policy.rate,
                "waiting for call-rate budget"
            );
            policy.limiter.until_ready().await;
        }
    }
}
