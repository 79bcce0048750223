//! `syphon-http` is the resilient HTTP execution layer used by
//! data-extraction connectors.
//!
//! [`HttpExecutor::send`] sends one logical request, classifies each
//! attempt's outcome through a pluggable [`ErrorHandler`], computes retry
//! delays from an ordered set of [`BackoffStrategy`] implementations, and
//! holds every outgoing call to the [`ApiBudget`]'s call-rate policies.
//! Retries are bounded by attempt count and by wall-clock time.
//!
//! ```no_run
//! use syphon_http::{HttpExecutor, RequestSpec};
//!
//! # async fn run() -> syphon_http::Result<()> {
//! let executor = HttpExecutor::new();
//! let (request, outcome) = executor
//!     .send(RequestSpec::get("https://api.example.com/v1/items").with_param("page", "1"))
//!     .await?;
//! println!("{} -> {:?}", request.url, outcome.status());
//! # Ok(())
//! # }
//! ```

mod auth;
mod backoff;
mod budget;
mod error;
mod executor;
mod handler;
mod request;
mod response;
mod transport;

pub use auth::{Authenticator, BearerAuth};
pub use backoff::{BackoffStrategy, ConstantBackoff, RetryAfterBackoff};
pub use budget::{ApiBudget, BudgetPolicy, CallRate, RequestMatcher};
pub use error::{ExecuteError, FailureKind, TransportError};
pub use executor::HttpExecutor;
pub use handler::{
    ErrorHandler, ErrorMessageParser, ErrorResolution, HttpStatusHandler, JsonErrorMessageParser,
    ResponseAction,
};
pub use request::{PreparedRequest, RawBody, RequestBody, RequestSpec};
pub use response::{CallOutcome, Response};
pub use transport::{HttpTransport, Transport};

pub type Result<T> = std::result::Result<T, ExecuteError>;
