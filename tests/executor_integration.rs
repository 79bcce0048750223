use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use axum::{body::Body, extract::State, http::StatusCode};
use syphon_http::{
    ApiBudget, BudgetPolicy, CallOutcome, CallRate, ConstantBackoff, ErrorHandler, ErrorResolution,
    ExecuteError, FailureKind, HttpStatusHandler, RequestMatcher, RequestSpec,
};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockResponse {
    fn with_status(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
}

async fn mock_handler(State(state): State<MockState>) -> axum::response::Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error": "no mock response available"}"#,
            )
        })
    };

    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .expect("mock response must build")
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = axum::Router::new()
        .fallback(mock_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        task,
    }
}

fn executor() -> syphon_http::HttpExecutor {
    syphon_http::HttpExecutor::new()
}

#[tokio::test]
async fn success_returns_issued_request_and_response() {
    let server = spawn_server(vec![MockResponse::with_status(
        StatusCode::OK,
        r#"{"items": []}"#,
    )])
    .await;

    let (request, outcome) = executor()
        .send(RequestSpec::get(server.url("/v1/items")).with_param("page", "2"))
        .await
        .expect("request must succeed");

    assert_eq!(request.url.query(), Some("page=2"));
    let response = outcome.into_response().expect("must carry a response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), r#"{"items": []}"#);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_error_is_retried_until_success() {
    let server = spawn_server(vec![
        MockResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error": "boom"}"#),
        MockResponse::with_status(StatusCode::OK, "{}"),
    ])
    .await;

    let executor = executor()
        .with_backoff_strategies(vec![Arc::new(ConstantBackoff::new(Duration::from_millis(1)))]);

    let (_, outcome) = executor
        .send(RequestSpec::get(server.url("/v1/items")))
        .await
        .expect("request must succeed after retry");

    assert_eq!(outcome.status(), Some(StatusCode::OK));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn not_found_fails_immediately_without_retry() {
    let server = spawn_server(vec![MockResponse::with_status(
        StatusCode::NOT_FOUND,
        r#"{"message": "no such stream"}"#,
    )])
    .await;

    let start = Instant::now();
    let err = executor()
        .send(RequestSpec::get(server.url("/v1/missing")))
        .await
        .expect_err("request must fail");

    assert_eq!(err.failure_kind(), FailureKind::System);
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("no such stream"));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn retry_after_header_drives_the_retry() {
    let server = spawn_server(vec![
        MockResponse::with_status(StatusCode::TOO_MANY_REQUESTS, "{}")
            .with_header("retry-after", "0"),
        MockResponse::with_status(StatusCode::OK, "{}"),
    ])
    .await;

    let (_, outcome) = executor()
        .send(RequestSpec::get(server.url("/v1/items")))
        .await
        .expect("request must succeed after rate-limit retry");

    assert_eq!(outcome.status(), Some(StatusCode::OK));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

/// Treats 404 as ignorable, delegating everything else to the default
/// classification.
struct IgnoreNotFound {
    inner: HttpStatusHandler,
}

impl ErrorHandler for IgnoreNotFound {
    fn interpret(&self, outcome: &CallOutcome) -> ErrorResolution {
        if outcome.status() == Some(StatusCode::NOT_FOUND) {
            return ErrorResolution::ignore();
        }
        self.inner.interpret(outcome)
    }
}

#[tokio::test]
async fn ignored_response_is_returned_unmodified() {
    let server = spawn_server(vec![MockResponse::with_status(
        StatusCode::NOT_FOUND,
        "entity vanished",
    )])
    .await;

    let executor = executor().with_error_handler(Arc::new(IgnoreNotFound {
        inner: HttpStatusHandler::new(),
    }));

    let (_, outcome) = executor
        .send(RequestSpec::get(server.url("/v1/items/42")))
        .await
        .expect("ignored outcome must not raise");

    let response = outcome.into_response().expect("must carry the response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "entity vanished");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn error_message_is_parsed_from_json_body() {
    let server = spawn_server(vec![MockResponse::with_status(
        StatusCode::BAD_REQUEST,
        r#"{"error": "Invalid project id"}"#,
    )])
    .await;

    let err = executor()
        .send(RequestSpec::get(server.url("/v1/export")))
        .await
        .expect_err("request must fail");

    assert!(err.to_string().contains("Invalid project id"));
    assert_eq!(err.failure_kind(), FailureKind::System);
}

/// Classifies everything as success, leaving non-2xx statuses to the
/// executor's unclassified-error path.
struct AlwaysSucceed;

impl ErrorHandler for AlwaysSucceed {
    fn interpret(&self, _outcome: &CallOutcome) -> ErrorResolution {
        ErrorResolution::success()
    }
}

#[tokio::test]
async fn unclassified_error_status_fails_as_system() {
    let server = spawn_server(vec![MockResponse::with_status(
        StatusCode::BAD_GATEWAY,
        "bad gateway",
    )])
    .await;

    let err = executor()
        .with_error_handler(Arc::new(AlwaysSucceed))
        .send(RequestSpec::get(server.url("/v1/items")))
        .await
        .expect_err("non-success status without a resolution must fail");

    assert_eq!(err.failure_kind(), FailureKind::System);
    assert!(err.to_string().contains("unhandled status code '502'"));
}

#[tokio::test]
async fn budget_serializes_concurrent_requests() {
    let server = spawn_server(vec![
        MockResponse::with_status(StatusCode::OK, "{}"),
        MockResponse::with_status(StatusCode::OK, "{}"),
        MockResponse::with_status(StatusCode::OK, "{}"),
    ])
    .await;

    let budget = ApiBudget::new(vec![BudgetPolicy::new(
        RequestMatcher::any().with_path_prefix("/v1"),
        CallRate::per_second(1),
    )]);
    let executor = executor().with_api_budget(Arc::new(budget));

    let start = Instant::now();
    let (first, second, third) = tokio::join!(
        executor.send(RequestSpec::get(server.url("/v1/items"))),
        executor.send(RequestSpec::get(server.url("/v1/items"))),
        executor.send(RequestSpec::get(server.url("/v1/items"))),
    );
    first.expect("first request must succeed");
    second.expect("second request must succeed");
    third.expect("third request must succeed");

    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    assert!(
        start.elapsed() >= Duration::from_millis(1900),
        "three calls at one per second must take about two seconds, took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn connection_failures_escalate_after_the_retry_budget() {
    // Grab a port that nothing is listening on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let executor = executor()
        .with_error_handler(Arc::new(HttpStatusHandler::new().with_max_retries(1)))
        .with_backoff_strategies(vec![Arc::new(ConstantBackoff::new(Duration::from_millis(1)))]);

    let err = executor
        .send(RequestSpec::get(format!("http://{address}/v1/items")))
        .await
        .expect_err("connection must fail");

    assert_eq!(err.failure_kind(), FailureKind::Transient);
    assert_eq!(err.status(), None);
    assert!(matches!(err, ExecuteError::Failed { .. }));
    assert!(err.to_string().contains("transport error"));
}
