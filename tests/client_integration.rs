use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use layered_http_client::{
    retry::headers as envoy, ClientOption, ConfigOptions, HttpClient, HttpClientError,
    RuntimeOption, StaticOption, TransportConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self::raw(status, body.to_string())
    }

    fn raw(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(|value| value.to_str().expect("ascii header"))
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

async fn capture_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state
        .captured
        .lock()
        .expect("capture mutex must not be poisoned")
        .push(CapturedRequest {
            method,
            uri,
            headers,
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(StatusCode::OK, json!({"status": "default"}))
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (
        response.status,
        [(header::CONTENT_TYPE, "application/json")],
        response.body,
    )
}

struct TestServer {
    base_url: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn requests(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .expect("capture mutex must not be poisoned")
            .clone()
    }

    fn only_request(&self) -> CapturedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().expect("one request")
    }
}

/// Binds below the ephemeral range: the client rejects ports above 49152.
async fn bind_listener() -> tokio::net::TcpListener {
    let offset = (std::process::id() % 10_000) as u16;
    for step in 0..10_000u16 {
        let port = 20_000 + (offset + step) % 10_000;
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            return listener;
        }
    }
    panic!("no free port in 20000..30000");
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        captured: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .fallback(capture_handler)
        .with_state(state.clone());

    let listener = bind_listener().await;
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        captured: state.captured,
        task,
    }
}

fn client_for(server: &TestServer, mut static_request: Vec<StaticOption>) -> HttpClient {
    static_request.insert(0, StaticOption::Url(server.base_url.clone()));
    HttpClient::new(ConfigOptions {
        static_request,
        ..ConfigOptions::default()
    })
    .expect("client must build")
}

#[derive(Debug, Serialize)]
struct Payload {
    name: String,
    something: String,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn request_json_body_is_sent_with_content_type() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))]).await;
    let payload = Payload {
        name: "test".to_owned(),
        something: "something2".to_owned(),
    };

    let client = HttpClient::new(ConfigOptions {
        client: vec![ClientOption::Client(reqwest::Client::new())],
        static_request: vec![StaticOption::Url(server.base_url.clone())],
        runtime: vec![
            RuntimeOption::Method(Method::POST),
            RuntimeOption::request_json(&payload).expect("payload must serialize"),
        ],
    })
    .expect("client must build");

    let mut response = JsonValue::Null;
    client
        .send([RuntimeOption::response_json(&mut response)])
        .await
        .expect("send must succeed");

    let request = server.only_request();
    let sent: JsonValue = serde_json::from_slice(&request.body).expect("body must be json");
    assert_eq!(sent, json!({"name": "test", "something": "something2"}));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.method, Method::POST);
    assert_eq!(response, json!({}));
}

#[tokio::test]
async fn response_json_is_decoded_from_path_and_query() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"id": 7, "name": "Kit"}),
    )])
    .await;
    let client = client_for(&server, Vec::new());

    let mut user = User::default();
    client
        .send([
            RuntimeOption::Path("/v1/users".to_owned()),
            RuntimeOption::query_params([("q", "rust lang"), ("limit", "10")]),
            RuntimeOption::response_json(&mut user),
        ])
        .await
        .expect("send must succeed");

    assert_eq!(
        user,
        User {
            id: 7,
            name: "Kit".to_owned()
        }
    );
    let request = server.only_request();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.uri.path(), "/v1/users");
    assert_eq!(request.uri.query(), Some("limit=10&q=rust+lang"));
}

#[tokio::test]
async fn response_body_is_copied_verbatim() {
    let server = spawn_server(vec![MockResponse::raw(StatusCode::OK, "plain text, not json")]).await;
    let client = client_for(&server, Vec::new());

    let mut sink = Vec::new();
    client
        .send([RuntimeOption::response_body(&mut sink)])
        .await
        .expect("send must succeed");

    assert_eq!(sink, b"plain text, not json");
}

#[tokio::test]
async fn non_200_status_is_reported_with_code() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::CREATED, json!({"id": 1})),
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
    ])
    .await;
    let client = client_for(&server, Vec::new());

    for expected in [201u16, 503] {
        let mut sink = Vec::new();
        let err = client
            .send([RuntimeOption::response_body(&mut sink)])
            .await
            .expect_err("non-200 must fail");
        match err {
            HttpClientError::Status { status, body } => {
                assert_eq!(status, expected);
                assert!(!body.is_empty());
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(sink.is_empty(), "sink must stay untouched on failure");
    }
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn malformed_response_json_is_a_decode_error() {
    let server = spawn_server(vec![MockResponse::raw(StatusCode::OK, "{\"id\": ")]).await;
    let client = client_for(&server, Vec::new());

    let mut user = User::default();
    let err = client
        .send([RuntimeOption::response_json(&mut user)])
        .await
        .expect_err("malformed json must fail");
    assert!(matches!(err, HttpClientError::Decode(_)));
}

#[tokio::test]
async fn static_runtime_and_retry_headers_are_merged() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))]).await;
    let client = client_for(
        &server,
        vec![
            StaticOption::HostHeader("orders.internal".to_owned()),
            StaticOption::headers([("x-api-key", "static-key"), ("x-team", "payments")]),
            StaticOption::default_retry_policy(),
        ],
    );

    let mut sink = Vec::new();
    client
        .send([
            RuntimeOption::Header("x-team".to_owned(), "checkout".to_owned()),
            RuntimeOption::response_body(&mut sink),
        ])
        .await
        .expect("send must succeed");

    let request = server.only_request();
    assert_eq!(request.header("host"), Some("orders.internal"));
    assert_eq!(request.header("x-api-key"), Some("static-key"));
    assert_eq!(request.header("x-team"), Some("checkout"));
    assert_eq!(request.header(envoy::MAX_RETRIES), Some("3"));
    assert_eq!(request.header(envoy::TOTAL_TIMEOUT_MS), Some("31000"));
    assert_eq!(request.header(envoy::PER_TRY_TIMEOUT_MS), Some("10000"));
    assert_eq!(request.header(envoy::RETRIABLE_STATUS_CODES), Some("429,502,503"));
    assert_eq!(
        request.header(envoy::RETRY_ON),
        Some("connect-failure,envoy-ratelimited,retriable-4xx,refused-stream,retriable-status-codes")
    );
}

#[tokio::test]
async fn url_userinfo_is_sent_as_basic_auth() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))]).await;
    let url = server.base_url.replacen("http://", "http://svc:secret@", 1);
    let client = HttpClient::new(ConfigOptions {
        static_request: vec![StaticOption::Url(url)],
        ..ConfigOptions::default()
    })
    .expect("client must build");

    let mut sink = Vec::new();
    client
        .send([RuntimeOption::response_body(&mut sink)])
        .await
        .expect("send must succeed");

    // base64("svc:secret")
    assert_eq!(
        server.only_request().header("authorization"),
        Some("Basic c3ZjOnNlY3JldA==")
    );
}

#[tokio::test]
async fn request_goes_to_the_validated_host_and_port() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))]).await;
    let authority = server.base_url.trim_start_matches("http://").to_owned();
    let client = HttpClient::new(ConfigOptions {
        static_request: vec![
            StaticOption::Scheme("http".to_owned()),
            StaticOption::HostPort(authority.clone()),
        ],
        ..ConfigOptions::default()
    })
    .expect("client must build");

    let mut sink = Vec::new();
    client
        .send([
            RuntimeOption::Path("/p".to_owned()),
            RuntimeOption::response_body(&mut sink),
        ])
        .await
        .expect("send must succeed");

    let request = server.only_request();
    assert_eq!(request.header("host"), Some(authority.as_str()));
    assert_eq!(request.uri.path(), "/p");
    assert_eq!(request.uri.query(), None);
    assert_eq!(request.header("authorization"), None);
}

#[test]
fn host_with_url_syntax_never_builds_a_client() {
    for host_port in ["svc#x:8080", "a?b:8080", "user@evil.com:8080"] {
        let err = HttpClient::new(ConfigOptions {
            static_request: vec![
                StaticOption::Scheme("http".to_owned()),
                StaticOption::HostPort(host_port.to_owned()),
            ],
            ..ConfigOptions::default()
        })
        .expect_err("host must be rejected");
        assert!(matches!(err, HttpClientError::Validation(_)), "{host_port}: {err}");
    }
}

#[tokio::test]
async fn baseline_options_apply_to_every_call_without_leaking_between_calls(
) -> anyhow::Result<()> {
    let server = spawn_server(Vec::new()).await;
    let client = HttpClient::new(ConfigOptions {
        client: vec![ClientOption::Transport(TransportConfig::default())],
        static_request: vec![StaticOption::Url(server.base_url.clone())],
        runtime: vec![
            RuntimeOption::Header("x-baseline".to_owned(), "yes".to_owned()),
            RuntimeOption::Path("/jobs".to_owned()),
        ],
    })?;

    let mut first = JsonValue::Null;
    let mut second = JsonValue::Null;
    let (a, b) = tokio::join!(
        client.send([
            RuntimeOption::Header("x-call".to_owned(), "one".to_owned()),
            RuntimeOption::QueryParam("page".to_owned(), "1".to_owned()),
            RuntimeOption::response_json(&mut first),
        ]),
        client.send([RuntimeOption::response_json(&mut second)]),
    );
    a?;
    b?;

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|request| request.header("x-baseline") == Some("yes") && request.uri.path() == "/jobs"));

    let with_call = requests
        .iter()
        .filter(|request| request.header("x-call") == Some("one"))
        .collect::<Vec<_>>();
    assert_eq!(with_call.len(), 1);
    assert_eq!(with_call[0].uri.query(), Some("page=1"));

    let without_call = requests
        .iter()
        .find(|request| request.header("x-call").is_none())
        .expect("second call must not inherit first call headers");
    assert_eq!(without_call.uri.query(), None);

    assert_eq!(first, json!({"status": "default"}));
    assert_eq!(second, json!({"status": "default"}));
    Ok(())
}

#[tokio::test]
async fn call_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))
        .with_delay(Duration::from_millis(300))])
    .await;
    let client = client_for(&server, Vec::new());

    let mut sink = Vec::new();
    let err = client
        .send([
            RuntimeOption::Timeout(Duration::from_millis(20)),
            RuntimeOption::response_body(&mut sink),
        ])
        .await
        .expect_err("request must time out");

    match err {
        HttpClientError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn client_timeout_applies_to_built_transport() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))
        .with_delay(Duration::from_millis(300))])
    .await;
    let client = HttpClient::new(ConfigOptions {
        client: vec![ClientOption::Timeout(Duration::from_millis(20))],
        static_request: vec![StaticOption::Url(server.base_url.clone())],
        ..ConfigOptions::default()
    })
    .expect("client must build");

    let mut sink = Vec::new();
    let err = client
        .send([RuntimeOption::response_body(&mut sink)])
        .await
        .expect_err("request must time out");
    assert!(matches!(err, HttpClientError::Transport(inner) if inner.is_timeout()));
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = bind_listener().await;
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let client = HttpClient::new(ConfigOptions {
        static_request: vec![StaticOption::Url(format!("http://{address}"))],
        ..ConfigOptions::default()
    })
    .expect("client must build");

    let mut sink = Vec::new();
    let err = client
        .send([RuntimeOption::response_body(&mut sink)])
        .await
        .expect_err("nothing listens on the port");
    assert!(matches!(err, HttpClientError::Transport(_)));
}

#[tokio::test]
async fn conflicting_targets_never_reach_the_server() {
    let server = spawn_server(Vec::new()).await;
    let client = client_for(&server, Vec::new());

    let mut sink = Vec::new();
    let mut user = User::default();
    let err = client
        .send([
            RuntimeOption::response_body(&mut sink),
            RuntimeOption::response_json(&mut user),
        ])
        .await
        .expect_err("two targets must conflict");
    assert!(matches!(err, HttpClientError::Conflict(_)));

    let err = client
        .send(Vec::<RuntimeOption>::new())
        .await
        .expect_err("missing target must fail");
    assert!(matches!(err, HttpClientError::NoResponseTarget));

    assert!(server.requests().is_empty());
}
