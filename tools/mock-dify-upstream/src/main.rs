use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode, Version};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_002;

#[derive(Copy, Clone)]
enum MockScenario {
    /// `message` deltas closed by `message_end`.
    Answer,
    /// `text_chunk` deltas closed by `workflow_finished`.
    Workflow,
    /// An in-band `error` event after one delta.
    ErrorEvent,
    /// Deltas with no terminal event.
    Truncated,
    /// HTTP 503 before any stream starts.
    Unavailable,
}

#[derive(Copy, Clone)]
enum DifyEndpoint {
    Chat,
    Completion,
    Workflow,
}

struct RequestStats {
    h1: AtomicU64,
    h2: AtomicU64,
    other: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            h1: AtomicU64::new(0),
            h2: AtomicU64::new(0),
            other: AtomicU64::new(0),
        }
    }

    fn record(&self, version: Version) {
        match version {
            Version::HTTP_10 | Version::HTTP_11 => {
                self.h1.fetch_add(1, Ordering::Relaxed);
            }
            Version::HTTP_2 => {
                self.h2.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.other.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.h1.load(Ordering::Relaxed),
            self.h2.load(Ordering::Relaxed),
            self.other.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.h1.store(0, Ordering::Relaxed);
        self.h2.store(0, Ordering::Relaxed);
        self.other.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    scenario: MockScenario,
    head_delay: Duration,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        head_delay: Duration::from_millis(env_u64("MOCK_HEAD_DELAY_MS", 0)),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!("mock dify upstream listening on http://127.0.0.1:{port}/v1");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("workflow") => MockScenario::Workflow,
        Ok("error") => MockScenario::ErrorEvent,
        Ok("truncated") => MockScenario::Truncated,
        Ok("unavailable") => MockScenario::Unavailable,
        Ok("answer") | Err(_) => MockScenario::Answer,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to answer");
            MockScenario::Answer
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    state.stats.record(parts.version);
    drain_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response_static(StatusCode::OK, "application/json", br#"{"ok":true}"#);
    }
    if method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"code":"method_not_allowed"}"#,
        );
    }

    let Some(endpoint) = endpoint_for_path(path) else {
        return simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"code":"not_found","message":"The requested URL was not found on the server.","status":404}"#,
        );
    };

    if !state.head_delay.is_zero() {
        tokio::time::sleep(state.head_delay).await;
    }

    if matches!(state.scenario, MockScenario::Unavailable) {
        return simple_response_static(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            br#"{"code":"mock_injected_error","message":"upstream unavailable","status":503}"#,
        );
    }

    streaming_response(endpoint, state.scenario)
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn endpoint_for_path(path: &str) -> Option<DifyEndpoint> {
    match path {
        "/v1/chat-messages" | "/chat-messages" => Some(DifyEndpoint::Chat),
        "/v1/completion-messages" | "/completion-messages" => Some(DifyEndpoint::Completion),
        "/v1/workflows/run" | "/workflows/run" => Some(DifyEndpoint::Workflow),
        _ => None,
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (h1, h2, other) = state.stats.snapshot();
    let scenario = match state.scenario {
        MockScenario::Answer => "answer",
        MockScenario::Workflow => "workflow",
        MockScenario::ErrorEvent => "error",
        MockScenario::Truncated => "truncated",
        MockScenario::Unavailable => "unavailable",
    };
    let body = format!(
        "{{\"scenario\":\"{scenario}\",\"head_delay_ms\":{},\"h1\":{h1},\"h2\":{h2},\"other\":{other}}}",
        state.head_delay.as_millis()
    );
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn streaming_response(endpoint: DifyEndpoint, scenario: MockScenario) -> Response<Full<Bytes>> {
    let body = match (endpoint, scenario) {
        (DifyEndpoint::Workflow, MockScenario::Answer | MockScenario::Workflow)
        | (_, MockScenario::Workflow) => WORKFLOW_STREAM,
        (_, MockScenario::Answer) => ANSWER_STREAM,
        (_, MockScenario::ErrorEvent) => ERROR_EVENT_STREAM,
        (_, MockScenario::Truncated) => TRUNCATED_STREAM,
        (_, MockScenario::Unavailable) => &b""[..],
    };
    let mut response = simple_response_static(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const ANSWER_STREAM: &[u8] = b"data: {\"event\": \"message\", \"message_id\": \"m1\", \"conversation_id\": \"c1\", \"answer\": \"o\", \"created_at\": 1705395332}\n\ndata: {\"event\": \"message\", \"message_id\": \"m1\", \"conversation_id\": \"c1\", \"answer\": \"k\", \"created_at\": 1705395332}\n\nevent: ping\n\ndata: {\"event\": \"message_end\", \"message_id\": \"m1\", \"conversation_id\": \"c1\", \"metadata\": {\"usage\": {\"prompt_tokens\": 1, \"completion_tokens\": 1, \"total_tokens\": 2}}}\n\n";
const WORKFLOW_STREAM: &[u8] = b"data: {\"event\": \"workflow_started\", \"task_id\": \"t1\", \"workflow_run_id\": \"r1\", \"data\": {\"id\": \"r1\", \"workflow_id\": \"w1\", \"created_at\": 1705395332}}\n\ndata: {\"event\": \"text_chunk\", \"task_id\": \"t1\", \"data\": {\"text\": \"o\"}}\n\ndata: {\"event\": \"text_chunk\", \"task_id\": \"t1\", \"data\": {\"text\": \"k\"}}\n\ndata: {\"event\": \"workflow_finished\", \"task_id\": \"t1\", \"workflow_run_id\": \"r1\", \"data\": {\"id\": \"r1\", \"status\": \"succeeded\", \"outputs\": {\"text\": \"ok\"}, \"total_tokens\": 2, \"created_at\": 1705395332}}\n\n";
const ERROR_EVENT_STREAM: &[u8] = b"data: {\"event\": \"message\", \"message_id\": \"m1\", \"answer\": \"o\", \"created_at\": 1705395332}\n\ndata: {\"event\": \"error\", \"message_id\": \"m1\", \"status\": 400, \"code\": \"invalid_param\", \"message\": \"mock injected error\"}\n\n";
const TRUNCATED_STREAM: &[u8] = b"data: {\"event\": \"message\", \"message_id\": \"m1\", \"answer\": \"o\", \"created_at\": 1705395332}\n\n";
