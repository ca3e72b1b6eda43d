use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_BACKEND_PORT: u16 = 18_501;

const TFS_MODELS_PREFIX: &str = "/tfs/v1/models/";

#[derive(Copy, Clone)]
enum MockScenario {
    Healthy,
    Reject,
    Loading,
    Missing,
    Error,
}

enum TfsRoute {
    ModelStatus,
    Inference,
}

struct RequestStats {
    status_probes: AtomicU64,
    inferences: AtomicU64,
    unmatched: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            status_probes: AtomicU64::new(0),
            inferences: AtomicU64::new(0),
            unmatched: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.status_probes.load(Ordering::Relaxed),
            self.inferences.load(Ordering::Relaxed),
            self.unmatched.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.status_probes.store(0, Ordering::Relaxed);
        self.inferences.store(0, Ordering::Relaxed);
        self.unmatched.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("BACKEND_PORT", DEFAULT_BACKEND_PORT);
    let scenario = parse_scenario();
    let state = Arc::new(MockState {
        scenario,
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock backend on 127.0.0.1:{port}: {err}"));

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
                eprintln!("mock backend connection error from {remote_addr}: {err}");
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

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("reject") => MockScenario::Reject,
        Ok("loading") => MockScenario::Loading,
        Ok("missing") => MockScenario::Missing,
        Ok("error") => MockScenario::Error,
        Ok("healthy") | Err(_) => MockScenario::Healthy,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to healthy");
            MockScenario::Healthy
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
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

    match classify_tfs_path(&method, path) {
        Some(TfsRoute::ModelStatus) => {
            state.stats.status_probes.fetch_add(1, Ordering::Relaxed);
            model_status_response(state.scenario)
        }
        Some(TfsRoute::Inference) => {
            state.stats.inferences.fetch_add(1, Ordering::Relaxed);
            inference_response(state.scenario)
        }
        None => {
            state.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            simple_response_static(
                StatusCode::NOT_FOUND,
                "application/json",
                br#"{"error":"not_found"}"#,
            )
        }
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

/// A path below the models prefix is an inference call when it carries a
/// `:method` suffix (POST) and a model status query otherwise (GET).
fn classify_tfs_path(method: &Method, path: &str) -> Option<TfsRoute> {
    let rest = path.strip_prefix(TFS_MODELS_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    if rest.contains(':') {
        (method == &Method::POST).then_some(TfsRoute::Inference)
    } else {
        (method == &Method::GET).then_some(TfsRoute::ModelStatus)
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (status_probes, inferences, unmatched) = state.stats.snapshot();
    let scenario = match state.scenario {
        MockScenario::Healthy => "healthy",
        MockScenario::Reject => "reject",
        MockScenario::Loading => "loading",
        MockScenario::Missing => "missing",
        MockScenario::Error => "error",
    };
    let body = format!(
        "{{\"scenario\":\"{scenario}\",\"status_probes\":{status_probes},\"inferences\":{inferences},\"unmatched\":{unmatched}}}"
    );
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn model_status_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    match scenario {
        MockScenario::Healthy | MockScenario::Reject => {
            simple_response_static(StatusCode::OK, "application/json", STATUS_AVAILABLE)
        }
        MockScenario::Loading => {
            simple_response_static(StatusCode::OK, "application/json", STATUS_LOADING)
        }
        MockScenario::Missing => {
            simple_response_static(StatusCode::NOT_FOUND, "application/json", MISSING_SERVABLE)
        }
        MockScenario::Error => simple_response_static(
            StatusCode::INTERNAL_SERVER_ERROR,
            "application/json",
            INTERNAL_ERROR,
        ),
    }
}

fn inference_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    match scenario {
        MockScenario::Healthy => {
            simple_response_static(StatusCode::OK, "application/json", PREDICT_OK)
        }
        MockScenario::Reject => {
            simple_response_static(StatusCode::BAD_REQUEST, "application/json", PREDICT_REJECTED)
        }
        MockScenario::Loading => simple_response_static(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            MODEL_UNAVAILABLE,
        ),
        MockScenario::Missing => {
            simple_response_static(StatusCode::NOT_FOUND, "application/json", MISSING_SERVABLE)
        }
        MockScenario::Error => simple_response_static(
            StatusCode::INTERNAL_SERVER_ERROR,
            "application/json",
            INTERNAL_ERROR,
        ),
    }
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

const STATUS_AVAILABLE: &[u8] = br#"{"model_version_status": [{"version": "1", "state": "AVAILABLE", "status": {"error_code": "OK", "error_message": ""}}]}"#;
const STATUS_LOADING: &[u8] = br#"{"model_version_status": [{"version": "1", "state": "LOADING", "status": {"error_code": "OK", "error_message": ""}}]}"#;
// Pretty-printed on purpose; the gateway strips these newlines for
// JSON-Lines accepts.
const PREDICT_OK: &[u8] = b"{\n    \"predictions\": [[3.5], [4.0]\n    ]\n}";
const PREDICT_REJECTED: &[u8] = br#"{ "error": "Failed to process element: 0 key: x1 of \'instances\' list. Error: Invalid argument: JSON object: does not have named input: x1" }"#;
const MODEL_UNAVAILABLE: &[u8] = br#"{ "error": "Model is not ready to serve requests yet" }"#;
const MISSING_SERVABLE: &[u8] = br#"{ "error": "Servable not found for request: Latest(None)" }"#;
const INTERNAL_ERROR: &[u8] = br#"{ "error": "mock_injected_error" }"#;
