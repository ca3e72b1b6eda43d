use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::{Json, Router};
use serde_json::json;
use tfs_gateway::config::AppConfig;
use tfs_gateway::routing::dispatch::dispatch_request;
use tfs_gateway::state::AppState;
use tfs_gateway::transport::BackendClient;

fn gateway_config(base_url: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.base_url = base_url;
    config.backend.default_model_name = Some("half_plus_three".to_string());
    config
}

fn build_state(config: AppConfig) -> Arc<AppState> {
    let transport = BackendClient::new(&config.server, &config.backend).expect("backend client");
    Arc::new(AppState::new(config, transport))
}

async fn spawn_backend(app: Router) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, server)
}

/// Mock serving endpoint that reflects the request back as JSON so tests can
/// assert on the exact path and body the gateway produced.
async fn echo_handler(request: axum::extract::Request) -> Json<serde_json::Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    Json(json!({
        "path": parts.uri.path(),
        "method": parts.method.as_str(),
        "content_type": parts
            .headers
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default(),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn read_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn test_generic_json_is_wrapped_and_routed_to_default_model() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .body(Body::from("{\"x1\": 6.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("application/json")
    );

    let payload = read_json(response).await;
    assert_eq!(payload["method"], "POST");
    assert_eq!(payload["path"], "/tfs/v1/models/half_plus_three:predict");
    assert_eq!(payload["content_type"], "application/json");
    assert_eq!(payload["body"], "{\"instances\":[{\"x1\": 6.0}]}");

    server.abort();
}

#[tokio::test]
async fn test_custom_attributes_route_version_and_method() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .header(
            "X-Amzn-SageMaker-Custom-Attributes",
            "tfs-model-name=resnet,tfs-model-version=5,tfs-method=classify",
        )
        .body(Body::from("{\"examples\": [{\"pixels\": [0, 1]}]}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["path"], "/tfs/v1/models/resnet/versions/5:classify");
    assert_eq!(payload["body"], "{\"examples\": [{\"pixels\": [0, 1]}]}");

    server.abort();
}

#[tokio::test]
async fn test_invoke_uri_overrides_default_model() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/models/resnet/invoke")
        .header("content-type", "application/json")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["path"], "/tfs/v1/models/resnet:predict");

    server.abort();
}

#[tokio::test]
async fn test_jsonlines_request_is_merged() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/jsonlines")
        .body(Body::from("{\"a\": 1}\n{\"a\": 2}\n"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["body"], "{\"instances\":[{\"a\": 1},{\"a\": 2}]}");

    server.abort();
}

#[tokio::test]
async fn test_csv_request_is_transcoded() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "text/csv")
        .body(Body::from("1.0,2.0\n3.0,4.0"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["body"], "{\"instances\":[[1.0,2.0],[3.0,4.0]]}");

    server.abort();
}

#[tokio::test]
async fn test_native_envelope_passes_through() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let envelope = "{\"signature_name\": \"serving_default\", \"instances\": [1.0, 2.0]}";
    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .body(Body::from(envelope))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["body"], envelope);

    server.abort();
}

#[tokio::test]
async fn test_unsupported_content_type_rejected_before_backend() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&hits_clone);
        async move {
            hits.fetch_add(1, Ordering::Relaxed);
            Json(json!({}))
        }
    });
    let (addr, server) = spawn_backend(app).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "text/plain")
        .body(Body::from("hello"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let payload = read_json(response).await;
    assert_eq!(payload["error"], "Unsupported Media Type: text/plain");
    assert_eq!(hits.load(Ordering::Relaxed), 0);

    server.abort();
}

#[tokio::test]
async fn test_missing_content_type_reports_unknown() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let payload = read_json(response).await;
    assert_eq!(payload["error"], "Unsupported Media Type: Unknown");

    server.abort();
}

#[tokio::test]
async fn test_unresolved_model_is_rejected() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&hits_clone);
        async move {
            hits.fetch_add(1, Ordering::Relaxed);
            Json(json!({}))
        }
    });
    let (addr, server) = spawn_backend(app).await;

    let mut config = gateway_config(format!("http://{addr}"));
    config.backend.default_model_name = None;
    let state = build_state(config);

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let payload = read_json(response).await;
    let message = payload["error"].as_str().expect("error message");
    assert!(message.contains("Unable to resolve model name"));
    assert_eq!(hits.load(Ordering::Relaxed), 0);

    server.abort();
}

#[tokio::test]
async fn test_jsonlines_accept_strips_newlines_from_reply() {
    let app = Router::new().fallback(|| async {
        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .body(Body::from("{\"predictions\": [\n    [3.5]\n]}"))
            .expect("mock response")
    });
    let (addr, server) = spawn_backend(app).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .header("accept", "application/jsonlines")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("application/jsonlines")
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    assert_eq!(body.as_ref(), b"{\"predictions\": [    [3.5]]}");

    server.abort();
}

#[tokio::test]
async fn test_backend_bad_request_escape_is_spliced() {
    let app = Router::new().fallback(|| async {
        Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("content-type", "application/json")
            .body(Body::from(
                "{ \"error\": \"Failed to process element: 0 of \\'instances\\' list\" }",
            ))
            .expect("mock response")
    });
    let (addr, server) = spawn_backend(app).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let text = String::from_utf8(body.to_vec()).expect("utf8 body");
    assert!(text.contains("of 'instances' list"));
    assert!(!text.contains("\\'"));

    server.abort();
}

#[tokio::test]
async fn test_unreachable_backend_maps_to_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .body(Body::from("{\"x1\": 1.0}"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let payload = read_json(response).await;
    let message = payload["error"].as_str().expect("error message");
    assert!(message.contains("Backend request failed"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().fallback(move || {
        let hits = Arc::clone(&hits_clone);
        async move {
            hits.fetch_add(1, Ordering::Relaxed);
            Json(json!({}))
        }
    });
    let (addr, server) = spawn_backend(app).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "text/csv")
        .body(Body::from(vec![b'1'; 6 * 1024 * 1024 + 1]))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(hits.load(Ordering::Relaxed), 0);

    server.abort();
}

#[tokio::test]
async fn test_unknown_paths_and_methods_are_rejected() {
    let (addr, server) = spawn_backend(Router::new().fallback(echo_handler)).await;
    let state = build_state(gateway_config(format!("http://{addr}")));

    let not_found = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), not_found)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let wrong_method = Request::builder()
        .method("GET")
        .uri("/invocations")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), wrong_method)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let ping_post = Request::builder()
        .method("POST")
        .uri("/ping")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(state, ping_post).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    server.abort();
}
