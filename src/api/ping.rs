//! Health probing against the serving backend.
//!
//! Two probe styles exist. When a single model is hosted and its name is
//! known, the model status endpoint is queried directly and the servable
//! state is inspected. Multi-model hosting (or an unresolvable model name)
//! falls back to a synthetic inference with a deliberately invalid payload:
//! any reply proving the serving process is alive counts as healthy.

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use memchr::memmem;
use std::sync::LazyLock;

use crate::routing::{RoutingAttributes, CUSTOM_ATTRIBUTES_HEADER};
use crate::state::AppState;

/// Servable state marker inside a model status reply, quotes included.
static AVAILABLE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(b"\"AVAILABLE\""));

/// Error emitted by a live serving process when the probed model is not
/// loaded. Seeing it still proves liveness.
static MISSING_SERVABLE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(b"Servable not found for request: Latest(None)"));

/// Model name rendered into synthetic probe URIs when nothing resolved.
const PLACEHOLDER_MODEL: &str = "None";

const SYNTHETIC_PROBE_BODY: &[u8] = br#"{"instances": "invalid"}"#;

pub(crate) async fn handler(state: &AppState, headers: &HeaderMap, path: &str) -> Response {
    let resolved = RoutingAttributes::resolve(
        headers
            .get(CUSTOM_ATTRIBUTES_HEADER)
            .and_then(|value| value.to_str().ok()),
        path,
        state.default_model(),
    );

    match resolved {
        Ok(attributes) if !state.config.backend.multi_model => {
            model_status_probe(state, &attributes).await
        }
        Ok(attributes) => synthetic_probe(state, &attributes).await,
        Err(_) => synthetic_probe(state, &RoutingAttributes::for_model(PLACEHOLDER_MODEL)).await,
    }
}

async fn model_status_probe(state: &AppState, attributes: &RoutingAttributes) -> Response {
    let path = attributes.backend_path(false);
    match state.transport.get(&path).await {
        Ok(reply) if status_reply_healthy(reply.status, &reply.body) => {
            status_only(StatusCode::OK)
        }
        Ok(reply) => {
            tracing::error!(
                model = %attributes.model_name,
                status = reply.status.as_u16(),
                body = %String::from_utf8_lossy(&reply.body),
                "model status probe failed"
            );
            status_only(StatusCode::BAD_GATEWAY)
        }
        Err(err) => {
            tracing::error!(model = %attributes.model_name, error = %err, "model status probe failed");
            status_only(StatusCode::BAD_GATEWAY)
        }
    }
}

async fn synthetic_probe(state: &AppState, attributes: &RoutingAttributes) -> Response {
    let path = attributes.backend_path(true);
    match state
        .transport
        .post(&path, Bytes::from_static(SYNTHETIC_PROBE_BODY))
        .await
    {
        Ok(reply) if synthetic_reply_healthy(reply.status, &reply.body) => {
            status_only(StatusCode::OK)
        }
        Ok(reply) => {
            tracing::error!(
                model = %attributes.model_name,
                status = reply.status.as_u16(),
                body = %String::from_utf8_lossy(&reply.body),
                "synthetic probe failed"
            );
            status_only(StatusCode::BAD_GATEWAY)
        }
        Err(err) => {
            tracing::error!(model = %attributes.model_name, error = %err, "synthetic probe failed");
            status_only(StatusCode::BAD_GATEWAY)
        }
    }
}

fn status_reply_healthy(status: StatusCode, body: &[u8]) -> bool {
    status == StatusCode::OK && AVAILABLE_FINDER.find(body).is_some()
}

/// A synthetic probe proves liveness through the status alone (200 means the
/// junk payload somehow served, 400 means it was rejected by a live process)
/// or through the missing-servable complaint in any other reply.
fn synthetic_reply_healthy(status: StatusCode, body: &[u8]) -> bool {
    status == StatusCode::OK
        || status == StatusCode::BAD_REQUEST
        || MISSING_SERVABLE_FINDER.find(body).is_some()
}

fn status_only(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reply_requires_quoted_marker() {
        let body = br#"{"model_version_status": [{"state": "AVAILABLE"}]}"#;
        assert!(status_reply_healthy(StatusCode::OK, body));
        assert!(!status_reply_healthy(StatusCode::OK, b"state: AVAILABLE"));
    }

    #[test]
    fn test_status_reply_requires_ok_status() {
        let body = br#"{"state": "AVAILABLE"}"#;
        assert!(!status_reply_healthy(StatusCode::NOT_FOUND, body));
    }

    #[test]
    fn test_synthetic_reply_accepts_rejection_statuses() {
        assert!(synthetic_reply_healthy(StatusCode::OK, b"{}"));
        assert!(synthetic_reply_healthy(StatusCode::BAD_REQUEST, b"{}"));
        assert!(!synthetic_reply_healthy(StatusCode::INTERNAL_SERVER_ERROR, b"{}"));
    }

    #[test]
    fn test_synthetic_reply_accepts_missing_servable_complaint() {
        let body = b"{ \"error\": \"Servable not found for request: Latest(None)\" }";
        assert!(synthetic_reply_healthy(StatusCode::NOT_FOUND, body));
    }

    #[test]
    fn test_status_only_has_empty_body() {
        let response = status_only(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
