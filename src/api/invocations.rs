//! Inference request handling.
//!
//! An incoming request is transcoded into the canonical `{"instances": ...}`
//! envelope, routed to a model endpoint, posted to the serving backend, and
//! the reply is normalized for the caller (error-escape splice, optional
//! JSON-Lines reframing) before being forwarded with the backend's status.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use memchr::{memchr, memmem};

use crate::routing::{RoutingAttributes, CUSTOM_ATTRIBUTES_HEADER};
use crate::state::AppState;
use crate::transcode::to_canonical;
use crate::transport::BackendResponse;

/// Serving emits 400 bodies with a stray backslash escape around the
/// `'instances'` token. Only the first occurrence is spliced, matching the
/// replacement callers already rely on.
const BROKEN_INSTANCES_ESCAPE: &[u8] = br"\'instances\'";
const FIXED_INSTANCES_TOKEN: &[u8] = b"'instances'";

const ACCEPT_JSONLINES: &str = "application/jsonlines";
const ACCEPT_JSONS: &str = "application/jsons";

pub(crate) async fn handler(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    body: Bytes,
) -> Response {
    let content_type = header_str(headers, CONTENT_TYPE.as_str());
    let envelope = match to_canonical(content_type, &body, state.config.features.csv_full_escaping)
    {
        Ok(envelope) => envelope,
        Err(err) => return err.into_response(),
    };

    let attributes = match RoutingAttributes::resolve(
        header_str(headers, CUSTOM_ATTRIBUTES_HEADER),
        path,
        state.default_model(),
    ) {
        Ok(attributes) => attributes,
        Err(err) => return err.into_response(),
    };

    let backend_path = attributes.backend_path(true);
    tracing::debug!(
        model = %attributes.model_name,
        backend_path = %backend_path,
        "forwarding inference request"
    );

    match state
        .transport
        .post(&backend_path, envelope.into_bytes())
        .await
    {
        Ok(reply) => normalize_response(reply, header_str(headers, ACCEPT.as_str())),
        Err(err) => {
            tracing::warn!(model = %attributes.model_name, error = %err, "backend call failed");
            err.into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Shape a backend reply for the caller. 400 bodies get the `'instances'`
/// escape splice first, then JSON-Lines accepts collapse the body to a single
/// line and take over the content type. Everything else passes through with
/// the backend's content type, defaulting to `application/json`.
fn normalize_response(reply: BackendResponse, accept: Option<&str>) -> Response {
    let mut body = reply.body;
    if reply.status == StatusCode::BAD_REQUEST {
        body = fix_instances_escape(body);
    }

    let mut content_type = reply.content_type;
    match accept {
        Some(ACCEPT_JSONLINES) => {
            body = strip_newlines(body);
            content_type = Some(HeaderValue::from_static(ACCEPT_JSONLINES));
        }
        Some(ACCEPT_JSONS) => {
            body = strip_newlines(body);
            content_type = Some(HeaderValue::from_static(ACCEPT_JSONS));
        }
        _ => {}
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = reply.status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        content_type.unwrap_or_else(|| HeaderValue::from_static("application/json")),
    );
    response
}

fn fix_instances_escape(body: Bytes) -> Bytes {
    let Some(start) = memmem::find(&body, BROKEN_INSTANCES_ESCAPE) else {
        return body;
    };
    let tail = start + BROKEN_INSTANCES_ESCAPE.len();
    let mut fixed =
        Vec::with_capacity(body.len() - BROKEN_INSTANCES_ESCAPE.len() + FIXED_INSTANCES_TOKEN.len());
    fixed.extend_from_slice(&body[..start]);
    fixed.extend_from_slice(FIXED_INSTANCES_TOKEN);
    fixed.extend_from_slice(&body[tail..]);
    Bytes::from(fixed)
}

fn strip_newlines(body: Bytes) -> Bytes {
    if memchr(b'\n', &body).is_none() {
        return body;
    }
    let compact: Vec<u8> = body.iter().copied().filter(|&byte| byte != b'\n').collect();
    Bytes::from(compact)
}
