use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{invocations, ping};
use crate::routing::invoke_path_model;
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Ping,
    Invocations,
    ModelInvoke,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let response = match route {
        RouteMatch::Ping => ping::handler(&state, &parts.headers, parts.uri.path()).await,
        RouteMatch::Invocations | RouteMatch::ModelInvoke => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            invocations::handler(&state, &parts.headers, parts.uri.path(), body_bytes).await
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 6MiB)",
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    match path {
        "/ping" => {
            if method == Method::GET {
                RouteMatch::Ping
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/invocations" => {
            if method == Method::POST {
                RouteMatch::Invocations
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => {
            if invoke_path_model(path).is_some() {
                if method == Method::POST {
                    RouteMatch::ModelInvoke
                } else {
                    RouteMatch::MethodNotAllowed
                }
            } else {
                RouteMatch::NotFound
            }
        }
    }
}
