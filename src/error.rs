/// Gateway error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),
    #[error("Unable to resolve model name: no tfs-model-name attribute, invoke URI, or configured default")]
    RoutingUnresolved,
    #[error("Backend request failed: {0}")]
    Backend(String),
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            GatewayError::UnsupportedMediaType(_) => http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::RoutingUnresolved => http::StatusCode::BAD_REQUEST,
            GatewayError::Backend(_) => http::StatusCode::BAD_GATEWAY,
        }
    }
}

/// Render an error as the gateway's JSON error body.
#[must_use]
pub fn error_payload(err: &GatewayError) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string() })
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, axum::Json(error_payload(&self))).into_response()
    }
}
