use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};

use crate::config::{BackendConfig, ServerConfig};
use crate::error::GatewayError;

/// A fully buffered backend response: status, declared content type, body.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// HTTP client for the model-serving REST endpoint. One outbound call per
/// inbound request, no retries; failures surface as [`GatewayError::Backend`].
pub struct BackendClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl BackendClient {
    /// Build the pooled client and parse the backend base URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Backend`] when the base URL does not parse or
    /// the HTTP client cannot be constructed.
    pub fn new(server: &ServerConfig, backend: &BackendConfig) -> Result<Self, GatewayError> {
        let base_url = url::Url::parse(&backend.base_url)
            .map_err(|err| GatewayError::Backend(format!("Invalid base URL: {err}")))?;
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(server.http_pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(server.http_pool_idle_timeout_secs))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(server.timeout))
            .no_proxy()
            .build()
            .map_err(|err| GatewayError::Backend(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client, base_url })
    }

    /// GET a backend path (model status probes).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Backend`] on connect, timeout, or read failure.
    pub async fn get(&self, path: &str) -> Result<BackendResponse, GatewayError> {
        self.send(Method::GET, path, None).await
    }

    /// POST a JSON body to a backend path.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Backend`] on connect, timeout, or read failure.
    pub async fn post(&self, path: &str, body: Bytes) -> Result<BackendResponse, GatewayError> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| GatewayError::Backend(format!("Invalid backend path {path}: {err}")))?;

        let mut request = reqwest::Request::new(method, url);
        if let Some(body) = body {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *request.body_mut() = Some(reqwest::Body::from(body));
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| GatewayError::Backend(err.to_string()))?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Backend(err.to_string()))?;

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}
