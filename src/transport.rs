/// HTTP transport used by the pipeline
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::request::{ApiRequest, ApiResponse, RequestBody};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// Sends one request and returns whatever the server answered.
///
/// Implementations return `Ok` for every HTTP status and `Err` only when no
/// response arrived. Status classification belongs to the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        (**self).send(request).await
    }
}

/// Transport built on an async `reqwest::Client`
///
/// The client keeps a cookie store so the refresh endpoint receives the
/// session cookie set by the authorization server.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    default_content_type: String,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// Use an existing client. Its timeout and cookie settings are kept as-is.
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_content_type: config.default_content_type.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        let ApiRequest {
            method,
            headers,
            body,
            ..
        } = request;

        // Form bodies carry their own content type
        let default_content_type = !headers.contains_key(CONTENT_TYPE)
            && !matches!(body, RequestBody::Form(_));

        let mut builder = self.client.request(method.clone(), &url).headers(headers);
        if default_content_type {
            builder = builder.header(CONTENT_TYPE, self.default_content_type.as_str());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
        };

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, timeout = e.is_timeout(), "HTTP request error");
            ApiError::from(e)
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(status = status, url = %url, "Received HTTP response");

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
