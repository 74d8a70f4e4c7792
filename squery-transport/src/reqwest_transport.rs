use crate::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, trace};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Scheme, host and port that request paths are resolved against
    pub origin: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            timeout_ms: 30000,
        }
    }
}

/// `HttpTransport` over a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    config: TransportConfig,
    http_client: HttpClient,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn with_origin(origin: &str) -> Result<Self, TransportError> {
        Self::new(TransportConfig {
            origin: origin.to_string(),
            ..Default::default()
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.origin.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self
            .http_client
            .request(request.method, &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            trace!("Request body: {}", body);
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to send HTTP request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response body: {}", e)))?;

        debug!(%status, body_len = body.len(), "Received response");
        trace!("Response body: {}", body);

        Ok(HttpResponse { status, body })
    }
}
