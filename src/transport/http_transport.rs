use std::time::Duration;

use bytes::Bytes;

use crate::config::ServerConfig;
use crate::error::BridgeError;

use super::PreparedUpstream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_LOG_LIMIT: usize = 4 * 1024;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    use_env_proxy: bool,
) -> Result<reqwest::Client, BridgeError> {
    // No total timeout: it would also cut long-lived response bodies. Only
    // acquisition is bounded, see `HttpTransport::open_stream`.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for the upstream event stream.
pub struct HttpTransport {
    client: reqwest::Client,
    acquire_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with pooling and the acquisition timeout from `config`.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = match build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            config.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "failed to build configured reqwest client, falling back to default client"
                );
                reqwest::Client::new()
            }
        };

        Self {
            client,
            acquire_timeout: Duration::from_secs(config.timeout),
        }
    }

    /// Override the acquisition timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// POST `body` upstream once and wait for a successful response head.
    ///
    /// The upstream call starts a message or workflow run, so it is never
    /// resent. Sending and the error-body read share one acquisition
    /// timeout; when it fires the in-flight request future is dropped, which
    /// releases its connection.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Timeout`] when no response head arrived in time.
    /// - [`BridgeError::Upstream`] for a non-success status.
    /// - [`BridgeError::Transport`] when the request could not be sent.
    pub async fn open_stream(
        &self,
        upstream: &PreparedUpstream,
        headers: http::HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, BridgeError> {
        let acquire = async {
            let response = self.send(upstream.url(), headers, body).await?;
            ensure_success(response).await
        };
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    url = %upstream.url(),
                    timeout_ms = self.acquire_timeout.as_millis(),
                    "upstream request timed out"
                );
                Err(BridgeError::Timeout)
            }
        }
    }

    async fn send(
        &self,
        url: &url::Url,
        headers: http::HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, BridgeError> {
        let mut request = reqwest::Request::new(http::Method::POST, url.clone());
        *request.headers_mut() = headers;
        *request.body_mut() = Some(reqwest::Body::from(body));
        self.client
            .execute(request)
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_bounded_body(response).await;
    tracing::error!(status = status.as_u16(), body = %body, "upstream returned an error status");
    Err(BridgeError::Upstream {
        status: status.as_u16(),
        message: body,
    })
}

async fn read_bounded_body(mut response: reqwest::Response) -> String {
    let mut buf = Vec::with_capacity(512);
    while buf.len() < ERROR_BODY_LOG_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "failed to read upstream error body");
                break;
            }
        }
    }
    buf.truncate(ERROR_BODY_LOG_LIMIT);
    String::from_utf8_lossy(&buf).into_owned()
}
