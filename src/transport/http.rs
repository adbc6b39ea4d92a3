use super::pool::{ConnectionPool, HttpClient};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use std::time::Duration;
use tracing::{debug, warn};

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP used by the auction client and the win/loss notifier.
///
/// Every call carries a hard deadline; implementations must give up and
/// return [`TransportError::Timeout`] once it passes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;

    /// GET a tracking URL
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

/// hyper-backed transport with per-host connection reuse
pub struct HyperTransport {
    pool: ConnectionPool,
    user_agent: String,
}

impl HyperTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_pool(ConnectionPool::new(), user_agent)
    }

    pub fn with_pool(pool: ConnectionPool, user_agent: impl Into<String>) -> Self {
        Self {
            pool,
            user_agent: user_agent.into(),
        }
    }

    fn client_for(&self, url: &str) -> Result<(Uri, std::sync::Arc<HttpClient>), TransportError> {
        let uri: Uri = url.parse().map_err(|e| TransportError::InvalidRequest {
            url: url.to_string(),
            reason: format!("{}", e),
        })?;
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| TransportError::InvalidRequest {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?;
        let client = self.pool.get_client(&host)?;
        Ok((uri, client))
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let (uri, client) = self.client_for(url)?;
        let mut all_headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), self.user_agent.clone()),
        ];
        all_headers.extend(headers.iter().cloned());
        send_request(&client, Method::POST, uri, &all_headers, body, timeout).await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let (uri, client) = self.client_for(url)?;
        let headers = vec![("user-agent".to_string(), self.user_agent.clone())];
        send_request(&client, Method::GET, uri, &headers, Bytes::new(), timeout).await
    }
}

/// Send one request with timeout control and collect the whole body
pub async fn send_request(
    client: &HttpClient,
    method: Method,
    uri: Uri,
    headers: &[(String, String)],
    body: Bytes,
    timeout: Duration,
) -> Result<HttpResponse, TransportError> {
    let url = uri.to_string();
    let mut builder = Request::builder().method(method.clone()).uri(uri);
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    let req = builder
        .body(Full::new(body))
        .map_err(|e| TransportError::InvalidRequest {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    debug!("Sending {} request to {}", method, url);

    let exchange = async {
        let resp = client
            .request(req)
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.clone(),
                reason: format!("Failed to read response body: {}", e),
            })?
            .to_bytes();
        Ok::<_, TransportError>(HttpResponse {
            status: status.as_u16(),
            body,
        })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(response)) => {
            debug!(
                "Received {} from {} ({} bytes)",
                response.status,
                url,
                response.body.len()
            );
            Ok(response)
        }
        Ok(Err(e)) => {
            warn!("{} {} failed: {}", method, url, e);
            Err(e)
        }
        Err(_) => {
            warn!("{} {} timed out after {:?}", method, url, timeout);
            Err(TransportError::Timeout { url, timeout })
        }
    }
}
