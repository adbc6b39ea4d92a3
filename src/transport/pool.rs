use crate::error::TransportError;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default keepalive timeout (60 seconds)
const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds)
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default max idle connections per host
const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 4;

/// HTTP client type with HTTPS support
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Keeps one HTTP client per endpoint host so auction and notification
/// traffic reuse warm connections.
pub struct ConnectionPool {
    /// Map from host (authority) to HTTP client
    clients: Arc<DashMap<String, Arc<HttpClient>>>,
    keepalive_timeout: Duration,
    connection_timeout: Duration,
    max_idle_connections: usize,
}

impl ConnectionPool {
    /// Create a new connection pool with default settings
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_KEEPALIVE_TIMEOUT,
            DEFAULT_CONNECTION_TIMEOUT,
            DEFAULT_MAX_IDLE_CONNECTIONS,
        )
    }

    /// Create a new connection pool with custom configuration
    pub fn with_config(
        keepalive_timeout: Duration,
        connection_timeout: Duration,
        max_idle_connections: usize,
    ) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            keepalive_timeout,
            connection_timeout,
            max_idle_connections,
        }
    }

    /// Get or create the HTTP client for a host
    pub fn get_client(&self, host: &str) -> Result<Arc<HttpClient>, TransportError> {
        if let Some(client) = self.clients.get(host) {
            return Ok(Arc::clone(client.value()));
        }

        debug!("Creating new HTTP client for host: {}", host);
        let client = Arc::new(self.create_client()?);

        // A racing caller may have inserted first; keep whichever landed
        let entry = self
            .clients
            .entry(host.to_string())
            .or_insert_with(|| Arc::clone(&client));
        Ok(Arc::clone(entry.value()))
    }

    /// Number of hosts with a live client
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn create_client(&self) -> Result<HttpClient, TransportError> {
        let mut http_connector = HttpConnector::new();
        http_connector.set_keepalive(Some(self.keepalive_timeout));
        http_connector.set_connect_timeout(Some(self.connection_timeout));
        // The TLS wrapper decides per request whether to negotiate TLS
        http_connector.enforce_http(false);

        let builder = match HttpsConnectorBuilder::new()
            .with_provider_and_native_roots(rustls::crypto::ring::default_provider())
        {
            Ok(builder) => builder,
            Err(e) => {
                // Plain http endpoints keep working; https will fail verification
                warn!("Native root certificates unavailable: {}", e);
                let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
                    rustls::crypto::ring::default_provider(),
                ))
                .with_safe_default_protocol_versions()
                .map_err(|e| TransportError::ClientInit {
                    reason: format!("Failed to build TLS config: {}", e),
                })?
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };

        let https_connector = builder
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        Ok(Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(self.max_idle_connections)
            .pool_idle_timeout(self.keepalive_timeout)
            .build(https_connector))
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
