//! Feed client: one document operation per call, spread over many transports

use std::sync::Arc;

use crate::balancer::LoadBalancer;
use crate::compression::Compressor;
use crate::config::ClientOptions;
use crate::document::Document;
use crate::error::Result;
use crate::request::UrlBuilder;
use crate::response::FeedResult;
use crate::transport::Transport;

/// Client for the `/document/v1/` API
///
/// Cloning is cheap and clones share transports, inflight counters and the
/// encoder pool, so a single client can be used from many tasks at once.
///
/// # Example
///
/// ```ignore
/// use docfeed_http::{ClientOptions, Document, FeedClient, HttpTransport, HttpTransportConfig, Id};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transports = HttpTransport::pool(&HttpTransportConfig::default(), 4)?;
///     let client = FeedClient::new(ClientOptions::new("http://localhost:8080"), transports)?;
///
///     let doc = Document::put(Id::new("music", "album", "a-1"), r#"{"fields":{"title":"Kind of Blue"}}"#);
///     let result = client.send(doc).await;
///     println!("{}: {} ({} ms)", result.id, result.status, result.stats.total_latency.as_millis());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct FeedClient {
    inner: Arc<FeedClientInner>,
}

struct FeedClientInner {
    options: ClientOptions,
    urls: UrlBuilder,
    compressor: Compressor,
    balancer: LoadBalancer,
}

impl FeedClient {
    /// Create a client over one or more transports.
    ///
    /// Fails when the base URL does not parse or no transport is given.
    pub fn new(options: ClientOptions, transports: Vec<Arc<dyn Transport>>) -> Result<Self> {
        let balancer = LoadBalancer::new(transports)?;
        let urls = UrlBuilder::new(&options)?;
        let compressor = Compressor::new(options.compression);
        tracing::debug!(
            base_url = %urls.base_url(),
            transports = balancer.len(),
            compression = %options.compression,
            "Created feed client"
        );
        Ok(Self {
            inner: Arc::new(FeedClientInner {
                options,
                urls,
                compressor,
                balancer,
            }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Current inflight count of every transport, in pool order
    pub fn inflight(&self) -> Vec<i64> {
        self.inner.balancer.inflight()
    }

    /// Send one document operation.
    ///
    /// Never fails: build errors, transport errors and error responses are
    /// all reported in the returned [`FeedResult`]. Nothing is retried.
    pub async fn send(&self, document: Document) -> FeedResult {
        let inner = &*self.inner;
        let now = &inner.options.now;
        let start = now();

        let (method, url) = inner.urls.feed_url(&document);
        let request = match inner.compressor.build_request(method, url, &document.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    doc_id = %document.id,
                    error = %e.sanitized_message(),
                    "Failed to build feed request"
                );
                return FeedResult::failed(document.id, e);
            }
        };

        let lease = inner.balancer.acquire();
        let transport = lease.index();
        tracing::debug!(
            doc_id = %document.id,
            method = %request.method,
            url = %request.url,
            transport,
            gzip = request.is_gzipped(),
            "Sending document"
        );

        let response = match lease.call(request, inner.options.client_timeout()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    doc_id = %document.id,
                    transport,
                    error = %e.sanitized_message(),
                    "Feed request failed"
                );
                return FeedResult::failed(document.id, e);
            }
        };

        let elapsed = now().saturating_duration_since(start);
        let result =
            FeedResult::from_response(document.id, response, document.body.len(), elapsed).await;
        tracing::debug!(
            doc_id = %result.id,
            status = %result.status,
            http_status = result.http_status,
            latency_ms = elapsed.as_millis() as u64,
            "Document operation completed"
        );
        result
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_url", &self.inner.urls.base_url().as_str())
            .field("options", &self.inner.options)
            .field("balancer", &self.inner.balancer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::compression::Compressor;
    use crate::config::{Compression, HttpTransportConfig};
    use crate::document::Id;
    use crate::error::FeedError;
    use crate::request::FeedRequest;
    use crate::response::Status;
    use crate::transport::{HttpTransport, TransportResponse};

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn call(&self, _request: FeedRequest, _deadline: Duration) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::buffered(200, "{}"))
        }
    }

    #[test]
    fn test_client_creation() {
        let transports = HttpTransport::pool(&HttpTransportConfig::default(), 2).unwrap();
        let client = FeedClient::new(ClientOptions::new("http://localhost:8080"), transports).unwrap();
        assert_eq!(client.options().base_url, "http://localhost:8080");
        assert_eq!(client.inflight(), vec![0, 0]);
    }

    #[test]
    fn test_client_requires_transport() {
        let err = FeedClient::new(ClientOptions::new("http://localhost:8080"), Vec::new()).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let transports = HttpTransport::pool(&HttpTransportConfig::default(), 1).unwrap();
        let err = FeedClient::new(ClientOptions::new("::not a url::"), transports).unwrap_err();
        assert!(matches!(err, FeedError::UrlParse(_)));
    }

    #[tokio::test]
    async fn test_build_failure_skips_transport() {
        let transport = Arc::new(CountingTransport::default());
        let mut client = FeedClient::new(
            ClientOptions::new("http://h").compression(Compression::Gzip),
            vec![transport.clone() as Arc<dyn Transport>],
        )
        .unwrap();
        Arc::get_mut(&mut client.inner).unwrap().compressor = Compressor::failing(Compression::Gzip);

        let result = client
            .send(Document::put(Id::new("ns", "t", "d"), r#"{"fields":{}}"#))
            .await;

        assert_eq!(result.status, Status::TransportFailure);
        assert!(matches!(result.err, Some(FeedError::Build(_))));
        assert_eq!(result.http_status, 0);
        assert_eq!(result.stats.requests, 1);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.responses, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.inflight(), vec![0]);
    }
}
