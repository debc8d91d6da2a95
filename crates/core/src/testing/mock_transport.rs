//! Mock catalog transport for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::catalog::{BlockingTransport, CatalogError, CatalogRequest, Transport, TransportResponse};

/// A recorded request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: CatalogRequest,
    /// When the request reached the transport.
    pub at: Instant,
}

/// Mock implementation of both transport traits.
///
/// Provides controllable behavior for testing:
/// - Scripted one-shot responses or errors, consumed in order
/// - Standing responses per path prefix
/// - Recorded requests and call counts
/// - Optional latency for the async path
///
/// Anything unscripted gets a 404.
///
/// # Example
///
/// ```rust,ignore
/// use metaresolve_core::testing::{fixtures, MockTransport};
///
/// let transport = MockTransport::new();
/// transport.push_response(TransportResponse::status(503));
/// transport.respond("/search", TransportResponse::ok(fixtures::search_body(&[])));
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Standing responses by path prefix; the latest match wins.
    routes: Mutex<Vec<(String, TransportResponse)>>,
    /// One-shot outcomes, served before any route.
    scripted: Mutex<VecDeque<Result<TransportResponse, CatalogError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for every request whose path starts with `prefix`.
    pub fn respond(&self, prefix: &str, response: TransportResponse) {
        self.routes.lock().push((prefix.to_string(), response));
    }

    /// Serve `response` to the next request, whatever its path.
    pub fn push_response(&self, response: TransportResponse) {
        self.scripted.lock().push_back(Ok(response));
    }

    /// Fail the next request with `error`.
    pub fn push_error(&self, error: CatalogError) {
        self.scripted.lock().push_back(Err(error));
    }

    /// Delay every async response.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn requests(&self) -> Vec<CatalogRequest> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.request.clone())
            .collect()
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn handle(&self, request: &CatalogRequest) -> Result<TransportResponse, CatalogError> {
        self.requests.lock().push(RecordedRequest {
            request: request.clone(),
            at: Instant::now(),
        });

        if let Some(outcome) = self.scripted.lock().pop_front() {
            return outcome;
        }

        let routes = self.routes.lock();
        let matched = routes
            .iter()
            .rev()
            .find(|(prefix, _)| request.path.starts_with(prefix.as_str()));
        Ok(match matched {
            Some((_, response)) => response.clone(),
            None => TransportResponse {
                status: 404,
                retry_after: None,
                body: r#"{"status_code":34,"status_message":"The resource you requested could not be found."}"#
                    .to_string(),
            },
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: &CatalogRequest) -> Result<TransportResponse, CatalogError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.handle(request)
    }
}

impl BlockingTransport for MockTransport {
    fn get(&self, request: &CatalogRequest) -> Result<TransportResponse, CatalogError> {
        self.handle(request)
    }
}
