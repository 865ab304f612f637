//! Shared test fixtures: an in-memory [`Transport`] with scripted responses.

use crate::transport::Transport;
use crate::types::{Body, DecodeFailure, EndpointId, FetchResult, ResponseStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted response for one endpoint
#[derive(Clone)]
pub(crate) struct Scripted {
    pub status: ResponseStatus,
    pub body: Result<Body, DecodeFailure>,
    pub delay: Duration,
}

/// A transport that answers from a table and records how it was driven
#[derive(Default)]
pub(crate) struct MockTransport {
    responses: HashMap<String, Scripted>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 200 with a JSON body
    pub fn ok(self, url: &str, body: Value) -> Self {
        self.ok_after(url, body, Duration::ZERO)
    }

    /// 200 with a JSON body, answered after `delay`
    pub fn ok_after(self, url: &str, body: Value, delay: Duration) -> Self {
        self.respond(
            url,
            Scripted {
                status: ResponseStatus::Http { code: 200 },
                body: Body::from_value(body),
                delay,
            },
        )
    }

    /// Any status with an empty body
    pub fn status(self, url: &str, code: u16) -> Self {
        self.respond(
            url,
            Scripted {
                status: ResponseStatus::Http { code },
                body: Err(DecodeFailure::Empty),
                delay: Duration::ZERO,
            },
        )
    }

    /// Connection failure
    pub fn unreachable(self, url: &str) -> Self {
        self.respond(
            url,
            Scripted {
                status: ResponseStatus::Transport {
                    timeout: false,
                    connect: true,
                    message: "connection refused".into(),
                },
                body: Err(DecodeFailure::NoResponse),
                delay: Duration::ZERO,
            },
        )
    }

    pub fn respond(mut self, url: &str, scripted: Scripted) -> Self {
        self.responses.insert(url.to_string(), scripted);
        self
    }

    /// Highest number of concurrent calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// URLs in the order calls started
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, endpoint: &EndpointId) -> FetchResult {
        self.calls.lock().unwrap().push(endpoint.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let scripted = self
            .responses
            .get(endpoint.as_str())
            .cloned()
            .unwrap_or(Scripted {
                status: ResponseStatus::Http { code: 404 },
                body: Err(DecodeFailure::Empty),
                delay: Duration::ZERO,
            });

        // Always yield once so concurrent calls overlap
        if scripted.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(scripted.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        FetchResult {
            endpoint: endpoint.clone(),
            status: scripted.status,
            body: scripted.body,
            elapsed: scripted.delay,
        }
    }
}
