//! Batch fetching of one resource kind.
//!
//! [`BatchFetcher::fetch_all`] issues one [`Transport`] call per distinct
//! identifier and returns only when every call has completed. In
//! [`FetchMode::Concurrent`] all calls are in flight together (or up to
//! `max_concurrent` of them); in [`FetchMode::Sequential`] they run one at a
//! time in input order. Both modes produce the same [`ResourceBatch`].
//!
//! Progress is published as [`Event::Fetched`] on the run's broadcast channel.
//! The completion count comes from an atomic counter shared by the in-flight
//! requests; rendering is left to whoever subscribes.

use crate::config::{FetchConfig, FetchMode};
use crate::transport::Transport;
use crate::types::{EndpointId, Event, FetchResult, ResourceKind};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// All fetch results of one resource kind, one per distinct identifier, in the
/// order the identifiers were first requested
#[derive(Clone, Debug)]
pub struct ResourceBatch {
    kind: ResourceKind,
    results: Vec<FetchResult>,
    index: HashMap<EndpointId, usize>,
    elapsed: Duration,
}

impl ResourceBatch {
    /// Build a batch from results already in request order
    pub fn new(kind: ResourceKind, results: Vec<FetchResult>, elapsed: Duration) -> Self {
        let mut index = HashMap::with_capacity(results.len());
        for (position, result) in results.iter().enumerate() {
            index.entry(result.endpoint.clone()).or_insert(position);
        }
        Self {
            kind,
            results,
            index,
            elapsed,
        }
    }

    /// Resource kind the batch was fetched for
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Number of results (distinct identifiers requested)
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True if nothing was requested
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Wall-clock time from the first request to the last completion
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Result for `endpoint`, if it was part of the batch
    pub fn get(&self, endpoint: &EndpointId) -> Option<&FetchResult> {
        self.index.get(endpoint).map(|&position| &self.results[position])
    }

    /// Results in request order
    pub fn iter(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.iter()
    }

    /// Requested identifiers in request order
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointId> {
        self.results.iter().map(|r| &r.endpoint)
    }

    /// Number of results that count as successes
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Consume the batch, yielding the results in request order
    pub fn into_results(self) -> Vec<FetchResult> {
        self.results
    }
}

impl IntoIterator for ResourceBatch {
    type Item = FetchResult;
    type IntoIter = std::vec::IntoIter<FetchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Fans a list of identifiers out over a [`Transport`]
#[derive(Clone)]
pub struct BatchFetcher {
    transport: Arc<dyn Transport>,
    mode: FetchMode,
    max_concurrent: Option<usize>,
    event_tx: broadcast::Sender<Event>,
}

impl BatchFetcher {
    /// Create a fetcher publishing progress on `event_tx`
    pub fn new(
        transport: Arc<dyn Transport>,
        fetch: &FetchConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            mode: fetch.mode,
            max_concurrent: fetch.max_concurrent,
            event_tx,
        }
    }

    /// Fetch mode in use
    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Fetch every identifier once and wait for all of them
    ///
    /// Duplicate identifiers are requested once; the surviving entry keeps the
    /// position of the first occurrence. Transport failures are returned as
    /// results like any other outcome.
    pub async fn fetch_all(
        &self,
        kind: ResourceKind,
        endpoints: &[EndpointId],
    ) -> ResourceBatch {
        let unique = dedup_preserving_order(endpoints);
        if unique.len() < endpoints.len() {
            tracing::debug!(
                kind = %kind,
                duplicates = endpoints.len() - unique.len(),
                "collapsed duplicate identifiers"
            );
        }

        let started = Instant::now();
        let results = match self.mode {
            FetchMode::Concurrent => self.fetch_concurrent(kind, &unique).await,
            FetchMode::Sequential => self.fetch_sequential(kind, &unique).await,
        };

        ResourceBatch::new(kind, results, started.elapsed())
    }

    async fn fetch_concurrent(
        &self,
        kind: ResourceKind,
        endpoints: &[EndpointId],
    ) -> Vec<FetchResult> {
        let total = endpoints.len();
        let concurrency = self.max_concurrent.unwrap_or(total).max(1);
        let completed = Arc::new(AtomicUsize::new(0));

        let mut indexed: Vec<(usize, FetchResult)> = stream::iter(endpoints.iter().enumerate())
            .map(|(index, endpoint)| {
                let transport = Arc::clone(&self.transport);
                let completed = Arc::clone(&completed);

                async move {
                    let result = transport.fetch(endpoint).await;
                    self.report(kind, &completed, total, &result);
                    (index, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        // Completion order is arbitrary; restore request order
        indexed.sort_unstable_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    async fn fetch_sequential(
        &self,
        kind: ResourceKind,
        endpoints: &[EndpointId],
    ) -> Vec<FetchResult> {
        let total = endpoints.len();
        let completed = AtomicUsize::new(0);
        let mut results = Vec::with_capacity(total);

        for endpoint in endpoints {
            let result = self.transport.fetch(endpoint).await;
            self.report(kind, &completed, total, &result);
            results.push(result);
        }

        results
    }

    fn report(
        &self,
        kind: ResourceKind,
        completed: &AtomicUsize,
        total: usize,
        result: &FetchResult,
    ) {
        let completed = completed.fetch_add(1, Ordering::Relaxed) + 1;
        let success = result.is_success();

        if !success {
            tracing::debug!(
                kind = %kind,
                endpoint = %result.endpoint,
                status = %result.status,
                body = ?result.body.as_ref().err(),
                "fetch failed"
            );
        }

        self.event_tx
            .send(Event::Fetched {
                kind,
                completed,
                total,
                endpoint: result.endpoint.clone(),
                status: result.status.clone(),
                success,
            })
            .ok();
    }
}

/// Drop repeated identifiers, keeping the first occurrence of each
pub fn dedup_preserving_order(endpoints: &[EndpointId]) -> Vec<EndpointId> {
    let mut seen = HashSet::with_capacity(endpoints.len());
    endpoints
        .iter()
        .filter(|endpoint| seen.insert(endpoint.as_str()))
        .cloned()
        .collect()
}
