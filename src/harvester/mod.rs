//! Run orchestration.
//!
//! A run walks the configured resource kinds in chain order. Each kind is a
//! hard barrier: its identifiers are fetched, partitioned and flattened, its
//! CSV and failure list are written and the next kinds' identifier lists are
//! derived before the next kind starts.
//!
//! ```text
//! <url_dir>/<kind>.url ─▶ fetch_all ─▶ partition ─┬─▶ failures ─▶ failure list
//!                                                 └─▶ flatten ─▶ <output_dir>/<kind>.csv
//!                                                                 └─▶ derive ─▶ <url_dir>/<next>.url
//! ```

use crate::config::{Config, FailureFileMode};
use crate::derive::derive_endpoints;
use crate::error::Result;
use crate::fetcher::{BatchFetcher, dedup_preserving_order};
use crate::files;
use crate::partition::partition;
use crate::table::{Table, flatten};
use crate::transport::{HttpTransport, Transport};
use crate::types::{EndpointId, Event, FailureList, ResourceKind, ResourceSummary, RunSummary};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffer size for the run's event channel
///
/// The channel is lossy: a subscriber that falls more than this many events
/// behind misses the oldest ones and sees `RecvError::Lagged` instead. Outputs
/// and summaries never depend on events being delivered.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What one resource kind produced, before anything is written
#[derive(Clone, Debug)]
pub struct KindOutcome {
    /// Resource kind
    pub kind: ResourceKind,
    /// Distinct identifiers requested
    pub attempted: usize,
    /// Requests that returned a decodable 200 body
    pub succeeded: usize,
    /// Identifiers of every other request, in request order
    pub failures: FailureList,
    /// Flattened successful bodies
    pub table: Table,
    /// Time spent fetching
    pub elapsed: Duration,
}

/// Drives fetch → partition → flatten → derive over the resource chain
pub struct Harvester {
    config: Arc<Config>,
    fetcher: BatchFetcher,
    event_tx: broadcast::Sender<Event>,
}

impl Harvester {
    /// Create a harvester that talks HTTP, reading the token from `config.token_file`
    ///
    /// # Errors
    /// Returns a configuration error if the config is invalid or the token file
    /// is missing or empty.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let token = files::read_token(&config.token_file)?;
        let transport = HttpTransport::new(&config, &token)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a harvester over any [`Transport`]
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fetcher = BatchFetcher::new(transport, &config.fetch, event_tx.clone());

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            event_tx,
        })
    }

    /// Subscribe to run events
    ///
    /// Delivery is best effort; see [`EVENT_CHANNEL_CAPACITY`].
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch, partition and flatten one resource kind in memory
    pub async fn harvest(&self, kind: ResourceKind, endpoints: &[EndpointId]) -> KindOutcome {
        let batch = self.fetcher.fetch_all(kind, endpoints).await;
        let attempted = batch.len();
        let elapsed = batch.elapsed();

        let partitioned = partition(batch);
        let succeeded = partitioned.successes.len();
        let table = flatten(partitioned.successes);

        debug!(
            kind = %kind,
            attempted,
            succeeded,
            rows = table.len(),
            "resource harvested"
        );

        KindOutcome {
            kind,
            attempted,
            succeeded,
            failures: partitioned.failures,
            table,
            elapsed,
        }
    }

    /// Run every configured resource kind in chain order
    ///
    /// # Errors
    /// Stops at the first configuration error (missing identifier list), data
    /// error (a relation's id column is missing) or I/O error. Failed requests
    /// are not errors; they end up in the failure list.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();

        self.emit(Event::RunStarted {
            resources: self.config.resources.clone(),
        });

        // A run that starts later in the chain appends to the previous run's list
        if self.config.failures == FailureFileMode::Shared
            && self.config.resources.first() == Some(&ResourceKind::Projects)
        {
            files::reset_failure_list(&self.config.failure_file(ResourceKind::Projects))?;
        }

        let mut resources = Vec::with_capacity(self.config.resources.len());
        for kind in self.config.resources.iter().copied() {
            resources.push(self.run_kind(kind).await?);
        }

        let summary = RunSummary {
            started_at,
            elapsed: started.elapsed(),
            resources,
        };
        self.emit(Event::RunFinished(summary.clone()));
        Ok(summary)
    }

    /// Harvest one kind from its identifier list and write its outputs
    pub async fn run_kind(&self, kind: ResourceKind) -> Result<ResourceSummary> {
        let config = &self.config;
        let endpoints = files::read_endpoint_list(&config.url_file(kind))?;

        let failure_file = config.failure_file(kind);
        if config.failures == FailureFileMode::PerResource {
            files::reset_failure_list(&failure_file)?;
        }

        self.emit(Event::ResourceStarted {
            kind,
            total: dedup_preserving_order(&endpoints).len(),
        });

        let outcome = self.harvest(kind, &endpoints).await;

        files::append_failures(&failure_file, &outcome.failures)?;
        if !outcome.failures.is_empty() {
            let failed = outcome.failures.len();
            warn!(kind = %kind, failed, "some requests failed");
            self.file_written(kind, format!("{} failed identifiers", failed), &failure_file);
        }

        let csv_path = if outcome.table.columns().is_empty() {
            warn!(kind = %kind, "no data returned; CSV not written");
            None
        } else {
            let path = config.csv_file(kind);
            files::write_csv(&path, &outcome.table)?;
            self.file_written(kind, format!("'{}' table", kind), &path);
            Some(path)
        };

        let mut derived = Vec::with_capacity(kind.relations().len());
        for relation in kind.relations() {
            let endpoints = derive_endpoints(&outcome.table, *relation, &config.api_base)?;
            let path = config.url_file(relation.target());
            files::write_endpoint_list(&path, &endpoints)?;
            let what = format!("{} '{}' identifiers", endpoints.len(), relation);
            self.file_written(kind, what, &path);
            derived.push((*relation, endpoints.len()));
        }

        let summary = ResourceSummary {
            kind,
            attempted: outcome.attempted,
            succeeded: outcome.succeeded,
            failed: outcome.failures.len(),
            rows: outcome.table.len(),
            columns: outcome.table.columns().len(),
            elapsed: outcome.elapsed,
            csv_path,
            derived,
        };
        self.emit(Event::ResourceFinished(summary.clone()));
        Ok(summary)
    }

    fn file_written(&self, kind: ResourceKind, what: String, path: &Path) {
        self.emit(Event::FileWritten {
            kind,
            what,
            path: path.to_path_buf(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
