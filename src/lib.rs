//! # api-harvest
//!
//! Batch harvester for a chain of related REST resources.
//!
//! Starting from a list of endpoint URLs for the first resource kind, each kind
//! is fetched in one concurrent batch, its successful JSON bodies are flattened
//! into a table and written as CSV, and the identifier columns of that table are
//! turned into the endpoint lists of the next kinds:
//!
//! ```text
//! projects ─▶ experiments ─┬─▶ stats
//!                          └─▶ variations
//! ```
//!
//! Failed requests never abort a run; their identifiers are collected in a
//! failure list so they can be retried later.
//!
//! ## Quick Start
//!
//! ```no_run
//! use api_harvest::{Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let harvester = Harvester::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = harvester.run().await?;
//!     println!("{}/{} requests succeeded", summary.succeeded(), summary.attempted());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Relation table and endpoint derivation
pub mod derive;
/// Error types
pub mod error;
/// Concurrent batch fetching
pub mod fetcher;
/// Identifier lists, failure lists, token and CSV files
pub mod files;
/// Run orchestration over the resource chain
pub mod harvester;
/// Success/failure partition of a batch
pub mod partition;
/// Progress and summary logging
pub mod progress;
/// Tabular flattening of response bodies
pub mod table;
/// HTTP transport
pub mod transport;
/// Core types and events
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::{Config, FailureFileMode, FetchConfig, FetchMode};
pub use derive::{Extraction, Relation, UrlTemplate, derive_endpoints};
pub use error::{Error, Result};
pub use fetcher::{BatchFetcher, ResourceBatch};
pub use harvester::{Harvester, KindOutcome};
pub use partition::{Partitioned, partition};
pub use table::{Row, Table, flatten};
pub use transport::{HttpTransport, Transport};
pub use types::{
    Body, DecodeFailure, EndpointId, Event, FailureList, FetchResult, Record, ResourceKind,
    ResourceSummary, ResponseStatus, RunSummary,
};

/// Run the harvester until it finishes or a termination signal arrives.
///
/// On SIGTERM/SIGINT (Ctrl+C elsewhere) the in-flight batch is dropped and
/// [`Error::Interrupted`] is returned. Files already written by finished
/// resource kinds stay in place.
///
/// # Example
///
/// ```no_run
/// use api_harvest::{Config, Harvester, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let harvester = Harvester::new(Config::default())?;
///     let summary = run_with_shutdown(&harvester).await?;
///     println!("{} kinds harvested", summary.resources.len());
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: &Harvester) -> Result<RunSummary> {
    tokio::select! {
        result = harvester.run() => result,
        _ = wait_for_signal() => Err(Error::Interrupted),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // Never report an interruption that did not happen
            std::future::pending::<()>().await;
        }
    }
}
