//! Progress reporting for a harvest run.
//!
//! The harvester and fetcher only publish [`Event`]s; this module turns them
//! into log lines from a single task, so concurrent requests never share an
//! output stream or a counter of their own.

use crate::types::{EndpointId, Event, ResourceSummary, RunSummary};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

const RULE_WIDTH: usize = 80;

/// Status line for one completed request: `[002/010]: .../path  true`
pub fn fetched_line(
    completed: usize,
    total: usize,
    endpoint: &EndpointId,
    api_base: &str,
    success: bool,
) -> String {
    let count = format!("[{:03}/{:03}]:", completed, total);
    format!(
        "{:^10}{:^60}{:^10}",
        count,
        endpoint.abbreviate(api_base),
        success
    )
}

/// Summary line for one resource kind
pub fn resource_line(summary: &ResourceSummary) -> String {
    format!(
        "{}: {}/{} succeeded, {} rows x {} columns, elapsed {:.2}s",
        summary.kind,
        summary.succeeded,
        summary.attempted,
        summary.rows,
        summary.columns,
        summary.elapsed.as_secs_f64()
    )
}

/// Summary line for the whole run
pub fn run_line(summary: &RunSummary) -> String {
    format!(
        "run finished: {}/{} requests succeeded across {} resource kinds, elapsed {:.2}s",
        summary.succeeded(),
        summary.attempted(),
        summary.resources.len(),
        summary.elapsed.as_secs_f64()
    )
}

/// Spawn a task that logs every event of a run
///
/// The task ends after [`Event::RunFinished`] or when the channel closes. If it
/// falls behind the channel capacity, the skipped status lines are lost and a
/// single warning with the count is logged instead; the run itself is not
/// affected.
pub fn spawn_progress_logger(
    mut rx: broadcast::Receiver<Event>,
    api_base: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let rule = "-".repeat(RULE_WIDTH);
        loop {
            match rx.recv().await {
                Ok(Event::RunStarted { resources }) => {
                    let names: Vec<&str> = resources.iter().map(|r| r.as_str()).collect();
                    info!("harvesting {}", names.join(" -> "));
                }
                Ok(Event::ResourceStarted { kind, total }) => {
                    info!("{}", rule);
                    info!("{:^80}", kind.as_str().to_uppercase());
                    info!("{}", rule);
                    let header = format!("REQUEST ({}...)", api_base);
                    info!("{:^10}{:^60}{:^10}", "#", header, "SUCCESS");
                    info!(kind = %kind, total, "{}", rule);
                }
                Ok(Event::Fetched {
                    completed,
                    total,
                    endpoint,
                    success,
                    ..
                }) => {
                    let line = fetched_line(completed, total, &endpoint, &api_base, success);
                    info!("{}", line);
                }
                Ok(Event::FileWritten { kind, what, path }) => {
                    info!(kind = %kind, "saved {} to '{}'", what, path.display());
                }
                Ok(Event::ResourceFinished(summary)) => {
                    info!("{}", rule);
                    info!("{}", resource_line(&summary));
                }
                Ok(Event::RunFinished(summary)) => {
                    info!("{}", rule);
                    info!("{}", run_line(&summary));
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress reporter fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use std::time::Duration;

    fn summary(kind: ResourceKind, attempted: usize, succeeded: usize) -> ResourceSummary {
        ResourceSummary {
            kind,
            attempted,
            succeeded,
            failed: attempted - succeeded,
            rows: succeeded * 2,
            columns: 3,
            elapsed: Duration::from_millis(1500),
            csv_path: None,
            derived: vec![],
        }
    }

    #[test]
    fn test_fetched_line_layout() {
        let endpoint = EndpointId::from("https://api.test/experiment/v1/projects/1");
        let line = fetched_line(2, 10, &endpoint, "https://api.test/", true);

        assert_eq!(line.len(), 80);
        assert!(line.starts_with("[002/010]:"));
        assert!(line.contains(".../experiment/v1/projects/1"));
        assert_eq!(line.trim_end().rsplit(' ').next(), Some("true"));
    }

    #[test]
    fn test_summary_lines() {
        let line = resource_line(&summary(ResourceKind::Stats, 4, 3));
        assert_eq!(
            line,
            "stats: 3/4 succeeded, 6 rows x 3 columns, elapsed 1.50s"
        );

        let run = RunSummary {
            started_at: chrono::Utc::now(),
            elapsed: Duration::from_secs(2),
            resources: vec![
                summary(ResourceKind::Projects, 1, 1),
                summary(ResourceKind::Experiments, 3, 2),
            ],
        };
        assert_eq!(
            run_line(&run),
            "run finished: 3/4 requests succeeded across 2 resource kinds, elapsed 2.00s"
        );
    }

    #[tokio::test]
    async fn test_logger_stops_on_run_finished() {
        let (tx, rx) = broadcast::channel(16);
        let handle = spawn_progress_logger(rx, "https://api.test/".to_string());

        tx.send(Event::ResourceStarted {
            kind: ResourceKind::Projects,
            total: 1,
        })
        .unwrap();
        tx.send(Event::RunFinished(RunSummary {
            started_at: chrono::Utc::now(),
            elapsed: Duration::ZERO,
            resources: vec![],
        }))
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("logger did not stop")
            .unwrap();
        // Sender still alive: the task ended because of RunFinished
        drop(tx);
    }

    #[tokio::test]
    async fn test_logger_survives_dropped_events() {
        let (tx, rx) = broadcast::channel(2);
        for completed in 1..=10 {
            tx.send(Event::Fetched {
                kind: ResourceKind::Stats,
                completed,
                total: 10,
                endpoint: EndpointId::from(format!("https://api.test/{}", completed)),
                status: crate::types::ResponseStatus::Http { code: 200 },
                success: true,
            })
            .unwrap();
        }
        tx.send(Event::RunFinished(RunSummary {
            started_at: chrono::Utc::now(),
            elapsed: Duration::ZERO,
            resources: vec![],
        }))
        .unwrap();

        // Most events were overwritten before the logger started
        let handle = spawn_progress_logger(rx, "https://api.test/".to_string());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("logger did not reach RunFinished")
            .unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_logger_stops_when_channel_closes() {
        let (tx, rx) = broadcast::channel::<Event>(16);
        let handle = spawn_progress_logger(rx, String::new());
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("logger did not stop")
            .unwrap();
    }
}
