//! Success/failure split of a fetched batch.

use crate::fetcher::ResourceBatch;
use crate::types::{Body, FailureList};

/// A batch split into usable bodies and failed identifiers
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partitioned {
    /// Bodies of successful results, in request order
    pub successes: Vec<Body>,
    /// Identifiers of every other result, in request order
    pub failures: FailureList,
}

impl Partitioned {
    /// Total number of results that went in
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// True if the batch was empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `batch` into successes and failures
///
/// A result is a success iff its status is exactly 200 and its body decoded.
/// A decodable error payload (e.g. a 403 with a JSON message) is a failure.
pub fn partition(batch: ResourceBatch) -> Partitioned {
    let mut partitioned = Partitioned::default();
    for result in batch {
        match result.body {
            Ok(body) if result.status.is_ok() => partitioned.successes.push(body),
            _ => partitioned.failures.push(result.endpoint),
        }
    }
    partitioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecodeFailure, EndpointId, FetchResult, ResourceKind, ResponseStatus};
    use serde_json::json;
    use std::time::Duration;

    fn result(url: &str, code: u16, body: Result<Body, DecodeFailure>) -> FetchResult {
        FetchResult {
            endpoint: EndpointId::from(url),
            status: ResponseStatus::Http { code },
            body,
            elapsed: Duration::ZERO,
        }
    }

    fn record(value: serde_json::Value) -> Result<Body, DecodeFailure> {
        Body::from_value(value)
    }

    #[test]
    fn test_partition_rule() {
        let batch = ResourceBatch::new(
            ResourceKind::Projects,
            vec![
                result("https://h/ok", 200, record(json!({"id": 1}))),
                result("https://h/forbidden", 403, record(json!({"message": "no"}))),
                result("https://h/undecodable", 200, Err(DecodeFailure::Empty)),
                result("https://h/ok-list", 200, record(json!([{"id": 2}, {"id": 3}]))),
                result("https://h/created", 201, record(json!({"id": 4}))),
                FetchResult::transport_failure(
                    EndpointId::from("https://h/down"),
                    ResponseStatus::Transport {
                        timeout: true,
                        connect: false,
                        message: "timed out".into(),
                    },
                    Duration::ZERO,
                ),
            ],
            Duration::ZERO,
        );
        let total = batch.len();

        let partitioned = partition(batch);

        assert_eq!(partitioned.successes.len(), 2);
        assert_eq!(partitioned.successes[0].row_count(), 1);
        assert_eq!(partitioned.successes[1].row_count(), 2);
        assert_eq!(
            partitioned.failures,
            vec![
                EndpointId::from("https://h/forbidden"),
                EndpointId::from("https://h/undecodable"),
                EndpointId::from("https://h/created"),
                EndpointId::from("https://h/down"),
            ]
        );
        assert_eq!(partitioned.len(), total);
    }

    #[test]
    fn test_partition_empty_batch() {
        let batch = ResourceBatch::new(ResourceKind::Stats, vec![], Duration::ZERO);
        let partitioned = partition(batch);
        assert!(partitioned.is_empty());
    }
}
