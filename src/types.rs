//! Core types for api-harvest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::derive::Relation;
use crate::error::Error;

/// A fully qualified request target for one resource instance
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Create a new EndpointId
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the URL as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in progress lines: `.../<path below base>`
    ///
    /// Identifiers that do not start with `base` are returned unchanged.
    pub fn abbreviate(&self, base: &str) -> String {
        match self.0.strip_prefix(base) {
            Some(rest) if !base.is_empty() => format!(".../{}", rest.trim_start_matches('/')),
            _ => self.0.clone(),
        }
    }
}

impl From<String> for EndpointId {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl From<&str> for EndpointId {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl AsRef<str> for EndpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers whose fetch did not yield a decodable 200 body, in batch order
pub type FailureList = Vec<EndpointId>;

/// A JSON record: one row of a [`Table`](crate::table::Table)
pub type Record = Map<String, Value>;

/// A decoded response body
///
/// The decode step classifies bodies up front so the flattener can dispatch on
/// the variant instead of probing the JSON shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// A bare JSON object
    Record(Record),
    /// A JSON array of objects (possibly empty)
    RecordList(Vec<Record>),
}

impl Body {
    /// Classify a parsed JSON value
    ///
    /// Objects become [`Body::Record`], arrays whose elements are all objects
    /// become [`Body::RecordList`]. Anything else cannot be laid out as rows.
    pub fn from_value(value: Value) -> std::result::Result<Self, DecodeFailure> {
        match value {
            Value::Object(record) => Ok(Body::Record(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(DecodeFailure::NotTabular(format!(
                        "array element {} is {}",
                        i,
                        json_kind(&other)
                    ))),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Body::RecordList),
            other => Err(DecodeFailure::NotTabular(format!(
                "top-level value is {}",
                json_kind(&other)
            ))),
        }
    }

    /// Number of rows this body contributes to a table
    pub fn row_count(&self) -> usize {
        match self {
            Body::Record(_) => 1,
            Body::RecordList(records) => records.len(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Why a response body could not be used
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DecodeFailure {
    /// The response had no body
    #[error("empty body")]
    Empty,
    /// The response declared a non-JSON content type
    #[error("unexpected content type: {0}")]
    ContentType(String),
    /// The body is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(String),
    /// Valid JSON that is neither an object nor an array of objects
    #[error("not tabular: {0}")]
    NotTabular(String),
    /// The body could not be read off the connection
    #[error("body read failed: {0}")]
    Read(String),
    /// No response was received
    #[error("no response")]
    NoResponse,
}

/// Outcome of the request itself, before looking at the body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The server answered with this HTTP status code
    Http {
        /// Status code
        code: u16,
    },
    /// The request never produced a response (connection refused, timeout, ...)
    Transport {
        /// The request hit the client timeout
        timeout: bool,
        /// The connection could not be established
        connect: bool,
        /// Error message from the HTTP client
        message: String,
    },
}

impl ResponseStatus {
    /// The HTTP status code, if a response was received
    pub fn code(&self) -> Option<u16> {
        match self {
            ResponseStatus::Http { code } => Some(*code),
            ResponseStatus::Transport { .. } => None,
        }
    }

    /// True only for exactly HTTP 200
    pub fn is_ok(&self) -> bool {
        self.code() == Some(200)
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseStatus::Http { code } => write!(f, "{}", code),
            ResponseStatus::Transport { timeout: true, .. } => f.write_str("timeout"),
            ResponseStatus::Transport { connect: true, .. } => f.write_str("connect error"),
            ResponseStatus::Transport { .. } => f.write_str("transport error"),
        }
    }
}

/// The result of one fetch attempt for one identifier
#[derive(Clone, Debug, PartialEq)]
pub struct FetchResult {
    /// The requested identifier
    pub endpoint: EndpointId,
    /// HTTP status or transport failure
    pub status: ResponseStatus,
    /// Decoded body, or why decoding failed
    pub body: std::result::Result<Body, DecodeFailure>,
    /// Wall-clock time spent on the request
    pub elapsed: Duration,
}

impl FetchResult {
    /// Result for a request that never got a response
    pub fn transport_failure(
        endpoint: EndpointId,
        status: ResponseStatus,
        elapsed: Duration,
    ) -> Self {
        Self {
            endpoint,
            status,
            body: Err(DecodeFailure::NoResponse),
            elapsed,
        }
    }

    /// Success iff the status is exactly 200 and the body decoded
    pub fn is_success(&self) -> bool {
        self.status.is_ok() && self.body.is_ok()
    }
}

/// One harvested category in the fixed traversal order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top-level collection
    Projects,
    /// Experiments of each project
    Experiments,
    /// Results of each experiment
    Stats,
    /// Variations referenced by each experiment
    Variations,
}

impl ResourceKind {
    /// All kinds in chain order
    pub const CHAIN: [ResourceKind; 4] = [
        ResourceKind::Projects,
        ResourceKind::Experiments,
        ResourceKind::Stats,
        ResourceKind::Variations,
    ];

    /// Name used for list, CSV and failure file stems
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Projects => "projects",
            ResourceKind::Experiments => "experiments",
            ResourceKind::Stats => "stats",
            ResourceKind::Variations => "variations",
        }
    }

    /// Relations whose endpoints are derived from this kind's table
    pub fn relations(&self) -> &'static [Relation] {
        match self {
            ResourceKind::Projects => &[Relation::Experiments],
            ResourceKind::Experiments => &[Relation::Stats, Relation::Variations],
            ResourceKind::Stats | ResourceKind::Variations => &[],
        }
    }

    /// Position in [`ResourceKind::CHAIN`]
    pub fn position(&self) -> usize {
        match self {
            ResourceKind::Projects => 0,
            ResourceKind::Experiments => 1,
            ResourceKind::Stats => 2,
            ResourceKind::Variations => 3,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::CHAIN
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownResource(s.to_string()))
    }
}

/// Per-kind outcome reported at the end of each stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    /// Resource kind
    pub kind: ResourceKind,
    /// Distinct identifiers requested
    pub attempted: usize,
    /// Requests that returned a decodable 200 body
    pub succeeded: usize,
    /// Requests that ended up on the failure list
    pub failed: usize,
    /// Rows in the flattened table
    pub rows: usize,
    /// Columns in the flattened table
    pub columns: usize,
    /// Time spent fetching
    pub elapsed: Duration,
    /// CSV written for this kind (None when the table was empty)
    pub csv_path: Option<PathBuf>,
    /// Endpoints derived for each relation of this kind
    pub derived: Vec<(Relation, usize)>,
}

/// Outcome of a whole run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Total wall-clock time
    pub elapsed: Duration,
    /// Per-kind summaries in chain order
    pub resources: Vec<ResourceSummary>,
}

impl RunSummary {
    /// Requests issued across all kinds
    pub fn attempted(&self) -> usize {
        self.resources.iter().map(|r| r.attempted).sum()
    }

    /// Successful requests across all kinds
    pub fn succeeded(&self) -> usize {
        self.resources.iter().map(|r| r.succeeded).sum()
    }
}

/// Event emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run started
    RunStarted {
        /// Kinds that will be harvested, in order
        resources: Vec<ResourceKind>,
    },

    /// A resource kind is about to be fetched
    ResourceStarted {
        /// Resource kind
        kind: ResourceKind,
        /// Distinct identifiers in the batch
        total: usize,
    },

    /// One request completed
    Fetched {
        /// Resource kind
        kind: ResourceKind,
        /// Requests completed so far in this batch (1-based)
        completed: usize,
        /// Batch size
        total: usize,
        /// Identifier that completed
        endpoint: EndpointId,
        /// Status of the request
        status: ResponseStatus,
        /// Whether it counts as a success
        success: bool,
    },

    /// A file was written
    FileWritten {
        /// Resource kind the file belongs to
        kind: ResourceKind,
        /// What was written
        what: String,
        /// Where it was written
        path: PathBuf,
    },

    /// A resource kind finished
    ResourceFinished(ResourceSummary),

    /// Run finished
    RunFinished(RunSummary),
}
