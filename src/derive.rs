//! Derivation of the next resource kind's endpoints from a flattened table
//!
//! Each [`Relation`] knows its URL template (one `{}` slot, relative to the API
//! base) and how to read ids out of a table:
//!
//! | relation      | template                                  | ids from                    |
//! |---------------|-------------------------------------------|-----------------------------|
//! | `experiments` | `experiment/v1/projects/{}/experiments/`  | `id`, one per row           |
//! | `stats`       | `experiment/v1/experiments/{}/stats`      | `id`, one per row           |
//! | `variations`  | `experiment/v1/variations/{}`             | `variation_ids`, flattened  |

use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::{EndpointId, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Placeholder substituted by [`UrlTemplate::expand`]
const SLOT: &str = "{}";

/// A child collection reachable from a parent resource's table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Experiments of each project
    Experiments,
    /// Stats of each experiment
    Stats,
    /// Variations referenced by each experiment
    Variations,
}

/// How ids are read from a table column
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// One id per row, read directly from the column
    Scalar {
        /// Source column
        column: &'static str,
    },
    /// Each row holds an array of ids; all elements are used in row order
    ListFlatten {
        /// Source column
        column: &'static str,
    },
}

impl Extraction {
    /// The column ids are read from
    pub fn column(&self) -> &'static str {
        match self {
            Extraction::Scalar { column } | Extraction::ListFlatten { column } => *column,
        }
    }
}

impl Relation {
    /// All relations
    pub const ALL: [Relation; 3] = [Relation::Experiments, Relation::Stats, Relation::Variations];

    /// Relation name
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Experiments => "experiments",
            Relation::Stats => "stats",
            Relation::Variations => "variations",
        }
    }

    /// URL path template relative to the API base
    pub fn template(&self) -> &'static str {
        match self {
            Relation::Experiments => "experiment/v1/projects/{}/experiments/",
            Relation::Stats => "experiment/v1/experiments/{}/stats",
            Relation::Variations => "experiment/v1/variations/{}",
        }
    }

    /// Where the ids come from
    pub fn extraction(&self) -> Extraction {
        match self {
            Relation::Experiments | Relation::Stats => Extraction::Scalar { column: "id" },
            Relation::Variations => Extraction::ListFlatten {
                column: "variation_ids",
            },
        }
    }

    /// The resource kind whose identifier list this relation produces
    pub fn target(&self) -> ResourceKind {
        match self {
            Relation::Experiments => ResourceKind::Experiments,
            Relation::Stats => ResourceKind::Stats,
            Relation::Variations => ResourceKind::Variations,
        }
    }

    /// The full URL template under `api_base`
    pub fn url_template(&self, api_base: &str) -> Result<UrlTemplate> {
        UrlTemplate::new(&join_url(api_base, self.template()))
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::UnknownRelation(s.to_string()))
    }
}

/// A URL with exactly one `{}` substitution slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlTemplate {
    prefix: String,
    suffix: String,
}

impl UrlTemplate {
    /// Parse a template; it must contain exactly one `{}`
    pub fn new(template: &str) -> Result<Self> {
        let mut parts = template.split(SLOT);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(suffix), None) => Ok(Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(Error::Config {
                message: format!(
                    "URL template '{}' must contain exactly one '{}' slot",
                    template, SLOT
                ),
                key: None,
            }),
        }
    }

    /// Substitute `id` into the slot
    pub fn expand(&self, id: &str) -> EndpointId {
        EndpointId::new(format!("{}{}{}", self.prefix, id, self.suffix))
    }
}

/// Join a base URL and a relative path with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Endpoints of `relation` for every id found in `table`
///
/// Fails with [`Error::MissingColumn`] when the table has no column the relation
/// reads from. A table without rows has no columns at all and yields no
/// endpoints.
pub fn derive_endpoints(
    table: &Table,
    relation: Relation,
    api_base: &str,
) -> Result<Vec<EndpointId>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let template = relation.url_template(api_base)?;
    derive_with(table, &template, relation.extraction(), relation.as_str())
}

/// Same as [`derive_endpoints`], looking the relation up by name
pub fn derive_endpoints_named(
    table: &Table,
    relation: &str,
    api_base: &str,
) -> Result<Vec<EndpointId>> {
    derive_endpoints(table, relation.parse()?, api_base)
}

/// Apply an explicit template and extraction mode to `table`
///
/// Rows whose cell is absent or null produce no endpoint; in list mode the same
/// holds for null array elements. Ids are taken from strings verbatim and from
/// integers in decimal. Any other value is an [`Error::InvalidId`].
pub fn derive_with(
    table: &Table,
    template: &UrlTemplate,
    extraction: Extraction,
    relation: &str,
) -> Result<Vec<EndpointId>> {
    let column = extraction.column();
    let cells = table.column(column).ok_or_else(|| Error::MissingColumn {
        relation: relation.to_string(),
        column: column.to_string(),
    })?;

    let mut endpoints = Vec::with_capacity(cells.len());
    let mut skipped = 0usize;

    for (row, cell) in cells.into_iter().enumerate() {
        let value = match cell {
            None | Some(Value::Null) => {
                skipped += 1;
                continue;
            }
            Some(value) => value,
        };

        match extraction {
            Extraction::Scalar { .. } => {
                endpoints.push(template.expand(&render_id(value, column, row)?));
            }
            Extraction::ListFlatten { .. } => {
                let items = value.as_array().ok_or_else(|| invalid_id(value, column, row))?;
                for item in items.iter().filter(|v| !v.is_null()) {
                    endpoints.push(template.expand(&render_id(item, column, row)?));
                }
            }
        }
    }

    if skipped > 0 {
        warn!(relation, column, skipped, "rows without an id were skipped");
    }

    Ok(endpoints)
}

fn render_id(value: &Value, column: &str, row: usize) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(invalid_id(other, column, row)),
    }
}

fn invalid_id(value: &Value, column: &str, row: usize) -> Error {
    Error::InvalidId {
        column: column.to_string(),
        row,
        value: value.to_string(),
    }
}
