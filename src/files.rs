//! File inputs and outputs of a run
//!
//! - token file: one line, the raw token
//! - identifier lists: one URL per line; blank lines are skipped
//! - failure lists: identifiers of failed fetches, one per line
//! - CSV: one file per resource kind, header = table columns

use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::EndpointId;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Read the token file, trimming surrounding whitespace
pub fn read_token(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(
            format!("cannot read token file {}: {}", path.display(), e),
            "token_file",
        )
    })?;
    let token = content.trim();
    if token.is_empty() {
        return Err(Error::config(
            format!("token file {} is empty", path.display()),
            "token_file",
        ));
    }
    Ok(token.to_string())
}

/// Read an identifier list
///
/// Lines are trimmed and blank lines skipped. Every other line must be an
/// absolute URL.
pub fn read_endpoint_list(path: &Path) -> Result<Vec<EndpointId>> {
    let content = fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("cannot read identifier list {}: {}", path.display(), e),
        key: None,
    })?;

    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| {
            url::Url::parse(line)
                .map(|_| EndpointId::from(line))
                .map_err(|e| Error::InvalidEndpoint {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Write an identifier list, replacing any previous content
pub fn write_endpoint_list(path: &Path, endpoints: &[EndpointId]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    write_lines(&mut writer, endpoints)?;
    writer.flush()?;
    Ok(())
}

/// Create or empty a failure list
pub fn reset_failure_list(path: &Path) -> Result<()> {
    ensure_parent(path)?;
    File::create(path)?;
    Ok(())
}

/// Append identifiers to a failure list, creating it if needed
pub fn append_failures(path: &Path, failures: &[EndpointId]) -> Result<()> {
    ensure_parent(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    write_lines(&mut writer, failures)?;
    writer.flush()?;
    Ok(())
}

/// Write `table` as CSV
///
/// Absent cells and nulls are written as empty fields, strings verbatim, other
/// scalars as JSON text and nested arrays/objects as compact JSON.
///
/// # Errors
/// [`Error::EmptyTable`] if the table has no columns; check
/// [`Table::columns`] before calling.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    if table.columns().is_empty() {
        return Err(Error::EmptyTable(path.to_path_buf()));
    }
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(
            table
                .columns()
                .iter()
                .map(|column| render_cell(row.values.get(column))),
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_lines<W: Write>(writer: &mut W, endpoints: &[EndpointId]) -> std::io::Result<()> {
    for endpoint in endpoints {
        writeln!(writer, "{}", endpoint)?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
