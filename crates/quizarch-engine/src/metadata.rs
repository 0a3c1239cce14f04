//! Attempts metadata CSV.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use quizarch_core::{WorkerError, WorkerResult};

use crate::job::ArchiveJob;

/// Name of the metadata CSV inside the work directory.
pub const METADATA_FILENAME: &str = "attempts_metadata.csv";

/// Fetch the attempt metadata rows and write `attempts_metadata.csv`.
///
/// Each row gains a `path` column holding the archive-relative artifact stem
/// of the rendered attempt. The column set is taken from the first row;
/// non-numeric fields are double-quoted.
pub(crate) async fn write_attempts_metadata(
    job: &ArchiveJob,
    workdir: &Path,
    archived_attempts: &BTreeMap<u64, PathBuf>,
) -> WorkerResult<()> {
    let mut rows = job
        .descriptor()
        .moodle_api()
        .get_attempts_metadata(job.id(), job.descriptor())
        .await?;

    if rows.is_empty() {
        return Err(WorkerError::protocol(
            "Attempt metadata response contained no rows",
        ));
    }

    for row in &mut rows {
        let attemptid = row
            .get("attemptid")
            .and_then(value_as_u64)
            .ok_or_else(|| WorkerError::protocol("Attempt metadata row without attemptid"))?;
        let stem = archived_attempts.get(&attemptid).ok_or_else(|| {
            WorkerError::protocol(format!(
                "Attempt metadata row references unarchived attempt {attemptid}"
            ))
        })?;
        let relative = stem
            .strip_prefix(workdir)
            .map_err(|_| WorkerError::validation("Artifact stem escaped the work directory"))?;
        row.insert(
            "path".to_string(),
            Value::String(relative.to_string_lossy().into_owned()),
        );
    }

    let csv = render_csv(&rows)?;
    tokio::fs::write(workdir.join(METADATA_FILENAME), csv).await?;
    tracing::info!(rows = rows.len(), "Wrote metadata for quiz attempts to CSV file");
    Ok(())
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render rows to CSV with the first row's keys as header.
fn render_csv(rows: &[serde_json::Map<String, Value>]) -> WorkerResult<Vec<u8>> {
    let header: Vec<&String> = rows[0].keys().collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_writer(Vec::new());

    writer
        .write_record(&header)
        .map_err(|e| WorkerError::render(format!("Failed to write CSV header: {e}")))?;

    for row in rows {
        let record: Vec<String> = header
            .iter()
            .map(|key| row.get(*key).map(value_as_field).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| WorkerError::render(format!("Failed to write CSV row: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| WorkerError::render(format!("Failed to flush CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn csv_quotes_non_numeric_fields_only() {
        let rows = vec![row(&[
            ("attemptid", Value::from(12)),
            ("username", Value::from("john doe")),
        ])];
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "\"attemptid\",\"username\"");
        assert_eq!(lines.next().unwrap(), "12,\"john doe\"");
    }

    #[test]
    fn csv_uses_first_row_columns() {
        let rows = vec![
            row(&[("attemptid", Value::from(1)), ("state", Value::from("finished"))]),
            row(&[
                ("attemptid", Value::from(2)),
                ("state", Value::from("finished")),
                ("extra", Value::from("ignored")),
            ]),
        ];
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv.lines().next().unwrap(), "\"attemptid\",\"state\"");
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn null_values_render_as_empty_fields() {
        let rows = vec![row(&[
            ("attemptid", Value::from(1)),
            ("timefinish", Value::Null),
        ])];
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        assert_eq!(csv.lines().nth(1).unwrap(), "1,\"\"");
    }

    #[test]
    fn u64_extraction_accepts_numbers_and_strings() {
        assert_eq!(value_as_u64(&Value::from(42)), Some(42));
        assert_eq!(value_as_u64(&Value::from("42")), Some(42));
        assert_eq!(value_as_u64(&Value::from("nope")), None);
        assert_eq!(value_as_u64(&Value::Bool(true)), None);
    }
}
