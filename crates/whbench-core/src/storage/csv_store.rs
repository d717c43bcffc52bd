use crate::model::{round_to, ExecutionRecord};
use anyhow::Context;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Output columns; identical for every backend and for failed attempts.
pub const HEADER: [&str; 14] = [
    "query_description",
    "response_time_ms",
    "official_time_ms",
    "mb_scanned",
    "rows_produced",
    "credits_used",
    "query_id",
    "backend",
    "target",
    "run_type",
    "query_tag",
    "executed_at",
    "error",
    "extra_metrics",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    query_description: &'a str,
    response_time_ms: f64,
    official_time_ms: Option<f64>,
    mb_scanned: Option<f64>,
    rows_produced: Option<u64>,
    credits_used: Option<f64>,
    query_id: Option<&'a str>,
    backend: &'a str,
    target: &'a str,
    run_type: &'a str,
    query_tag: &'a str,
    executed_at: &'a str,
    error: Option<&'a str>,
    extra_metrics: Option<String>,
}

impl<'a> CsvRow<'a> {
    fn from_record(rec: &'a ExecutionRecord) -> anyhow::Result<Self> {
        let stats = rec.stats.as_ref();
        let extra_metrics = match stats {
            Some(s) if !s.extra.is_empty() => Some(serde_json::to_string(&s.extra)?),
            _ => None,
        };
        Ok(Self {
            query_description: &rec.description,
            response_time_ms: rec.response_time_ms,
            official_time_ms: stats
                .and_then(|s| s.official_time_ms)
                .map(|t| round_to(t, 2)),
            mb_scanned: stats.and_then(|s| s.mb_scanned()),
            rows_produced: rec.rows_produced,
            credits_used: stats.and_then(|s| s.credits_used),
            query_id: rec.query_id.as_deref(),
            backend: &rec.backend,
            target: &rec.target,
            run_type: &rec.run_type,
            query_tag: &rec.tag,
            executed_at: &rec.executed_at,
            error: rec.error.as_deref(),
            extra_metrics,
        })
    }
}

/// Append-only CSV results file. The file is opened for each record and
/// closed again, so rows already written survive a crash mid-run.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match existing_header(&path) {
            Ok(Some(found)) if found != HEADER => {
                tracing::warn!(
                    path = %path.display(),
                    found = %found.join(","),
                    "existing results file has a different header; appending anyway"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not inspect results file header");
            }
        }
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, rec: &ExecutionRecord) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let needs_header = file.metadata()?.len() == 0;

        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            w.write_record(HEADER)?;
        }
        w.serialize(CsvRow::from_record(rec)?)
            .with_context(|| format!("failed to write row to {}", self.path.display()))?;
        w.flush()?;
        Ok(())
    }
}

fn existing_header(path: &Path) -> std::io::Result<Option<Vec<String>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(line.split(',').map(str::to_string).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryStats;
    use serde_json::json;

    fn record(desc: &str) -> ExecutionRecord {
        ExecutionRecord {
            description: desc.into(),
            response_time_ms: 12.5,
            query_id: Some("q1".into()),
            rows_produced: Some(3),
            stats: None,
            backend: "fake".into(),
            target: "in-memory".into(),
            run_type: "Linear".into(),
            tag: String::new(),
            executed_at: "2024-01-01T00:00:00.000Z".into(),
            error: None,
        }
    }

    #[test]
    fn test_header_written_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.csv");
        let store = CsvStore::new(&path);
        store.append(&record("Q1"))?;
        store.append(&record("Q2"))?;

        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].starts_with("Q1,12.5,,,3,,q1,fake,in-memory,Linear,,"));
        Ok(())
    }

    #[test]
    fn test_stats_columns_and_extra_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.csv");
        let mut rec = record("Q1");
        let mut stats = QueryStats {
            official_time_ms: Some(812.456),
            bytes_scanned: Some(2 * 1024 * 1024),
            credits_used: Some(0.25),
            ..Default::default()
        };
        stats.extra.insert("queue_time_ms".into(), json!(4.0));
        rec.stats = Some(stats);
        CsvStore::new(&path).append(&rec)?;

        let mut rdr = csv::Reader::from_path(&path)?;
        let row = rdr.records().next().unwrap()?;
        assert_eq!(&row[2], "812.46");
        assert_eq!(&row[3], "2.0");
        assert_eq!(&row[5], "0.25");
        assert_eq!(&row[12], "");
        assert_eq!(&row[13], r#"{"queue_time_ms":4.0}"#);
        Ok(())
    }

    #[test]
    fn test_failure_row_has_same_width() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.csv");
        let mut rec = record("Q2");
        rec.response_time_ms = -1.0;
        rec.query_id = None;
        rec.rows_produced = None;
        rec.error = Some("no such column, near \"x\"".into());
        let store = CsvStore::new(&path);
        store.append(&record("Q1"))?;
        store.append(&rec)?;

        let mut rdr = csv::Reader::from_path(&path)?;
        let rows: Vec<csv::StringRecord> = rdr.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), rows[1].len());
        assert_eq!(&rows[1][1], "-1.0");
        assert_eq!(&rows[1][12], "no such column, near \"x\"");
        Ok(())
    }

    #[test]
    fn test_mismatched_header_is_kept() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("legacy.csv");
        std::fs::write(&path, "query_description,response_time_ms\nold,1.0\n")?;
        CsvStore::new(&path).append(&record("Q1"))?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("query_description,response_time_ms\nold,1.0\nQ1,"));
        Ok(())
    }

    #[test]
    fn test_creates_parent_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/runs/out.csv");
        CsvStore::new(&path).append(&record("Q1"))?;
        assert!(path.exists());
        Ok(())
    }
}
