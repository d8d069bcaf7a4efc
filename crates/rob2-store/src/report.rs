//! Batch report: `{file_id: [ResultRow, ...], ..., "errors": {file_id: message}}`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use rob2_core::{OverallRisk, ResultRow};
use serde::Serialize;
use tracing::{info, warn};

use crate::StoreError;

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Evaluated(Vec<ResultRow>),
    Failed(String),
}

/// Top-level key holding failed files.
pub const ERRORS_KEY: &str = "errors";

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(flatten)]
    results: BTreeMap<String, Vec<ResultRow>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file's outcome. A later outcome for the same id replaces the
    /// earlier one. The id `errors` is recorded as `./errors` so it cannot
    /// shadow the errors map.
    pub fn record(&mut self, file_id: impl Into<String>, outcome: FileOutcome) {
        let mut file_id = file_id.into();
        if file_id == ERRORS_KEY {
            file_id = format!("./{ERRORS_KEY}");
            warn!(file = %file_id, "file id collides with the errors key");
        }
        match outcome {
            FileOutcome::Evaluated(rows) => {
                self.errors.remove(&file_id);
                self.results.insert(file_id, rows);
            }
            FileOutcome::Failed(message) => {
                self.results.remove(&file_id);
                self.errors.insert(file_id, message);
            }
        }
    }

    pub fn results(&self) -> impl Iterator<Item = (&str, &[ResultRow])> {
        self.results.iter().map(|(id, rows)| (id.as_str(), rows.as_slice()))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(id, e)| (id.as_str(), e.as_str()))
    }

    /// The aggregate verdict recorded for a file, if it was evaluated.
    pub fn overall(&self, file_id: &str) -> Option<OverallRisk> {
        self.results
            .get(file_id)?
            .iter()
            .rev()
            .find_map(ResultRow::as_overall)
            .map(|a| a.overall())
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report atomically to `path`.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(self.to_json()?.as_bytes())
            .map_err(|e| StoreError::io(path, e))?;
        tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
        info!(
            path = %path.display(),
            evaluated = self.results.len(),
            failed = self.errors.len(),
            "report written"
        );
        Ok(())
    }
}
