/// Loader for the known-issue dataset.
///
/// The dataset is a CSV file with a header row naming at least an `issue` and a `solution`
/// column. It is read once at startup; rows missing either field are skipped with a warning.
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::AppError;
use crate::model::IssueRecord;

const ISSUE_COLUMN: &str = "issue";
const SOLUTION_COLUMN: &str = "solution";

/// Ordered, immutable table of known issues.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<IssueRecord>,
}

impl Dataset {
    /// Build from in-memory records. Records with a blank description are dropped with a
    /// warning, the same rule the CSV loader applies.
    pub fn from_records(records: Vec<IssueRecord>) -> Self {
        let total = records.len();
        let records: Vec<IssueRecord> = records
            .into_iter()
            .filter(|r| !r.description.trim().is_empty())
            .collect();
        if records.len() < total {
            warn!(
                skipped = total - records.len(),
                "dropping issue records with a blank description"
            );
        }
        Self { records }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| AppError::Dataset {
            path: path.to_path_buf(),
            message: format!("failed to open: {e}"),
        })?;
        Self::from_reader(file, path)
    }

    /// Parse CSV content. `source` is only used for error and log context.
    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| dataset_error(source, format!("failed to read header row: {e}")))?
            .clone();
        let issue_idx = column_index(&headers, ISSUE_COLUMN)
            .ok_or_else(|| dataset_error(source, format!("missing '{ISSUE_COLUMN}' column")))?;
        let solution_idx = column_index(&headers, SOLUTION_COLUMN)
            .ok_or_else(|| dataset_error(source, format!("missing '{SOLUTION_COLUMN}' column")))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for result in reader.records() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "skipping unreadable dataset row");
                    skipped += 1;
                    continue;
                }
            };
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            let issue = row.get(issue_idx).filter(|s| !s.is_empty());
            let solution = row.get(solution_idx).filter(|s| !s.is_empty());
            let (Some(issue), Some(solution)) = (issue, solution) else {
                warn!(
                    source = %source.display(),
                    line,
                    "skipping dataset row with missing issue or solution"
                );
                skipped += 1;
                continue;
            };

            records.push(IssueRecord::new(issue, solution));
        }

        info!(
            source = %source.display(),
            records = records.len(),
            skipped,
            "dataset loaded"
        );
        Ok(Self { records })
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn dataset_error(source: &Path, message: String) -> AppError {
    AppError::Dataset {
        path: PathBuf::from(source),
        message,
    }
}
