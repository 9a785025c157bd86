// SensorIngest - app/ingest.rs
//
// Ingest driver: file -> text -> ParsedDataset -> checked SessionModel.
//
// Batch runs expand directories through discovery and process files
// sequentially. A file that fails to load is recorded and the batch moves
// on; only the caller decides whether that is fatal.

use crate::app::session::SessionModel;
use crate::core::checks::CheckEngine;
use crate::core::discovery::{self, DiscoveryConfig};
use crate::core::parser::{self, ParseConfig};
use crate::core::site::SiteCatalog;
use crate::platform::fs;
use crate::util::error::{IngestError, Result};
use std::path::{Path, PathBuf};

/// One successfully opened file.
#[derive(Debug)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub session: SessionModel,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<IngestedFile>,
    pub failures: Vec<(PathBuf, IngestError)>,
    /// Non-fatal discovery warnings (unreadable entries, truncation).
    pub warnings: Vec<String>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Confirm review on every file that has nothing left to review.
    /// Returns how many files still have pending error anomalies.
    pub fn confirm_reviews(&mut self) -> usize {
        let mut open = 0;
        for file in &mut self.files {
            if let Err(e) = file.session.confirm_review() {
                tracing::debug!(
                    file = %file.path.display(),
                    pending_errors = file.session.pending_errors(),
                    reason = %e,
                    "Review left open"
                );
                open += 1;
            }
        }
        open
    }
}

/// Read, parse and open a session for a single logger file.
///
/// When `sites` has a profile for the file's station, its metadata is merged
/// into the dataset, its display names become the initial column overrides
/// and its sampling interval replaces the engine's.
pub fn ingest_file(
    path: &Path,
    parse: &ParseConfig,
    engine: &CheckEngine,
    sites: &SiteCatalog,
) -> Result<SessionModel> {
    let text = fs::read_file_lossy(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        operation: "read logger file",
        source,
    })?;

    let mut dataset = parser::parse(&text, parse)?;
    if !dataset.is_clean() {
        tracing::warn!(
            file = %path.display(),
            skipped = dataset.skipped_row_count,
            first_error = ?dataset.row_errors.first().map(ToString::to_string),
            "File contains malformed rows"
        );
    }

    let session = match sites.find(&dataset.site_id) {
        Some(profile) => {
            profile.merge_metadata(&mut dataset);
            let overrides = profile.column_overrides(&dataset);
            let engine = match profile.sampling_interval {
                Some(interval) => engine.with_sampling_interval(interval)?,
                None => engine.clone(),
            };
            tracing::debug!(
                file = %path.display(),
                site = %profile.site_id,
                renamed = overrides.len(),
                "Site profile applied"
            );
            SessionModel::open_with_overrides(dataset, engine, overrides)
        }
        None => {
            if !sites.is_empty() {
                tracing::info!(
                    file = %path.display(),
                    site = %dataset.site_id,
                    "No site profile for station; using file metadata only"
                );
            }
            SessionModel::open(dataset, engine.clone())
        }
    };

    tracing::info!(
        file = %path.display(),
        site = %session.dataset().site_id,
        rows = session.dataset().row_count(),
        anomalies = session.anomalies().len(),
        "File ingested"
    );
    Ok(session)
}

/// Expand `paths` (files or directories) and ingest every logger file found.
pub fn ingest_paths(
    paths: &[PathBuf],
    discovery_config: &DiscoveryConfig,
    parse: &ParseConfig,
    engine: &CheckEngine,
    sites: &SiteCatalog,
) -> BatchReport {
    let mut report = BatchReport::default();

    let mut targets = Vec::new();
    for root in paths {
        match discovery::discover_files(root, discovery_config) {
            Ok((files, warnings)) => {
                targets.extend(files);
                report.warnings.extend(warnings);
            }
            Err(e) => report.failures.push((root.clone(), e.into())),
        }
    }
    targets.dedup();

    tracing::info!(files = targets.len(), "Batch ingest starting");

    for path in targets {
        match ingest_file(&path, parse, engine, sites) {
            Ok(session) => report.files.push(IngestedFile { path, session }),
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "File failed to load");
                report.failures.push((path, e));
            }
        }
    }

    tracing::info!(
        ingested = report.files.len(),
        failed = report.failures.len(),
        "Batch ingest complete"
    );
    report
}
