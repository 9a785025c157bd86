// SensorIngest - app/session.rs
//
// In-memory review session for one parsed logger file.
//
// The session owns the dataset, the check engine, the current anomaly list,
// operator column overrides, per-anomaly annotations and the review status.
// It is plain owned data driven through `&mut self`; nothing is persisted
// beyond the artifact produced by `export`.
//
// Lifecycle:
//   Loaded --run_checks--> Checked --(all errors dispositioned)--> Reviewed
//   Reviewed --export--> Exported
//   Any edit from Reviewed regresses to Checked; run_checks always lands
//   in Checked.

use crate::app::compose;
use crate::core::checks::CheckEngine;
use crate::core::model::{
    Anomaly, AnomalyAnnotation, AnomalyId, Artifact, ColumnMetadataOverride, Disposition,
    ParsedDataset, SessionStatus, Severity,
};
use crate::util::error::SessionError;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct SessionModel {
    dataset: ParsedDataset,
    engine: CheckEngine,
    anomalies: Vec<Anomaly>,
    overrides: BTreeMap<usize, ColumnMetadataOverride>,
    annotations: BTreeMap<AnomalyId, AnomalyAnnotation>,
    status: SessionStatus,

    /// Set when column metadata changed after the last check run. Review
    /// cannot complete until the checks are re-run.
    checks_stale: bool,
}

impl SessionModel {
    /// Wrap a freshly parsed dataset. No checks have run yet.
    pub fn load(dataset: ParsedDataset, engine: CheckEngine) -> Self {
        tracing::debug!(
            site = %dataset.site_id,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Session loaded"
        );
        Self {
            dataset,
            engine,
            anomalies: Vec::new(),
            overrides: BTreeMap::new(),
            annotations: BTreeMap::new(),
            status: SessionStatus::Loaded,
            checks_stale: false,
        }
    }

    /// Load and immediately run the check battery once.
    pub fn open(dataset: ParsedDataset, engine: CheckEngine) -> Self {
        let mut session = Self::load(dataset, engine);
        session.run_checks();
        session
    }

    /// Like `open`, with column overrides already in place for the first
    /// check run (e.g. display names from a site profile).
    pub fn open_with_overrides(
        dataset: ParsedDataset,
        engine: CheckEngine,
        overrides: BTreeMap<usize, ColumnMetadataOverride>,
    ) -> Self {
        let column_count = dataset.column_count();
        let mut session = Self::load(dataset, engine);
        session
            .overrides
            .extend(overrides.into_iter().filter(|(i, _)| *i < column_count));
        session.run_checks();
        session
    }

    /// Re-run every check against the current overrides.
    ///
    /// Annotations whose anomaly id recurs are kept; annotations for ids that
    /// disappeared are dropped; new ids start Unreviewed. The session always
    /// ends up Checked, even if it was Reviewed or Exported before.
    pub fn run_checks(&mut self) -> &[Anomaly] {
        let anomalies = self
            .engine
            .run_with_overrides(&self.dataset, &self.overrides);

        let current: HashSet<&AnomalyId> = anomalies.iter().map(|a| &a.id).collect();
        let before = self.annotations.len();
        self.annotations.retain(|id, _| current.contains(id));
        let preserved = self.annotations.len();

        for anomaly in &anomalies {
            self.annotations
                .entry(anomaly.id.clone())
                .or_insert_with(|| AnomalyAnnotation::unreviewed(anomaly.id.clone()));
        }

        self.anomalies = anomalies;
        self.status = SessionStatus::Checked;
        self.checks_stale = false;

        tracing::info!(
            site = %self.dataset.site_id,
            anomalies = self.anomalies.len(),
            pending_errors = self.pending_errors(),
            annotations_kept = preserved,
            annotations_dropped = before - preserved,
            "Checks run"
        );

        &self.anomalies
    }

    /// Replace the operator metadata for one column.
    ///
    /// Range and discrete overrides change what the checks would report, so
    /// the session regresses to Checked and is marked stale until the next
    /// `run_checks`.
    pub fn set_column_metadata(
        &mut self,
        index: usize,
        metadata: ColumnMetadataOverride,
    ) -> Result<(), SessionError> {
        self.require_editable()?;

        let column_count = self.dataset.column_count();
        if index >= column_count {
            return Err(SessionError::UnknownColumn {
                index,
                column_count,
            });
        }
        if let Some(range) = metadata.expected_range {
            if !range.is_valid() {
                return Err(SessionError::InvalidRange {
                    index,
                    min: range.min,
                    max: range.max,
                });
            }
        }

        tracing::debug!(
            column = %self.dataset.columns[index].name,
            display_name = ?metadata.display_name,
            expected_range = ?metadata.expected_range,
            "Column metadata updated"
        );

        self.overrides.insert(index, metadata);
        self.status = SessionStatus::Checked;
        self.checks_stale = true;
        Ok(())
    }

    /// Record the operator's disposition and comment for one anomaly, then
    /// promote to Reviewed or regress to Checked as appropriate.
    pub fn set_annotation(
        &mut self,
        id: &AnomalyId,
        disposition: Disposition,
        comment: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.require_editable()?;

        let Some(annotation) = self.annotations.get_mut(id) else {
            return Err(SessionError::UnknownAnomaly {
                id: id.to_string(),
            });
        };
        annotation.disposition = disposition;
        annotation.comment = comment.into();

        tracing::debug!(anomaly = %id, disposition = %disposition, "Annotation set");

        self.status = if self.review_complete() {
            SessionStatus::Reviewed
        } else {
            SessionStatus::Checked
        };
        Ok(())
    }

    /// Explicitly mark a checked session as reviewed.
    ///
    /// Needed when there is nothing to disposition (for example a clean file),
    /// since `set_annotation` is the only implicit promotion path.
    pub fn confirm_review(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Reviewed => Ok(()),
            SessionStatus::Checked if self.review_complete() => {
                self.status = SessionStatus::Reviewed;
                tracing::info!(site = %self.dataset.site_id, "Review confirmed");
                Ok(())
            }
            _ => Err(self.not_ready()),
        }
    }

    pub fn can_export(&self) -> bool {
        self.status == SessionStatus::Reviewed
    }

    /// Compose the enriched artifact and mark the session exported.
    pub fn export(&mut self) -> Result<Artifact, SessionError> {
        if !self.can_export() {
            return Err(self.not_ready());
        }
        let artifact = compose::compose(self);
        self.status = SessionStatus::Exported;
        tracing::info!(
            site = %self.dataset.site_id,
            rows = artifact.data.rows.len(),
            notes = artifact.notes.rows.len(),
            "Session exported"
        );
        Ok(artifact)
    }

    // -------------------------------------------------------------------------
    // Read-only accessors
    // -------------------------------------------------------------------------

    pub fn dataset(&self) -> &ParsedDataset {
        &self.dataset
    }

    pub fn engine(&self) -> &CheckEngine {
        &self.engine
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn annotation(&self, id: &AnomalyId) -> Option<&AnomalyAnnotation> {
        self.annotations.get(id)
    }

    pub fn column_override(&self, index: usize) -> Option<&ColumnMetadataOverride> {
        self.overrides.get(&index)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn checks_stale(&self) -> bool {
        self.checks_stale
    }

    /// Error-severity anomalies still marked Unreviewed.
    pub fn pending_errors(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| a.severity == Severity::Error)
            .filter(|a| {
                self.annotations
                    .get(&a.id)
                    .map_or(true, |n| n.disposition == Disposition::Unreviewed)
            })
            .count()
    }

    /// Operator display name, falling back to the raw header name.
    pub fn display_name(&self, index: usize) -> &str {
        self.overrides
            .get(&index)
            .and_then(|o| o.display_name.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.dataset.columns[index].name.as_str())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn review_complete(&self) -> bool {
        !self.checks_stale && self.pending_errors() == 0
    }

    fn require_editable(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Checked | SessionStatus::Reviewed => Ok(()),
            other => Err(SessionError::EditNotAllowed {
                status: other.label().to_string(),
            }),
        }
    }

    fn not_ready(&self) -> SessionError {
        SessionError::NotReady {
            status: self.status.label().to_string(),
            pending_errors: self.pending_errors(),
            checks_stale: self.checks_stale,
        }
    }
}
