// SensorIngest - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers: the parser
// produces a `ParsedDataset`, the check engine produces `Anomaly` values,
// the session layers operator edits on top, and the composer projects
// everything into an `Artifact`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::util::error::RowError;

// =============================================================================
// Columns
// =============================================================================

/// How a logged value was derived over its sampling interval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sample,
    Average,
    Total,
    Min,
    Max,
    #[default]
    Other,
}

impl Aggregation {
    /// Map a logger processing tag (`Smp`, `Avg`, `Tot`, `Min`, `Max`) to a
    /// variant. Matching is case-insensitive; anything else is `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "smp" => Aggregation::Sample,
            "avg" => Aggregation::Average,
            "tot" => Aggregation::Total,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            _ => Aggregation::Other,
        }
    }

    /// Human-readable label for display and export.
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sample => "Sample",
            Aggregation::Average => "Average",
            Aggregation::Total => "Total",
            Aggregation::Min => "Min",
            Aggregation::Max => "Max",
            Aggregation::Other => "Other",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One measurement column as declared by the header block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub unit: String,
    pub aggregation: Aggregation,
}

/// Inclusive plausibility range for a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when min is strictly below max and neither bound is NaN.
    pub fn is_valid(&self) -> bool {
        self.min < self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

// =============================================================================
// Samples
// =============================================================================

/// A single cell of sensor data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Value {
    Number(f64),
    Missing,
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// One data record. `values` is parallel to `ParsedDataset::columns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub timestamp: NaiveDateTime,
    pub values: Vec<Value>,
}

// =============================================================================
// Parsed dataset
// =============================================================================

/// Normalised output of parsing one logger file.
///
/// Invariant: every `Row::values` has exactly `columns.len()` entries.
/// Samples are kept in file order; ordering defects are left for the check
/// engine to report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDataset {
    /// Station name from the header, used as the site identifier.
    pub site_id: String,

    /// Free-form header fields plus the reserved `skipped_row_count` key.
    pub logger_metadata: BTreeMap<String, String>,

    /// Header name of the leading timestamp field (normally `TIMESTAMP`).
    pub timestamp_column: String,

    pub columns: Vec<ColumnDef>,

    pub samples: Vec<Row>,

    /// Number of data rows skipped under the tolerant parsing policy.
    pub skipped_row_count: usize,

    /// Details of the first skipped rows (capped, see `MAX_RECORDED_ROW_ERRORS`).
    #[serde(skip)]
    pub row_errors: Vec<RowError>,
}

impl ParsedDataset {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.samples.len()
    }

    /// True when every data row in the file was accepted.
    pub fn is_clean(&self) -> bool {
        self.skipped_row_count == 0
    }

    /// Position of the column with the given raw header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn timestamp_at(&self, row: usize) -> Option<NaiveDateTime> {
        self.samples.get(row).map(|r| r.timestamp)
    }

    /// Iterate one column top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Value> + '_ {
        self.samples
            .iter()
            .map(move |row| row.values.get(index).copied().unwrap_or(Value::Missing))
    }
}

// =============================================================================
// Anomalies
// =============================================================================

/// Category of a detected defect. Declaration order is the tie-break order
/// used when sorting anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    Gap,
    OutOfRange,
    StuckValue,
    DuplicateTimestamp,
    NonMonotonicTime,
    MissingRun,
}

impl AnomalyKind {
    /// Stable code used in anomaly ids and exports.
    pub fn code(&self) -> &'static str {
        match self {
            AnomalyKind::Gap => "GAP",
            AnomalyKind::OutOfRange => "OUT_OF_RANGE",
            AnomalyKind::StuckValue => "STUCK_VALUE",
            AnomalyKind::DuplicateTimestamp => "DUPLICATE_TIMESTAMP",
            AnomalyKind::NonMonotonicTime => "NON_MONOTONIC_TIME",
            AnomalyKind::MissingRun => "MISSING_RUN",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Anomaly severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive range of dataset row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of rows covered (never zero).
    pub fn row_count(&self) -> usize {
        self.end - self.start + 1
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Content-derived anomaly identity.
///
/// Built from `(kind, column_index, row_range.start)` only, so the same
/// defect found by a later check run maps to the same id and keeps its
/// operator annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnomalyId(String);

impl AnomalyId {
    pub fn new(kind: AnomalyKind, column_index: Option<usize>, start: usize) -> Self {
        let column = match column_index {
            Some(c) => format!("c{c}"),
            None => "all".to_string(),
        };
        Self(format!("{}/{column}/r{start}", kind.code()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnomalyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structural or statistical defect found in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub id: AnomalyId,
    pub kind: AnomalyKind,
    /// `None` for whole-record anomalies on the timestamp axis.
    pub column_index: Option<usize>,
    pub row_range: RowRange,
    pub severity: Severity,
    pub detail: String,
}

impl Anomaly {
    pub fn new(
        kind: AnomalyKind,
        column_index: Option<usize>,
        row_range: RowRange,
        severity: Severity,
        detail: String,
    ) -> Self {
        Self {
            id: AnomalyId::new(kind, column_index, row_range.start),
            kind,
            column_index,
            row_range,
            severity,
            detail,
        }
    }

    /// Canonical ordering key: row, then column (whole-record first), then kind.
    pub fn sort_key(&self) -> (usize, Option<usize>, AnomalyKind) {
        (self.row_range.start, self.column_index, self.kind)
    }
}

// =============================================================================
// Operator edits
// =============================================================================

/// Operator-editable metadata for one column. Every field is optional; an
/// unset field falls back to the header or configuration value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMetadataOverride {
    pub display_name: Option<String>,
    pub expected_range: Option<ValueRange>,
    pub notes: Option<String>,
    /// Marks the column as naturally discrete (exempt from stuck-value checks).
    pub discrete: Option<bool>,
}

/// Operator resolution state for an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    #[default]
    Unreviewed,
    Acknowledged,
    FalsePositive,
    DataCorrected,
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Unreviewed => "Unreviewed",
            Disposition::Acknowledged => "Acknowledged",
            Disposition::FalsePositive => "False positive",
            Disposition::DataCorrected => "Data corrected",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyAnnotation {
    pub anomaly_id: AnomalyId,
    pub disposition: Disposition,
    pub comment: String,
}

impl AnomalyAnnotation {
    /// Fresh annotation for a newly appearing anomaly.
    pub fn unreviewed(anomaly_id: AnomalyId) -> Self {
        Self {
            anomaly_id,
            disposition: Disposition::Unreviewed,
            comment: String::new(),
        }
    }
}

/// Review lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Loaded,
    Checked,
    Reviewed,
    Exported,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Loaded => "loaded",
            SessionStatus::Checked => "checked",
            SessionStatus::Reviewed => "reviewed",
            SessionStatus::Exported => "exported",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Composed artifact
// =============================================================================

/// One cell of an exported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Timestamp(NaiveDateTime),
    Empty,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Render for tabular output. `empty` is used for `Cell::Empty`.
    pub fn render(&self, empty: &str) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => v.to_string(),
            Cell::Timestamp(ts) => ts
                .format(crate::util::constants::EXPORT_TIMESTAMP_FORMAT)
                .to_string(),
            Cell::Empty => empty.to_string(),
        }
    }
}

/// A named, rectangular table: every row has `header.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// The three-part export: data, column/site metadata, anomaly notes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub data: Table,
    pub metadata: Table,
    pub notes: Table,
}

impl Artifact {
    /// Tables in worksheet order.
    pub fn tables(&self) -> [&Table; 3] {
        [&self.data, &self.metadata, &self.notes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_from_tag() {
        assert_eq!(Aggregation::from_tag("Avg"), Aggregation::Average);
        assert_eq!(Aggregation::from_tag("TOT"), Aggregation::Total);
        assert_eq!(Aggregation::from_tag(" smp "), Aggregation::Sample);
        assert_eq!(Aggregation::from_tag(""), Aggregation::Other);
        assert_eq!(Aggregation::from_tag("WVc"), Aggregation::Other);
    }

    #[test]
    fn test_anomaly_id_is_content_derived() {
        let a = AnomalyId::new(AnomalyKind::MissingRun, Some(2), 10);
        let b = AnomalyId::new(AnomalyKind::MissingRun, Some(2), 10);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "MISSING_RUN/c2/r10");
        assert_eq!(
            AnomalyId::new(AnomalyKind::Gap, None, 41).as_str(),
            "GAP/all/r41"
        );
    }

    #[test]
    fn test_sort_key_puts_whole_record_before_columns() {
        let whole = Anomaly::new(
            AnomalyKind::Gap,
            None,
            RowRange::new(5, 6),
            Severity::Warn,
            String::new(),
        );
        let column = Anomaly::new(
            AnomalyKind::Gap,
            Some(0),
            RowRange::new(5, 9),
            Severity::Warn,
            String::new(),
        );
        assert!(whole.sort_key() < column.sort_key());
    }

    #[test]
    fn test_timestamp_cell_keeps_fractional_seconds() {
        let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let quarter = Cell::Timestamp(base + chrono::Duration::milliseconds(250));
        let three_quarters = Cell::Timestamp(base + chrono::Duration::milliseconds(750));

        assert_eq!(Cell::Timestamp(base).render(""), "2024-01-01 00:00:00");
        assert_eq!(quarter.render(""), "2024-01-01 00:00:00.250");
        assert_ne!(quarter.render(""), three_quarters.render(""));
    }

    #[test]
    fn test_value_range_is_inclusive() {
        let r = ValueRange::new(0.0, 100.0);
        assert!(r.contains(0.0));
        assert!(r.contains(100.0));
        assert!(!r.contains(-0.1));
        assert!(!ValueRange::new(5.0, 5.0).is_valid());
        assert!(!ValueRange::new(f64::NAN, 5.0).is_valid());
    }
}
