// SensorIngest - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation. All errors preserve the causal chain
// for diagnostic logging.
//
// Data defects (skipped rows, anomalies) are values, not errors. Everything
// here aborts the operation that produced it.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all SensorIngest operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum IngestError {
    /// Logger file could not be parsed.
    Parse(ParseError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// A session operation was called out of sequence or with a stale reference.
    Session(SessionError),

    /// Writing the composed artifact failed.
    Export(ExportError),

    /// Batch discovery failed.
    Discovery(DiscoveryError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Session(e) => write!(f, "Session error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Discovery(e) => write!(f, "Discovery error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Discovery(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors returned by the logger file parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The header block is absent or malformed. Always fatal.
    Format(FormatError),

    /// A data row is malformed and strict mode was requested.
    Row(RowError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Row(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::Row(e) => Some(e),
        }
    }
}

impl From<FormatError> for ParseError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<RowError> for ParseError {
    fn from(e: RowError) -> Self {
        Self::Row(e)
    }
}

impl From<ParseError> for IngestError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Header-level format errors. Each carries the offending header fragment so
/// the operator sees exactly what the file contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer header records than the fixed schema requires.
    MissingHeader { expected: usize, found: usize },

    /// The station row does not carry a supported file-format tag.
    UnsupportedFormat { tag: String, fragment: String },

    /// The station row has no site identifier.
    MissingSiteId { fragment: String },

    /// Names/units/aggregation rows are too short or disagree in length.
    HeaderLength {
        row: &'static str,
        expected: usize,
        found: usize,
        fragment: String,
    },

    /// Two columns share the same name, so positional binding is ambiguous.
    DuplicateColumn { name: String, fragment: String },

    /// A header record could not be split into fields.
    Unreadable { line_number: u64, reason: String },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader { expected, found } => write!(
                f,
                "header block incomplete: expected {expected} header rows, found {found}"
            ),
            Self::UnsupportedFormat { tag, fragment } => write!(
                f,
                "unsupported file format '{tag}' (expected {}): {fragment}",
                crate::util::constants::SUPPORTED_FILE_FORMAT
            ),
            Self::MissingSiteId { fragment } => {
                write!(f, "station row has no site identifier: {fragment}")
            }
            Self::HeaderLength {
                row,
                expected,
                found,
                fragment,
            } => write!(
                f,
                "{row} row has {found} fields, expected {expected}: {fragment}"
            ),
            Self::DuplicateColumn { name, fragment } => {
                write!(f, "column '{name}' appears more than once: {fragment}")
            }
            Self::Unreadable {
                line_number,
                reason,
            } => write!(f, "header line {line_number} is unreadable: {reason}"),
        }
    }
}

impl std::error::Error for FormatError {}

/// A malformed data row. In tolerant mode these are recorded on the dataset
/// and the row is skipped; in strict mode the first one aborts the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// Field count differs from the header.
    FieldCount {
        line_number: u64,
        expected: usize,
        found: usize,
    },

    /// The timestamp field does not match the expected format.
    Timestamp {
        line_number: u64,
        raw: String,
        format: String,
    },

    /// A value is neither the missing token nor a finite number.
    Value {
        line_number: u64,
        column: String,
        raw: String,
    },

    /// The record could not be split into fields (e.g. unterminated quote).
    Csv { line_number: u64, reason: String },
}

impl RowError {
    /// 1-based line number of the offending row in the raw file.
    pub fn line_number(&self) -> u64 {
        match self {
            Self::FieldCount { line_number, .. }
            | Self::Timestamp { line_number, .. }
            | Self::Value { line_number, .. }
            | Self::Csv { line_number, .. } => *line_number,
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount {
                line_number,
                expected,
                found,
            } => write!(
                f,
                "line {line_number}: {found} fields, header defines {expected}"
            ),
            Self::Timestamp {
                line_number,
                raw,
                format,
            } => write!(
                f,
                "line {line_number}: cannot parse timestamp '{raw}' with format '{format}'"
            ),
            Self::Value {
                line_number,
                column,
                raw,
            } => write!(
                f,
                "line {line_number}: column '{column}' has non-numeric value '{raw}'"
            ),
            Self::Csv {
                line_number,
                reason,
            } => write!(f, "line {line_number}: {reason}"),
        }
    }
}

impl std::error::Error for RowError {}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading and check-engine construction.
#[derive(Debug)]
pub enum ConfigError {
    /// A numeric threshold that must be positive is zero or negative.
    NonPositive { field: String, value: String },

    /// A range whose min is not strictly below its max.
    InvalidRange { field: String, min: f64, max: f64 },

    /// A sampling interval string such as "15min" could not be understood.
    InvalidInterval { value: String },

    /// A `[[sites]]` entry with an empty or repeated site id.
    InvalidSite { site_id: String, reason: &'static str },

    /// A column-name glob failed to compile.
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositive { field, value } => {
                write!(f, "'{field}' = {value} must be greater than zero")
            }
            Self::InvalidRange { field, min, max } => write!(
                f,
                "'{field}' range [{min}, {max}] is invalid: min must be below max"
            ),
            Self::InvalidInterval { value } => write!(
                f,
                "sampling interval '{value}' is not understood. \
                 Expected a number followed by s, min or h (e.g. \"15min\")"
            ),
            Self::InvalidSite { site_id, reason } => {
                write!(f, "site profile '{site_id}': {reason}")
            }
            Self::InvalidPattern { pattern, source } => {
                write!(f, "invalid column pattern '{pattern}': {source}")
            }
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPattern { source, .. } => Some(source),
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for IngestError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Caller-usage errors raised by the session model. These signal a UI
/// sequencing mistake, never a problem with the data.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The anomaly id is not in the current anomaly list.
    UnknownAnomaly { id: String },

    /// Export was requested before the session reached the reviewed state.
    NotReady {
        status: String,
        pending_errors: usize,
        checks_stale: bool,
    },

    /// The column index is outside the dataset.
    UnknownColumn { index: usize, column_count: usize },

    /// Operator edits are only accepted while checked or reviewed.
    EditNotAllowed { status: String },

    /// An expected range override with min not below max.
    InvalidRange { index: usize, min: f64, max: f64 },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAnomaly { id } => write!(
                f,
                "anomaly '{id}' is not in the current check results (re-run checks?)"
            ),
            Self::NotReady {
                status,
                pending_errors,
                checks_stale,
            } => {
                write!(f, "session is {status}, not reviewed")?;
                if *checks_stale {
                    write!(f, "; column metadata changed since the last check run")?;
                }
                if *pending_errors > 0 {
                    write!(f, "; {pending_errors} error anomalies still unreviewed")?;
                }
                Ok(())
            }
            Self::UnknownColumn {
                index,
                column_count,
            } => write!(
                f,
                "column index {index} is out of range (dataset has {column_count} columns)"
            ),
            Self::EditNotAllowed { status } => {
                write!(f, "edits are not accepted while the session is {status}")
            }
            Self::InvalidRange { index, min, max } => write!(
                f,
                "column {index}: expected range [{min}, {max}] is invalid: min must be below max"
            ),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for IngestError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to writing the composed artifact.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { table: String, source: csv::Error },

    /// JSON serialisation error.
    Json { source: serde_json::Error },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { table, source } => {
                write!(f, "CSV export error in table '{table}': {source}")
            }
            Self::Json { source } => write!(f, "JSON export error: {source}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source } => Some(source),
        }
    }
}

impl From<ExportError> for IngestError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// Errors related to batch file discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The root scan path does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// Walkdir traversal error on the root itself.
    Traversal {
        path: PathBuf,
        source: walkdir::Error,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Scan path '{}' does not exist", path.display())
            }
            Self::Traversal { path, source } => {
                write!(f, "Error traversing '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Traversal { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for IngestError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}

/// Convenience type alias for SensorIngest results.
pub type Result<T> = std::result::Result<T, IngestError>;
