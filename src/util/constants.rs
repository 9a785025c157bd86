// SensorIngest - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "SensorIngest";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "SensorIngest";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Logger file format
// =============================================================================

/// File-format tag expected as the first field of the station row.
pub const SUPPORTED_FILE_FORMAT: &str = "TOA5";

/// Number of header records preceding the data block.
pub const HEADER_ROW_COUNT: usize = 4;

/// Keys under which the station row fields are stored in `logger_metadata`,
/// in the positional order the logger writes them.
pub const STATION_FIELD_KEYS: &[&str] = &[
    "file_format",
    "station_name",
    "logger_model",
    "logger_serial",
    "logger_os_version",
    "program_name",
    "program_signature",
    "table_name",
];

/// Reserved `logger_metadata` key carrying the number of skipped data rows.
pub const SKIPPED_ROW_COUNT_KEY: &str = "skipped_row_count";

// =============================================================================
// Parsing defaults
// =============================================================================

/// Token the logger writes for a missing measurement.
pub const DEFAULT_MISSING_TOKEN: &str = "NAN";

/// chrono format for data-row timestamps. `%.f` also accepts whole seconds.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Maximum number of row errors retained on a dataset. Further skipped rows
/// are still counted but their details are dropped.
pub const MAX_RECORDED_ROW_ERRORS: usize = 1_000;

/// Maximum length of a raw header fragment quoted in a format error.
pub const MAX_FRAGMENT_LEN: usize = 200;

// =============================================================================
// Sanity check defaults
// =============================================================================

/// Nominal sampling interval (seconds) when the config does not provide one.
pub const DEFAULT_SAMPLING_INTERVAL_SECS: i64 = 15 * 60;

/// A timestamp step larger than this multiple of the nominal interval is a gap.
pub const DEFAULT_GAP_TOLERANCE: f64 = 1.5;

/// Shortest run of missing values reported as MISSING_RUN.
pub const DEFAULT_MISSING_RUN_MIN: usize = 3;

/// Runs at least this multiple of `DEFAULT_MISSING_RUN_MIN` long escalate to Error.
pub const DEFAULT_MISSING_RUN_EXTENDED_FACTOR: usize = 10;

/// Shortest run of bit-identical values reported as STUCK_VALUE.
pub const DEFAULT_STUCK_RUN_MIN: usize = 6;

/// Column-name globs treated as naturally discrete (exempt from STUCK_VALUE).
pub const DEFAULT_DISCRETE_COLUMNS: &[&str] = &["RECORD"];

/// Generic plausibility envelope for sampled, averaged, min and max values.
pub const DEFAULT_MEASUREMENT_RANGE: (f64, f64) = (-10_000.0, 10_000.0);

/// Accumulated totals (rain, counts) can never be negative.
pub const DEFAULT_TOTAL_RANGE: (f64, f64) = (0.0, 1.0e9);

// =============================================================================
// Discovery
// =============================================================================

/// Maximum directory recursion depth during batch discovery.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Maximum number of files picked up by a single batch run.
pub const DEFAULT_MAX_FILES: usize = 500;

/// Default include glob patterns for logger file discovery.
pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &["*.dat", "*.csv"];

/// Default exclude glob patterns. Matched against file names and directory
/// names; matching directories are not descended into.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["*.bak", "*.tmp", ".git", "export"];

// =============================================================================
// Export
// =============================================================================

/// Worksheet names of the composed artifact, in output order.
pub const SHEET_DATA: &str = "Data";
pub const SHEET_COLUMNS: &str = "Columns";
pub const SHEET_NOTES: &str = "Notes";

/// Cell text written for missing measurements in the data table.
pub const DEFAULT_NA_REPRESENTATION: &str = "#N/A";

/// Label used in the notes table for whole-record anomalies.
pub const ALL_COLUMNS_LABEL: &str = "All";

/// Timestamp rendering used in exported tables. Sub-second precision is
/// written only when present.
pub const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
