// SensorIngest - platform/config.rs
//
// Configuration directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.
//
// Two tiers of validation:
//   - Settings the pipeline cannot run without (sampling interval, check
//     thresholds, site profiles) fail fast with a `ConfigError`.
//   - Soft settings (log level, discovery limits) fall back to defaults and
//     produce a warning string for the caller to surface.

use crate::core::checks::{parse_interval, CheckConfig, CheckEngine};
use crate::core::discovery::DiscoveryConfig;
use crate::core::model::{Aggregation, ValueRange};
use crate::core::parser::ParseConfig;
use crate::core::site::{SiteCatalog, SiteProfile};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolved platform paths for SensorIngest configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/sensoringest/ or %APPDATA%\SensorIngest\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml shape
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so a newer config file still loads in
/// an older binary.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub parsing: ParsingSection,
    pub checks: ChecksSection,
    pub discovery: DiscoverySection,
    pub export: ExportSection,
    pub logging: LoggingSection,
    /// `[[sites]]`: static per-site deployment profiles.
    pub sites: Vec<SiteEntry>,
}

/// `[parsing]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Field text meaning "no measurement" (default "NAN").
    pub missing_token: Option<String>,
    /// chrono format for the timestamp field.
    pub timestamp_format: Option<String>,
    /// Abort on the first malformed data row.
    pub strict: Option<bool>,
}

/// `[checks]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChecksSection {
    /// Nominal sampling interval, e.g. "15min", "30s", "1h".
    pub sampling_interval: Option<String>,
    pub gap_tolerance: Option<f64>,
    pub missing_run_min: Option<usize>,
    pub missing_run_extended_factor: Option<usize>,
    pub stuck_run_min: Option<usize>,
    /// Column-name globs exempt from stuck-value detection.
    pub discrete_columns: Option<Vec<String>>,
    /// `[checks.default_ranges]`: per-aggregation plausible ranges, merged
    /// over the built-in defaults.
    pub default_ranges: DefaultRangesSection,
    /// `[[checks.column_ranges]]`: per-deployment ranges by column glob.
    pub column_ranges: Vec<ColumnRangeEntry>,
}

/// `[checks.default_ranges]` table, one optional `{ min, max }` per
/// aggregation kind.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DefaultRangesSection {
    pub sample: Option<ValueRange>,
    pub average: Option<ValueRange>,
    pub total: Option<ValueRange>,
    pub min: Option<ValueRange>,
    pub max: Option<ValueRange>,
    pub other: Option<ValueRange>,
}

impl DefaultRangesSection {
    fn entries(self) -> impl Iterator<Item = (Aggregation, ValueRange)> {
        [
            (Aggregation::Sample, self.sample),
            (Aggregation::Average, self.average),
            (Aggregation::Total, self.total),
            (Aggregation::Min, self.min),
            (Aggregation::Max, self.max),
            (Aggregation::Other, self.other),
        ]
        .into_iter()
        .filter_map(|(aggregation, range)| range.map(|r| (aggregation, r)))
    }
}

/// One `[[checks.column_ranges]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnRangeEntry {
    pub pattern: String,
    pub min: f64,
    pub max: f64,
}

/// One `[[sites]]` entry, matched against the station name in file headers.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub site_id: String,
    /// Overrides `[checks] sampling_interval` for this site.
    pub sampling_interval: Option<String>,
    /// `[sites.display_names]`: logger column name -> standard name.
    #[serde(default)]
    pub display_names: BTreeMap<String, String>,
    /// `[sites.metadata]`: extra key/value pairs for the site row.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// `[discovery]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

/// `[export]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    /// Text written for missing values in the data table (default "#N/A").
    pub na_representation: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Validated application configuration derived from `config.toml`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub parse: ParseConfig,
    pub checks: CheckConfig,
    pub discovery: DiscoveryConfig,
    pub sites: SiteCatalog,
    pub na_representation: String,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            parse: ParseConfig::default(),
            checks: CheckConfig::default(),
            discovery: DiscoveryConfig::default(),
            sites: SiteCatalog::default(),
            na_representation: constants::DEFAULT_NA_REPRESENTATION.to_string(),
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate the config file at `config_path`.
///
/// A missing file is a first run: defaults, no warnings. An unreadable or
/// unparseable file, or an invalid check setting, is a `ConfigError`.
/// Out-of-range soft settings fall back to defaults with a warning.
pub fn load_config(config_path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config file found; using defaults");
        return Ok((AppConfig::default(), Vec::new()));
    }

    let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;

    let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %config_path.display(), "Loaded config file");

    let (config, warnings) = validate(raw)?;

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    Ok((config, warnings))
}

/// Apply a parsed config over the defaults.
pub fn validate(raw: RawConfig) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let mut config = AppConfig::default();
    let mut warnings = Vec::new();

    // -- Parsing --
    if let Some(token) = raw.parsing.missing_token {
        config.parse.missing_token = token.trim().to_string();
    }
    if let Some(format) = raw.parsing.timestamp_format {
        if format.trim().is_empty() {
            warnings.push(format!(
                "[parsing] timestamp_format is empty. Using default (\"{}\").",
                constants::DEFAULT_TIMESTAMP_FORMAT
            ));
        } else {
            config.parse.timestamp_format = format;
        }
    }
    if let Some(strict) = raw.parsing.strict {
        config.parse.strict = strict;
    }

    // -- Checks (hard errors) --
    let checks = &mut config.checks;
    if let Some(ref interval) = raw.checks.sampling_interval {
        checks.sampling_interval = parse_interval(interval)?;
    }
    if let Some(v) = raw.checks.gap_tolerance {
        checks.gap_tolerance = v;
    }
    if let Some(v) = raw.checks.missing_run_min {
        checks.missing_run_min = v;
    }
    if let Some(v) = raw.checks.missing_run_extended_factor {
        checks.missing_run_extended_factor = v;
    }
    if let Some(v) = raw.checks.stuck_run_min {
        checks.stuck_run_min = v;
    }
    if let Some(globs) = raw.checks.discrete_columns {
        checks.discrete_columns = globs;
    }
    checks.default_ranges.extend(raw.checks.default_ranges.entries());
    checks.column_ranges = raw
        .checks
        .column_ranges
        .into_iter()
        .map(|e| (e.pattern, ValueRange::new(e.min, e.max)))
        .collect();

    // Same validation the engine applies, surfaced at load time.
    CheckEngine::new(config.checks.clone())?;

    // -- Sites (hard errors) --
    let profiles = raw
        .sites
        .into_iter()
        .map(|entry| -> Result<SiteProfile, ConfigError> {
            let sampling_interval = entry
                .sampling_interval
                .as_deref()
                .map(parse_interval)
                .transpose()?;
            Ok(SiteProfile {
                site_id: entry.site_id,
                sampling_interval,
                display_names: entry.display_names,
                metadata: entry.metadata,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    config.sites = SiteCatalog::new(profiles)?;

    // -- Discovery (soft) --
    if let Some(depth) = raw.discovery.max_depth {
        if depth >= 1 {
            config.discovery.max_depth = depth;
        } else {
            warnings.push(format!(
                "[discovery] max_depth = {depth} must be at least 1. Using default ({}).",
                constants::DEFAULT_MAX_DEPTH
            ));
        }
    }
    if let Some(files) = raw.discovery.max_files {
        if files >= 1 {
            config.discovery.max_files = files;
        } else {
            warnings.push(format!(
                "[discovery] max_files = {files} must be at least 1. Using default ({}).",
                constants::DEFAULT_MAX_FILES
            ));
        }
    }
    if let Some(include) = raw.discovery.include_patterns {
        config.discovery.include_patterns = include;
    }
    if let Some(exclude) = raw.discovery.exclude_patterns {
        config.discovery.exclude_patterns = exclude;
    }

    // -- Export --
    if let Some(na) = raw.export.na_representation {
        config.na_representation = na;
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(PathBuf::from(file));
        }
    }

    Ok((config, warnings))
}
