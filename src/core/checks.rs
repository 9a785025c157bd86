// SensorIngest - core/checks.rs
//
// Sanity check engine: a fixed battery of structural and statistical checks
// run over a parsed dataset.
//
// Whole-record checks walk the timestamp axis once. Per-column checks are
// independent of each other and run on the rayon pool; the union is sorted
// by (row, column, kind) so the result never depends on execution order.

use crate::core::model::{
    Aggregation, Anomaly, AnomalyKind, ColumnDef, ColumnMetadataOverride, ParsedDataset, RowRange,
    Severity, Value, ValueRange,
};
use crate::util::constants;
use crate::util::error::ConfigError;
use chrono::Duration;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;

// =============================================================================
// Configuration
// =============================================================================

/// Thresholds and plausibility ranges for the check battery.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    /// Nominal spacing between consecutive samples.
    pub sampling_interval: Duration,

    /// A step larger than `gap_tolerance * sampling_interval` is a GAP.
    pub gap_tolerance: f64,

    /// Shortest run of missing values reported as MISSING_RUN.
    pub missing_run_min: usize,

    /// Runs of at least `missing_run_min * missing_run_extended_factor`
    /// values are reported as errors rather than warnings.
    pub missing_run_extended_factor: usize,

    /// Shortest run of bit-identical values reported as STUCK_VALUE.
    pub stuck_run_min: usize,

    /// Plausible range per aggregation kind. Kinds without an entry get no
    /// range check unless a column pattern or override supplies one.
    pub default_ranges: BTreeMap<Aggregation, ValueRange>,

    /// Per-deployment ranges keyed by column-name glob. First match wins.
    pub column_ranges: Vec<(String, ValueRange)>,

    /// Column-name globs for naturally discrete columns (no STUCK_VALUE).
    pub discrete_columns: Vec<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        let (lo, hi) = constants::DEFAULT_MEASUREMENT_RANGE;
        let measurement = ValueRange::new(lo, hi);
        let (lo, hi) = constants::DEFAULT_TOTAL_RANGE;
        let total = ValueRange::new(lo, hi);

        let default_ranges = BTreeMap::from([
            (Aggregation::Sample, measurement),
            (Aggregation::Average, measurement),
            (Aggregation::Min, measurement),
            (Aggregation::Max, measurement),
            (Aggregation::Total, total),
        ]);

        Self {
            sampling_interval: Duration::seconds(constants::DEFAULT_SAMPLING_INTERVAL_SECS),
            gap_tolerance: constants::DEFAULT_GAP_TOLERANCE,
            missing_run_min: constants::DEFAULT_MISSING_RUN_MIN,
            missing_run_extended_factor: constants::DEFAULT_MISSING_RUN_EXTENDED_FACTOR,
            stuck_run_min: constants::DEFAULT_STUCK_RUN_MIN,
            default_ranges,
            column_ranges: Vec::new(),
            discrete_columns: constants::DEFAULT_DISCRETE_COLUMNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl CheckConfig {
    /// Run length at which MISSING_RUN escalates from Warn to Error.
    pub fn missing_run_extended(&self) -> usize {
        self.missing_run_min
            .saturating_mul(self.missing_run_extended_factor)
    }
}

/// Parse a sampling interval such as `"15min"`, `"30s"`, `"1h"` or `"2 days"`.
pub fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
    let re = Regex::new(r"^\s*(\d+)\s*([A-Za-z]+)\s*$").map_err(|_| {
        ConfigError::InvalidInterval {
            value: text.to_string(),
        }
    })?;
    let invalid = || ConfigError::InvalidInterval {
        value: text.to_string(),
    };

    let caps = re.captures(text).ok_or_else(invalid)?;
    let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_secs: i64 = match caps[2].to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        _ => return Err(invalid()),
    };

    if amount == 0 {
        return Err(ConfigError::NonPositive {
            field: "sampling_interval".to_string(),
            value: text.trim().to_string(),
        });
    }

    amount
        .checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

// =============================================================================
// Engine
// =============================================================================

/// Validated check configuration with compiled column patterns.
#[derive(Debug, Clone)]
pub struct CheckEngine {
    config: CheckConfig,
    range_patterns: Vec<(glob::Pattern, ValueRange)>,
    discrete_patterns: Vec<glob::Pattern>,
}

impl CheckEngine {
    /// Validate `config` and compile its column patterns.
    pub fn new(config: CheckConfig) -> Result<Self, ConfigError> {
        if config.sampling_interval <= Duration::zero() {
            return Err(ConfigError::NonPositive {
                field: "sampling_interval".to_string(),
                value: format_duration(config.sampling_interval),
            });
        }
        if !(config.gap_tolerance > 0.0 && config.gap_tolerance.is_finite()) {
            return Err(ConfigError::NonPositive {
                field: "gap_tolerance".to_string(),
                value: config.gap_tolerance.to_string(),
            });
        }
        for (field, value) in [
            ("missing_run_min", config.missing_run_min),
            (
                "missing_run_extended_factor",
                config.missing_run_extended_factor,
            ),
            ("stuck_run_min", config.stuck_run_min),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        for (aggregation, range) in &config.default_ranges {
            check_range(&format!("default_ranges.{}", aggregation.label()), range)?;
        }

        let mut range_patterns = Vec::with_capacity(config.column_ranges.len());
        for (pattern, range) in &config.column_ranges {
            check_range(&format!("column_ranges '{pattern}'"), range)?;
            range_patterns.push((compile_pattern(pattern)?, *range));
        }

        let discrete_patterns = config
            .discrete_columns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            interval = %format_duration(config.sampling_interval),
            gap_tolerance = config.gap_tolerance,
            column_ranges = range_patterns.len(),
            discrete_patterns = discrete_patterns.len(),
            "Check engine configured"
        );

        Ok(Self {
            config,
            range_patterns,
            discrete_patterns,
        })
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Same engine with a different nominal sampling interval, as used for
    /// sites whose profile declares their own. Non-positive intervals are
    /// rejected.
    pub fn with_sampling_interval(&self, interval: Duration) -> Result<Self, ConfigError> {
        if interval <= Duration::zero() {
            return Err(ConfigError::NonPositive {
                field: "sampling_interval".to_string(),
                value: format_duration(interval),
            });
        }
        let mut engine = self.clone();
        engine.config.sampling_interval = interval;
        Ok(engine)
    }

    /// Run every check with no operator overrides.
    pub fn run(&self, dataset: &ParsedDataset) -> Vec<Anomaly> {
        self.run_with_overrides(dataset, &BTreeMap::new())
    }

    /// Run every check, honouring per-column expected-range and discrete
    /// overrides. Pure and deterministic: identical inputs always yield an
    /// identical, identically ordered list.
    pub fn run_with_overrides(
        &self,
        dataset: &ParsedDataset,
        overrides: &BTreeMap<usize, ColumnMetadataOverride>,
    ) -> Vec<Anomaly> {
        let mut anomalies = self.check_timestamps(dataset);

        let per_column: Vec<Anomaly> = (0..dataset.column_count())
            .into_par_iter()
            .flat_map_iter(|index| {
                let values: Vec<Value> = dataset.column_values(index).collect();
                self.check_column(dataset, index, &values, overrides.get(&index))
            })
            .collect();
        anomalies.extend(per_column);

        anomalies.sort_by_key(Anomaly::sort_key);

        tracing::debug!(
            site = %dataset.site_id,
            rows = dataset.row_count(),
            anomalies = anomalies.len(),
            errors = anomalies.iter().filter(|a| a.severity == Severity::Error).count(),
            "Checks complete"
        );

        anomalies
    }

    /// Range used for OUT_OF_RANGE on `column`: operator override, then the
    /// first matching column pattern, then the aggregation default.
    pub fn effective_range(
        &self,
        column: &ColumnDef,
        column_override: Option<&ColumnMetadataOverride>,
    ) -> Option<ValueRange> {
        if let Some(range) = column_override.and_then(|o| o.expected_range) {
            return Some(range);
        }
        if let Some((_, range)) = self
            .range_patterns
            .iter()
            .find(|(pattern, _)| pattern.matches(&column.name))
        {
            return Some(*range);
        }
        self.config.default_ranges.get(&column.aggregation).copied()
    }

    /// True when the column is exempt from STUCK_VALUE.
    pub fn is_discrete(
        &self,
        column: &ColumnDef,
        column_override: Option<&ColumnMetadataOverride>,
    ) -> bool {
        match column_override.and_then(|o| o.discrete) {
            Some(flag) => flag,
            None => self
                .discrete_patterns
                .iter()
                .any(|p| p.matches(&column.name)),
        }
    }

    // -------------------------------------------------------------------------
    // Whole-record checks
    // -------------------------------------------------------------------------

    /// NON_MONOTONIC_TIME, GAP and DUPLICATE_TIMESTAMP over the time axis.
    ///
    /// Both ordering and gap checks compare against the high-water mark (the
    /// latest timestamp seen so far), so a backwards jump is reported once and
    /// the recovery after it is not mistaken for a gap. A row that lands back
    /// on the high-water timestamp without being adjacent to it belongs to the
    /// backwards run; adjacent equal rows are duplicates.
    fn check_timestamps(&self, dataset: &ParsedDataset) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let Some(first) = dataset.samples.first() else {
            return anomalies;
        };

        let interval_ms = self.config.sampling_interval.num_milliseconds() as f64;
        let gap_threshold_ms = interval_ms * self.config.gap_tolerance;

        let mut high_water = (first.timestamp, 0usize);
        let mut backwards_start: Option<usize> = None;

        for (i, row) in dataset.samples.iter().enumerate().skip(1) {
            let (hw_ts, hw_row) = high_water;
            let repeats_earlier =
                row.timestamp == hw_ts && dataset.samples[i - 1].timestamp != hw_ts;

            if row.timestamp < hw_ts || repeats_earlier {
                backwards_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = backwards_start.take() {
                anomalies.push(non_monotonic(dataset, start, i - 1, hw_ts));
            }

            if row.timestamp > hw_ts {
                let step = row.timestamp - hw_ts;
                let step_ms = step.num_milliseconds() as f64;
                if step_ms > gap_threshold_ms {
                    let expected_missing = ((step_ms / interval_ms).round() as i64 - 1).max(0);
                    anomalies.push(Anomaly::new(
                        AnomalyKind::Gap,
                        None,
                        RowRange::new(hw_row, i),
                        Severity::Warn,
                        format!(
                            "no samples for {} after {} (about {expected_missing} missing at {} interval)",
                            format_duration(step),
                            hw_ts.format(constants::EXPORT_TIMESTAMP_FORMAT),
                            format_duration(self.config.sampling_interval),
                        ),
                    ));
                }
                high_water = (row.timestamp, i);
            }
        }
        if let Some(start) = backwards_start {
            anomalies.push(non_monotonic(
                dataset,
                start,
                dataset.row_count() - 1,
                high_water.0,
            ));
        }

        anomalies.extend(duplicate_groups(dataset));
        anomalies
    }

    // -------------------------------------------------------------------------
    // Per-column checks
    // -------------------------------------------------------------------------

    fn check_column(
        &self,
        dataset: &ParsedDataset,
        index: usize,
        values: &[Value],
        column_override: Option<&ColumnMetadataOverride>,
    ) -> Vec<Anomaly> {
        let column = &dataset.columns[index];
        let mut anomalies = Vec::new();

        // MISSING_RUN
        let extended = self.config.missing_run_extended();
        for (start, end) in runs(values.iter().map(Value::is_missing)) {
            let len = end - start + 1;
            if len < self.config.missing_run_min {
                continue;
            }
            let severity = if len >= extended {
                Severity::Error
            } else {
                Severity::Warn
            };
            anomalies.push(Anomaly::new(
                AnomalyKind::MissingRun,
                Some(index),
                RowRange::new(start, end),
                severity,
                format!("{len} consecutive missing values"),
            ));
        }

        // OUT_OF_RANGE
        if let Some(range) = self.effective_range(column, column_override) {
            let outside = values
                .iter()
                .map(|v| v.as_number().is_some_and(|x| !range.contains(x)));
            for (start, end) in runs(outside) {
                let (lo, hi) = values[start..=end]
                    .iter()
                    .filter_map(Value::as_number)
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                        (lo.min(x), hi.max(x))
                    });
                let len = end - start + 1;
                let summary = if len == 1 {
                    format!("value {lo} outside {range}")
                } else {
                    format!("{len} values outside {range} (lowest {lo}, highest {hi})")
                };
                anomalies.push(Anomaly::new(
                    AnomalyKind::OutOfRange,
                    Some(index),
                    RowRange::new(start, end),
                    Severity::Error,
                    summary,
                ));
            }
        }

        // STUCK_VALUE
        if !self.is_discrete(column, column_override) {
            for (start, end, value) in identical_runs(values) {
                let len = end - start + 1;
                if len >= self.config.stuck_run_min {
                    anomalies.push(Anomaly::new(
                        AnomalyKind::StuckValue,
                        Some(index),
                        RowRange::new(start, end),
                        Severity::Warn,
                        format!("value {value} repeated {len} times"),
                    ));
                }
            }
        }

        anomalies
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn non_monotonic(
    dataset: &ParsedDataset,
    start: usize,
    end: usize,
    high_water: chrono::NaiveDateTime,
) -> Anomaly {
    let len = end - start + 1;
    let first = dataset.samples[start].timestamp;
    Anomaly::new(
        AnomalyKind::NonMonotonicTime,
        None,
        RowRange::new(start, end),
        Severity::Error,
        format!(
            "{len} row(s) from {} are not later than {}",
            first.format(constants::EXPORT_TIMESTAMP_FORMAT),
            high_water.format(constants::EXPORT_TIMESTAMP_FORMAT),
        ),
    )
}

/// One DUPLICATE_TIMESTAMP per group of consecutive equal timestamps.
fn duplicate_groups(dataset: &ParsedDataset) -> Vec<Anomaly> {
    let samples = &dataset.samples;
    let same_as_previous = (0..samples.len())
        .map(|i| i > 0 && samples[i].timestamp == samples[i - 1].timestamp);

    runs(same_as_previous)
        .into_iter()
        .map(|(first_repeat, end)| {
            let start = first_repeat - 1;
            let group = &samples[start..=end];
            let identical = group.iter().all(|r| r.values == group[0].values);
            Anomaly::new(
                AnomalyKind::DuplicateTimestamp,
                None,
                RowRange::new(start, end),
                Severity::Warn,
                format!(
                    "{} rows share timestamp {} ({})",
                    group.len(),
                    group[0].timestamp.format(constants::EXPORT_TIMESTAMP_FORMAT),
                    if identical {
                        "identical values"
                    } else {
                        "conflicting values"
                    }
                ),
            )
        })
        .collect()
}

/// Inclusive (start, end) index pairs of each maximal run of `true`.
fn runs(flags: impl Iterator<Item = bool>) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut current: Option<usize> = None;
    let mut last = 0usize;

    for (i, flag) in flags.enumerate() {
        last = i;
        match (flag, current) {
            (true, None) => current = Some(i),
            (false, Some(start)) => {
                out.push((start, i - 1));
                current = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        out.push((start, last));
    }
    out
}

/// Maximal runs of bit-identical numbers. Missing values break a run.
fn identical_runs(values: &[Value]) -> Vec<(usize, usize, f64)> {
    let mut out = Vec::new();
    let mut current: Option<(usize, f64)> = None;

    for (i, value) in values.iter().enumerate() {
        match (value.as_number(), current) {
            (Some(x), Some((_, y))) if x.to_bits() == y.to_bits() => {}
            (next, Some((start, y))) => {
                out.push((start, i - 1, y));
                current = next.map(|x| (i, x));
            }
            (next, None) => current = next.map(|x| (i, x)),
        }
    }
    if let Some((start, y)) = current {
        out.push((start, values.len() - 1, y));
    }
    out
}

fn compile_pattern(pattern: &str) -> Result<glob::Pattern, ConfigError> {
    glob::Pattern::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn check_range(field: &str, range: &ValueRange) -> Result<(), ConfigError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange {
            field: field.to_string(),
            min: range.min,
            max: range.max,
        })
    }
}

/// Compact human form such as `40m`, `1h 30m` or `2d 4h`.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    if total <= 0 {
        return format!("{total}s");
    }
    let parts = [
        (total / 86_400, "d"),
        ((total % 86_400) / 3_600, "h"),
        ((total % 3_600) / 60, "m"),
        (total % 60, "s"),
    ];
    parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}
