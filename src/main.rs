// SensorIngest - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Batch ingest of the given files/directories
// 4. Anomaly report on stdout, optional artifact export

use sensoringest::app::ingest::{self, IngestedFile};
use sensoringest::core::checks::CheckEngine;
use sensoringest::core::model::{Disposition, Severity};
use sensoringest::platform;
use sensoringest::util;

use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// SensorIngest - ingest, sanity-check and annotate data logger files.
///
/// Point SensorIngest at TOA5 files or directories containing them. Each file
/// is parsed, checked and reported; with --out-dir, reviewed files are
/// exported as CSV tables plus a JSON rendition.
#[derive(Parser, Debug)]
#[command(name = "sensoringest", version, about)]
struct Cli {
    /// Logger files or directories to ingest.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Configuration file (defaults to the platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Write the enriched artifact for each reviewed file into this directory.
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Abort a file on its first malformed data row.
    #[arg(long = "strict")]
    strict: bool,

    /// Acknowledge every error anomaly so files can be exported unattended.
    #[arg(long = "acknowledge-errors")]
    acknowledge_errors: bool,

    /// Print the anomaly report as JSON instead of text.
    #[arg(long = "json")]
    json: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

/// Exit code when configuration cannot be loaded.
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| platform::config::PlatformPaths::resolve().config_file());

    let (mut config, config_warnings) = match platform::config::load_config(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            util::logging::init(cli.debug, None, None);
            tracing::error!(error = %e, "Configuration rejected");
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    util::logging::init(
        cli.debug,
        config.log_level.as_deref(),
        config.log_file.as_deref(),
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        config = %config_path.display(),
        "SensorIngest starting"
    );

    if cli.strict {
        config.parse.strict = true;
    }

    let engine = match CheckEngine::new(config.checks.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let mut report = ingest::ingest_paths(
        &cli.paths,
        &config.discovery,
        &config.parse,
        &engine,
        &config.sites,
    );
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }

    if cli.acknowledge_errors {
        for file in &mut report.files {
            acknowledge_errors(file);
        }
    }
    // Clean files (or fully acknowledged ones) are reviewed without further input.
    let open_reviews = report.confirm_reviews();
    if open_reviews > 0 {
        tracing::info!(files = open_reviews, "Files awaiting operator review");
    }

    if cli.json {
        print_json(&report.files);
    } else {
        for file in &report.files {
            print_text(file);
        }
    }

    let mut failed = report.has_failures();

    if let Some(ref out_dir) = cli.out_dir {
        let mut used_stems = HashSet::new();
        for file in &mut report.files {
            if !file.session.can_export() {
                eprintln!(
                    "Not exported: {} ({} error anomalies need review)",
                    file.path.display(),
                    file.session.pending_errors()
                );
                continue;
            }
            let stem = unique_stem(&file.path, &mut used_stems);
            let result = file
                .session
                .export()
                .map_err(util::error::IngestError::from)
                .and_then(|artifact| {
                    platform::fs::write_artifact(
                        out_dir,
                        &stem,
                        &artifact,
                        &config.na_representation,
                    )
                    .map_err(Into::into)
                });
            match result {
                Ok(paths) => {
                    if !cli.json {
                        println!("Exported {} -> {}", file.path.display(), paths[0].display());
                    }
                }
                Err(e) => {
                    tracing::error!(file = %file.path.display(), error = %e, "Export failed");
                    eprintln!("Error: {}: {e}", file.path.display());
                    failed = true;
                }
            }
        }
    }

    for (path, err) in &report.failures {
        eprintln!("Error: {}: {err}", path.display());
    }

    tracing::info!(
        ingested = report.files.len(),
        failed = report.failures.len(),
        "SensorIngest finished"
    );

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn acknowledge_errors(file: &mut IngestedFile) {
    let ids: Vec<_> = file
        .session
        .anomalies()
        .iter()
        .filter(|a| a.severity == Severity::Error)
        .map(|a| a.id.clone())
        .collect();
    for id in ids {
        if let Err(e) = file.session.set_annotation(
            &id,
            Disposition::Acknowledged,
            "acknowledged in batch run",
        ) {
            tracing::warn!(anomaly = %id, error = %e, "Could not acknowledge anomaly");
        }
    }
}

fn print_text(file: &IngestedFile) {
    let session = &file.session;
    let dataset = session.dataset();
    println!(
        "{}: site '{}', {} rows, {} columns, {} skipped, {} anomalies ({})",
        file.path.display(),
        dataset.site_id,
        dataset.row_count(),
        dataset.column_count(),
        dataset.skipped_row_count,
        session.anomalies().len(),
        session.status(),
    );
    for error in &dataset.row_errors {
        println!("  skipped: {error}");
    }
    for anomaly in session.anomalies() {
        let column = match anomaly.column_index {
            Some(i) => session.display_name(i),
            None => util::constants::ALL_COLUMNS_LABEL,
        };
        let disposition = session
            .annotation(&anomaly.id)
            .map_or(Disposition::Unreviewed, |a| a.disposition);
        println!(
            "  [{:<5}] {:<28} {:<16} rows {:<10} {} [{}]",
            anomaly.severity.label(),
            anomaly.id.as_str(),
            column,
            anomaly.row_range.to_string(),
            anomaly.detail,
            disposition,
        );
    }
}

fn print_json(files: &[IngestedFile]) {
    let reports: Vec<serde_json::Value> = files
        .iter()
        .map(|file| {
            let session = &file.session;
            let dataset = session.dataset();
            serde_json::json!({
                "path": file.path.display().to_string(),
                "site_id": dataset.site_id,
                "rows": dataset.row_count(),
                "columns": dataset.column_count(),
                "skipped_row_count": dataset.skipped_row_count,
                "status": session.status(),
                "pending_errors": session.pending_errors(),
                "anomalies": session.anomalies(),
            })
        })
        .collect();
    match serde_json::to_string_pretty(&reports) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error: cannot render JSON report: {e}"),
    }
}

/// File stem for the artifact, suffixed when two inputs share a name.
fn unique_stem(path: &Path, used: &mut HashSet<String>) -> String {
    let base = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string();
    let mut stem = base.clone();
    let mut n = 2;
    while !used.insert(stem.clone()) {
        stem = format!("{base}-{n}");
        n += 1;
    }
    stem
}
