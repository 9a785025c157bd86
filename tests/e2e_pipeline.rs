// SensorIngest - tests/e2e_pipeline.rs
//
// End-to-end tests for the ingest pipeline.
//
// These tests exercise the real filesystem, real TOA5 fixture files, the
// real check engine and real artifact writing: raw logger file on disk ->
// checked session -> operator review -> CSV/JSON artifact in a temp dir.

use sensoringest::app::ingest::{ingest_file, ingest_paths};
use sensoringest::core::checks::{CheckConfig, CheckEngine};
use sensoringest::core::discovery::DiscoveryConfig;
use sensoringest::core::model::{
    ColumnMetadataOverride, Disposition, SessionStatus, Severity, ValueRange,
};
use sensoringest::core::parser::ParseConfig;
use sensoringest::core::site::SiteCatalog;
use sensoringest::platform;
use sensoringest::util::error::{FormatError, IngestError, ParseError, RowError, SessionError};
use std::fs;
use std::path::PathBuf;

// =============================================================================
// Helpers
// =============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn fixture(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

fn default_engine() -> CheckEngine {
    CheckEngine::new(CheckConfig::default()).unwrap()
}

fn ids(session: &sensoringest::app::session::SessionModel) -> Vec<String> {
    session
        .anomalies()
        .iter()
        .map(|a| a.id.as_str().to_string())
        .collect()
}

// =============================================================================
// Clean file
// =============================================================================

#[test]
fn e2e_clean_file_exports_without_review_input() {
    let mut session = ingest_file(
        &fixture("ridge_clean.dat"),
        &ParseConfig::default(),
        &default_engine(),
        &SiteCatalog::default(),
    )
    .unwrap();

    let dataset = session.dataset();
    assert_eq!(dataset.site_id, "Pepperwood Ridge");
    assert_eq!(dataset.row_count(), 8);
    assert_eq!(dataset.column_count(), 4);
    assert!(dataset.is_clean());
    assert_eq!(dataset.logger_metadata["logger_model"], "CR1000X");
    assert_eq!(dataset.logger_metadata["table_name"], "Met15");
    assert!(session.anomalies().is_empty(), "{:?}", ids(&session));

    assert_eq!(session.status(), SessionStatus::Checked);
    session.confirm_review().unwrap();
    let artifact = session.export().unwrap();
    assert_eq!(session.status(), SessionStatus::Exported);

    let out = tempfile::tempdir().unwrap();
    platform::fs::write_artifact(out.path(), "ridge_clean", &artifact, "#N/A").unwrap();

    let data = fs::read_to_string(out.path().join("ridge_clean.data.csv")).unwrap();
    let mut lines = data.lines();
    assert_eq!(
        lines.next().unwrap(),
        "TIMESTAMP,RECORD (RN),AirTemp_Avg (Deg C),RH (%),Rain_Tot (mm)"
    );
    assert_eq!(lines.next().unwrap(), "2024-05-01 00:00:00,0,11.42,81.3,0");
    assert_eq!(data.lines().count(), 9);

    let columns = fs::read_to_string(out.path().join("ridge_clean.columns.csv")).unwrap();
    assert!(columns.starts_with("Name,Display Name,Units,Aggregation,Expected Range,Discrete,Notes"));
    assert!(columns.contains("RECORD,RECORD,RN,Other,,yes,"));
    assert!(columns.contains("Rain_Tot,Rain_Tot,mm,Total,\"[0, 1000000000]\",no,"));
    assert!(columns.contains("Pepperwood Ridge,,,Site,"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("ridge_clean.json")).unwrap())
            .unwrap();
    assert_eq!(json["notes"]["rows"].as_array().unwrap().len(), 0);
}

// =============================================================================
// Defective file
// =============================================================================

#[test]
fn e2e_defects_are_located_and_ordered() {
    let session = ingest_file(
        &fixture("creek_defects.dat"),
        &ParseConfig::default(),
        &default_engine(),
        &SiteCatalog::default(),
    )
    .unwrap();

    let dataset = session.dataset();
    assert_eq!(dataset.row_count(), 13);
    assert_eq!(dataset.skipped_row_count, 1);
    assert_eq!(dataset.logger_metadata["skipped_row_count"], "1");
    assert!(matches!(
        dataset.row_errors[0],
        RowError::FieldCount {
            line_number: 8,
            expected: 5,
            found: 3
        }
    ));

    assert_eq!(
        ids(&session),
        [
            "GAP/all/r2",
            "MISSING_RUN/c1/r4",
            "OUT_OF_RANGE/c2/r7",
            "STUCK_VALUE/c3/r7",
            "DUPLICATE_TIMESTAMP/all/r8",
            "NON_MONOTONIC_TIME/all/r11",
        ]
    );
    let errors: Vec<_> = session
        .anomalies()
        .iter()
        .filter(|a| a.severity == Severity::Error)
        .map(|a| a.id.as_str())
        .collect();
    assert_eq!(errors, ["OUT_OF_RANGE/c2/r7", "NON_MONOTONIC_TIME/all/r11"]);
    assert_eq!(session.pending_errors(), 2);

    let gap = &session.anomalies()[0];
    assert!(gap.detail.contains("1h"), "{}", gap.detail);
    assert!(gap.detail.contains("about 3 missing"), "{}", gap.detail);
    assert!(session.anomalies()[4].detail.contains("conflicting"));
}

#[test]
fn e2e_review_gates_export_and_notes_carry_annotations() {
    let mut session = ingest_file(
        &fixture("creek_defects.dat"),
        &ParseConfig::default(),
        &default_engine(),
        &SiteCatalog::default(),
    )
    .unwrap();

    assert!(matches!(
        session.export(),
        Err(SessionError::NotReady {
            pending_errors: 2,
            ..
        })
    ));

    let error_ids: Vec<_> = session
        .anomalies()
        .iter()
        .filter(|a| a.severity == Severity::Error)
        .map(|a| a.id.clone())
        .collect();
    session
        .set_annotation(&error_ids[0], Disposition::DataCorrected, "spike removed upstream")
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Checked);
    session
        .set_annotation(&error_ids[1], Disposition::Acknowledged, "clock reset")
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Reviewed);

    let artifact = session.export().unwrap();
    let out = tempfile::tempdir().unwrap();
    platform::fs::write_artifact(out.path(), "creek", &artifact, "#N/A").unwrap();

    let data = fs::read_to_string(out.path().join("creek.data.csv")).unwrap();
    let row4 = data.lines().nth(5).unwrap();
    assert_eq!(row4, "2024-05-01 01:45:00,5,#N/A,0.54,12.4");

    let notes = fs::read_to_string(out.path().join("creek.notes.csv")).unwrap();
    let lines: Vec<&str> = notes.lines().collect();
    assert_eq!(
        lines[0],
        "Anomaly ID,Kind,Column,Start,End,Rows,Severity,Disposition,Comment,Detail"
    );
    assert_eq!(lines.len(), 7);
    assert!(lines[1].starts_with("GAP/all/r2,GAP,All,2024-05-01 00:30:00,2024-05-01 01:30:00,2-3,WARN,Unreviewed,,"));
    assert!(lines[3].starts_with("OUT_OF_RANGE/c2/r7,OUT_OF_RANGE,Stage,"));
    assert!(lines[3].contains("Data corrected,spike removed upstream"));
    assert!(lines[6].contains("Acknowledged,clock reset"));
}

#[test]
fn e2e_range_override_and_recheck_preserves_annotations() {
    let mut session = ingest_file(
        &fixture("creek_defects.dat"),
        &ParseConfig::default(),
        &default_engine(),
        &SiteCatalog::default(),
    )
    .unwrap();

    let stuck = session
        .anomalies()
        .iter()
        .find(|a| a.id.as_str() == "STUCK_VALUE/c3/r7")
        .map(|a| a.id.clone())
        .unwrap();
    session
        .set_annotation(&stuck, Disposition::FalsePositive, "regulated supply")
        .unwrap();

    session
        .set_column_metadata(
            2,
            ColumnMetadataOverride {
                display_name: Some("Stage height".to_string()),
                expected_range: Some(ValueRange::new(0.0, 100_000.0)),
                notes: Some("pressure transducer".to_string()),
                discrete: None,
            },
        )
        .unwrap();
    assert!(session.checks_stale());

    session.run_checks();
    assert!(!ids(&session).contains(&"OUT_OF_RANGE/c2/r7".to_string()));
    assert_eq!(session.pending_errors(), 1);

    let kept = session.annotation(&stuck).unwrap();
    assert_eq!(kept.disposition, Disposition::FalsePositive);
    assert_eq!(kept.comment, "regulated supply");
}

// =============================================================================
// Strict mode, batch and config
// =============================================================================

#[test]
fn e2e_strict_mode_rejects_malformed_row() {
    let config = ParseConfig {
        strict: true,
        ..ParseConfig::default()
    };
    let err = ingest_file(
        &fixture("creek_defects.dat"),
        &config,
        &default_engine(),
        &SiteCatalog::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Parse(ParseError::Row(RowError::FieldCount { line_number: 8, .. }))
    ));
}

#[test]
fn e2e_batch_over_fixture_directory() {
    let report = ingest_paths(
        &[fixtures_dir()],
        &DiscoveryConfig::default(),
        &ParseConfig::default(),
        &default_engine(),
        &SiteCatalog::default(),
    );

    let names: Vec<_> = report
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["creek_defects.dat", "ridge_clean.dat"]);

    assert!(report.has_failures());
    assert_eq!(report.failures.len(), 1);
    let (path, err) = &report.failures[0];
    assert!(path.ends_with("meadow_tob1.dat"));
    match err {
        IngestError::Parse(ParseError::Format(FormatError::UnsupportedFormat { tag, fragment })) => {
            assert_eq!(tag, "TOB1");
            assert!(fragment.starts_with("\"TOB1\",\"Meadow\""));
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn e2e_config_file_drives_checks() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[checks]
stuck_run_min = 20
discrete_columns = ["RECORD", "BattV*"]

[[checks.column_ranges]]
pattern = "Stage"
min = 0
max = 1000000
"#,
    )
    .unwrap();

    let (config, warnings) = platform::config::load_config(&config_path).unwrap();
    assert!(warnings.is_empty());
    let engine = CheckEngine::new(config.checks).unwrap();

    let session = ingest_file(
        &fixture("creek_defects.dat"),
        &config.parse,
        &engine,
        &config.sites,
    )
    .unwrap();
    assert_eq!(
        ids(&session),
        [
            "GAP/all/r2",
            "MISSING_RUN/c1/r4",
            "DUPLICATE_TIMESTAMP/all/r8",
            "NON_MONOTONIC_TIME/all/r11",
        ]
    );
}

#[test]
fn e2e_site_profile_renames_columns_and_sets_interval() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[[sites]]
site_id = "austin_creek"
sampling_interval = "45min"

[sites.display_names]
Stage = "Stage height"

[sites.metadata]
watershed = "Russian River"
"#,
    )
    .unwrap();

    let (config, _) = platform::config::load_config(&config_path).unwrap();
    let engine = CheckEngine::new(config.checks).unwrap();
    let report = ingest_paths(
        &[fixture("creek_defects.dat")],
        &config.discovery,
        &config.parse,
        &engine,
        &config.sites,
    );
    assert!(!report.has_failures());
    let mut session = report.files.into_iter().next().unwrap().session;

    // One hour without samples is within tolerance at a 45 minute interval.
    assert!(!ids(&session).contains(&"GAP/all/r2".to_string()));
    assert_eq!(session.display_name(2), "Stage height");

    let error_ids: Vec<_> = session
        .anomalies()
        .iter()
        .filter(|a| a.severity == Severity::Error)
        .map(|a| a.id.clone())
        .collect();
    for id in &error_ids {
        session
            .set_annotation(id, Disposition::Acknowledged, "")
            .unwrap();
    }
    let artifact = session.export().unwrap();
    let out = tempfile::tempdir().unwrap();
    platform::fs::write_artifact(out.path(), "creek", &artifact, "#N/A").unwrap();

    let data = fs::read_to_string(out.path().join("creek.data.csv")).unwrap();
    assert!(data.lines().next().unwrap().contains("Stage height (m)"));
    let columns = fs::read_to_string(out.path().join("creek.columns.csv")).unwrap();
    assert!(columns.contains("Stage,Stage height,m,"));
    assert!(columns.contains("watershed=Russian River"));
}
