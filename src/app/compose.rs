// SensorIngest - app/compose.rs
//
// Projects a reviewed session into the three-table export artifact:
//   Data     one row per sample, columns in file order
//   Columns  one row per column, then a site row with the logger metadata
//   Notes    one row per anomaly, in anomaly order
//
// Pure: composing the same session twice yields identical tables.

use crate::app::session::SessionModel;
use crate::core::model::{Artifact, Cell, Table, Value};
use crate::util::constants;

pub const COLUMNS_HEADER: [&str; 7] = [
    "Name",
    "Display Name",
    "Units",
    "Aggregation",
    "Expected Range",
    "Discrete",
    "Notes",
];

pub const NOTES_HEADER: [&str; 10] = [
    "Anomaly ID",
    "Kind",
    "Column",
    "Start",
    "End",
    "Rows",
    "Severity",
    "Disposition",
    "Comment",
    "Detail",
];

/// Build the artifact for `session`. Does not check the session status;
/// `SessionModel::export` is the gated entry point.
pub fn compose(session: &SessionModel) -> Artifact {
    Artifact {
        data: data_table(session),
        metadata: metadata_table(session),
        notes: notes_table(session),
    }
}

fn data_table(session: &SessionModel) -> Table {
    let dataset = session.dataset();

    let mut header = Vec::with_capacity(dataset.column_count() + 1);
    header.push(dataset.timestamp_column.clone());
    for (i, column) in dataset.columns.iter().enumerate() {
        let display = session.display_name(i);
        header.push(if column.unit.is_empty() {
            display.to_string()
        } else {
            format!("{display} ({})", column.unit)
        });
    }

    let rows = dataset
        .samples
        .iter()
        .map(|row| {
            std::iter::once(Cell::Timestamp(row.timestamp))
                .chain(row.values.iter().map(|v| match v {
                    Value::Number(x) => Cell::Number(*x),
                    Value::Missing => Cell::Empty,
                }))
                .collect()
        })
        .collect();

    Table {
        name: constants::SHEET_DATA.to_string(),
        header,
        rows,
    }
}

fn metadata_table(session: &SessionModel) -> Table {
    let dataset = session.dataset();
    let engine = session.engine();

    let mut rows: Vec<Vec<Cell>> = dataset
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let column_override = session.column_override(i);
            let range = engine
                .effective_range(column, column_override)
                .map_or(Cell::Empty, |r| Cell::text(r.to_string()));
            let discrete = if engine.is_discrete(column, column_override) {
                "yes"
            } else {
                "no"
            };
            let notes = column_override
                .and_then(|o| o.notes.as_deref())
                .map_or(Cell::Empty, Cell::text);
            vec![
                Cell::text(&column.name),
                Cell::text(session.display_name(i)),
                text_or_empty(&column.unit),
                Cell::text(column.aggregation.label()),
                range,
                Cell::text(discrete),
                notes,
            ]
        })
        .collect();

    let site_notes = dataset
        .logger_metadata
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    rows.push(vec![
        Cell::text(&dataset.site_id),
        Cell::Empty,
        Cell::Empty,
        Cell::text("Site"),
        Cell::Empty,
        Cell::Empty,
        text_or_empty(&site_notes),
    ]);

    Table {
        name: constants::SHEET_COLUMNS.to_string(),
        header: COLUMNS_HEADER.iter().map(|s| (*s).to_string()).collect(),
        rows,
    }
}

fn notes_table(session: &SessionModel) -> Table {
    let dataset = session.dataset();

    let rows = session
        .anomalies()
        .iter()
        .map(|anomaly| {
            let column = match anomaly.column_index {
                Some(i) => session.display_name(i).to_string(),
                None => constants::ALL_COLUMNS_LABEL.to_string(),
            };
            let timestamp = |row| dataset.timestamp_at(row).map_or(Cell::Empty, Cell::Timestamp);
            let (disposition, comment) = match session.annotation(&anomaly.id) {
                Some(a) => (a.disposition.label(), text_or_empty(&a.comment)),
                None => ("Unreviewed", Cell::Empty),
            };
            vec![
                Cell::text(anomaly.id.as_str()),
                Cell::text(anomaly.kind.code()),
                Cell::text(column),
                timestamp(anomaly.row_range.start),
                timestamp(anomaly.row_range.end),
                Cell::text(anomaly.row_range.to_string()),
                Cell::text(anomaly.severity.label()),
                Cell::text(disposition),
                comment,
                Cell::text(&anomaly.detail),
            ]
        })
        .collect();

    Table {
        name: constants::SHEET_NOTES.to_string(),
        header: NOTES_HEADER.iter().map(|s| (*s).to_string()).collect(),
        rows,
    }
}

fn text_or_empty(s: &str) -> Cell {
    if s.is_empty() {
        Cell::Empty
    } else {
        Cell::text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checks::{CheckConfig, CheckEngine};
    use crate::core::model::{
        Aggregation, AnomalyKind, ColumnDef, ColumnMetadataOverride, Disposition, ParsedDataset,
        Row, SessionStatus,
    };
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn session() -> SessionModel {
        let base = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let minutes = [0, 15, 60];
        let dataset = ParsedDataset {
            site_id: "Creek".to_string(),
            logger_metadata: BTreeMap::from([
                ("logger_model".to_string(), "CR300".to_string()),
                ("skipped_row_count".to_string(), "0".to_string()),
            ]),
            timestamp_column: "TIMESTAMP".to_string(),
            columns: vec![
                ColumnDef {
                    name: "Stage".to_string(),
                    unit: "m".to_string(),
                    aggregation: Aggregation::Average,
                },
                ColumnDef {
                    name: "Flag".to_string(),
                    unit: String::new(),
                    aggregation: Aggregation::Other,
                },
            ],
            samples: minutes
                .iter()
                .enumerate()
                .map(|(i, m)| Row {
                    timestamp: base + Duration::minutes(*m),
                    values: vec![
                        Value::Number(1.25 + i as f64),
                        if i == 1 { Value::Missing } else { Value::Number(0.0) },
                    ],
                })
                .collect(),
            skipped_row_count: 0,
            row_errors: Vec::new(),
        };
        SessionModel::open(dataset, CheckEngine::new(CheckConfig::default()).unwrap())
    }

    #[test]
    fn test_data_table_headers_and_cells() {
        let mut s = session();
        s.set_column_metadata(
            0,
            ColumnMetadataOverride {
                display_name: Some("Water stage".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let artifact = compose(&s);
        assert_eq!(artifact.data.name, "Data");
        assert_eq!(artifact.data.header, ["TIMESTAMP", "Water stage (m)", "Flag"]);
        assert_eq!(artifact.data.rows.len(), 3);
        assert_eq!(artifact.data.rows[0][1], Cell::Number(1.25));
        assert_eq!(artifact.data.rows[1][2], Cell::Empty);
    }

    #[test]
    fn test_metadata_table_has_site_row() {
        let artifact = compose(&session());
        let meta = &artifact.metadata;
        assert_eq!(meta.header, COLUMNS_HEADER);
        assert_eq!(meta.rows.len(), 3);

        assert_eq!(meta.rows[0][0], Cell::text("Stage"));
        assert_eq!(meta.rows[0][3], Cell::text("Average"));
        assert_eq!(meta.rows[0][4], Cell::text("[-10000, 10000]"));
        assert_eq!(meta.rows[1][4], Cell::Empty);

        let site = &meta.rows[2];
        assert_eq!(site[0], Cell::text("Creek"));
        assert_eq!(site[3], Cell::text("Site"));
        assert_eq!(
            site[6],
            Cell::text("logger_model=CR300; skipped_row_count=0")
        );
    }

    #[test]
    fn test_notes_table_follows_anomaly_order() {
        let mut s = session();
        let gap = s
            .anomalies()
            .iter()
            .find(|a| a.kind == AnomalyKind::Gap)
            .map(|a| a.id.clone())
            .unwrap();
        s.set_annotation(&gap, Disposition::Acknowledged, "logger offline")
            .unwrap();

        let artifact = compose(&s);
        let notes = &artifact.notes;
        assert_eq!(notes.header, NOTES_HEADER);
        assert_eq!(notes.rows.len(), s.anomalies().len());

        let row = &notes.rows[0];
        assert_eq!(row[0], Cell::text("GAP/all/r1"));
        assert_eq!(row[2], Cell::text("All"));
        assert_eq!(row[5], Cell::text("1-2"));
        assert_eq!(row[7], Cell::text("Acknowledged"));
        assert_eq!(row[8], Cell::text("logger offline"));
    }

    #[test]
    fn test_compose_is_repeatable() {
        let s = session();
        assert_eq!(compose(&s), compose(&s));
    }

    #[test]
    fn test_column_order_ignores_annotation_order() {
        let base = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let temp = [
            Value::Missing,
            Value::Missing,
            Value::Missing,
            Value::Number(20.0),
            Value::Number(21.0),
            Value::Number(22.0),
        ];
        let humidity = [50.0, 51.0, 52.0, 53.0, 20_000.0, 54.0];
        let dataset = ParsedDataset {
            site_id: "Meadow".to_string(),
            logger_metadata: BTreeMap::new(),
            timestamp_column: "TIMESTAMP".to_string(),
            columns: vec![
                ColumnDef {
                    name: "Temp".to_string(),
                    unit: "Deg C".to_string(),
                    aggregation: Aggregation::Sample,
                },
                ColumnDef {
                    name: "Humidity".to_string(),
                    unit: "%".to_string(),
                    aggregation: Aggregation::Sample,
                },
            ],
            samples: (0..6)
                .map(|i| Row {
                    timestamp: base + Duration::minutes(15 * i as i64),
                    values: vec![temp[i], Value::Number(humidity[i])],
                })
                .collect(),
            skipped_row_count: 0,
            row_errors: Vec::new(),
        };
        let mut s = SessionModel::open(dataset, CheckEngine::new(CheckConfig::default()).unwrap());
        assert_eq!(s.anomalies().len(), 2);

        let ids: Vec<_> = s.anomalies().iter().rev().map(|a| a.id.clone()).collect();
        for id in &ids {
            s.set_annotation(id, Disposition::Acknowledged, "checked on site")
                .unwrap();
        }
        assert_eq!(s.status(), SessionStatus::Reviewed);

        let artifact = s.export().unwrap();
        assert_eq!(
            artifact.data.header,
            ["TIMESTAMP", "Temp (Deg C)", "Humidity (%)"]
        );
        assert_eq!(artifact.data.rows[4][2], Cell::Number(20_000.0));
        assert_eq!(artifact.metadata.rows[0][0], Cell::text("Temp"));
        assert_eq!(artifact.metadata.rows[1][0], Cell::text("Humidity"));
        assert_eq!(artifact.notes.rows[0][2], Cell::text("Temp"));
        assert_eq!(artifact.notes.rows[1][2], Cell::text("Humidity"));
    }
}
