// SensorIngest - core/export.rs
//
// CSV and JSON renditions of a composed artifact.
// Core layer: writes to any Write implementation; choosing files and
// directories is the platform layer's job.

use crate::core::model::{Artifact, Table};
use crate::util::error::ExportError;
use std::io::Write;

/// Write one table as CSV: the header row, then one record per table row.
///
/// `Cell::Empty` is written as `empty` (the NA representation for the data
/// table, an empty string elsewhere). Returns the number of data rows written.
pub fn write_table_csv<W: Write>(
    table: &Table,
    writer: W,
    empty: &str,
) -> Result<usize, ExportError> {
    let csv_err = |source| ExportError::Csv {
        table: table.name.clone(),
        source,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(&table.header).map_err(csv_err)?;

    for row in &table.rows {
        csv_writer
            .write_record(row.iter().map(|cell| cell.render(empty)))
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ExportError::Csv {
        table: table.name.clone(),
        source: e.into(),
    })?;

    tracing::debug!(table = %table.name, rows = table.rows.len(), "CSV table written");
    Ok(table.rows.len())
}

/// Write the whole artifact as one pretty-printed JSON document.
pub fn write_artifact_json<W: Write>(artifact: &Artifact, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, artifact).map_err(|e| ExportError::Json { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Cell;
    use chrono::NaiveDate;

    fn table(name: &str) -> Table {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 15, 0)
            .unwrap();
        Table {
            name: name.to_string(),
            header: vec!["TIMESTAMP".into(), "AirTemp (Deg C)".into(), "Note".into()],
            rows: vec![
                vec![Cell::Timestamp(ts), Cell::Number(12.5), Cell::text("a, b")],
                vec![Cell::Timestamp(ts), Cell::Empty, Cell::Empty],
            ],
        }
    }

    #[test]
    fn test_csv_table_renders_cells() {
        let mut buf = Vec::new();
        let count = write_table_csv(&table("Data"), &mut buf, "#N/A").unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "TIMESTAMP,AirTemp (Deg C),Note");
        assert_eq!(lines[1], "2024-01-01 00:15:00,12.5,\"a, b\"");
        assert_eq!(lines[2], "2024-01-01 00:15:00,#N/A,#N/A");
    }

    #[test]
    fn test_csv_empty_string_for_non_data_tables() {
        let mut buf = Vec::new();
        write_table_csv(&table("Notes"), &mut buf, "").unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.lines().nth(2).unwrap().ends_with(",,"));
    }

    #[test]
    fn test_json_artifact() {
        let artifact = Artifact {
            data: table("Data"),
            metadata: table("Columns"),
            notes: table("Notes"),
        };
        let mut buf = Vec::new();
        write_artifact_json(&artifact, &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["data"]["name"], "Data");
        assert_eq!(value["data"]["rows"][0][1], 12.5);
        assert!(value["data"]["rows"][1][1].is_null());
        assert_eq!(value["notes"]["header"][0], "TIMESTAMP");
    }
}
