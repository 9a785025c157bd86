// SensorIngest - core/header.rs
//
// Two-phase header decode for TOA5 logger files.
//
//   Phase 1 (`HeaderSchema::decode`): the fixed four-row header schema.
//     Row 1  station row: format tag, station name, logger model/serial, ...
//     Row 2  column names
//     Row 3  physical units
//     Row 4  aggregation (processing) tags
//   Phase 2 (`ColumnBinding::bind`): positional -> named column binding.
//
// Core layer: operates on already-split lines, never touches the filesystem.

use crate::core::model::{Aggregation, ColumnDef};
use crate::util::constants;
use crate::util::error::FormatError;
use std::collections::{BTreeMap, HashSet};

/// One raw header line with its 1-based line number in the file.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLine<'a> {
    pub line_number: u64,
    pub text: &'a str,
}

/// The decoded, validated header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSchema {
    pub station: Vec<String>,
    pub names: Vec<String>,
    pub units: Vec<String>,
    pub aggregations: Vec<String>,
}

impl HeaderSchema {
    /// Decode the fixed header schema from the first header lines of a file.
    ///
    /// Fails with a `FormatError` carrying the offending raw line when the
    /// block is short, the format tag is wrong, the site id is missing, or
    /// the names/units/aggregation rows disagree in length.
    pub fn decode(lines: &[HeaderLine<'_>]) -> Result<Self, FormatError> {
        if lines.len() < constants::HEADER_ROW_COUNT {
            return Err(FormatError::MissingHeader {
                expected: constants::HEADER_ROW_COUNT,
                found: lines.len(),
            });
        }

        let station_line = lines[0];
        let station = split_fields(station_line)?;

        let tag = station.first().map(String::as_str).unwrap_or("");
        if tag != constants::SUPPORTED_FILE_FORMAT {
            return Err(FormatError::UnsupportedFormat {
                tag: tag.to_string(),
                fragment: fragment(station_line.text),
            });
        }

        if station.get(1).map_or(true, |s| s.is_empty()) {
            return Err(FormatError::MissingSiteId {
                fragment: fragment(station_line.text),
            });
        }

        let names = split_fields(lines[1])?;
        if names.len() < 2 {
            return Err(FormatError::HeaderLength {
                row: "column names",
                expected: 2,
                found: names.len(),
                fragment: fragment(lines[1].text),
            });
        }

        let units = split_fields(lines[2])?;
        check_length("units", &units, names.len(), lines[2])?;

        let aggregations = split_fields(lines[3])?;
        check_length("aggregation", &aggregations, names.len(), lines[3])?;

        tracing::debug!(
            site = %station[1],
            columns = names.len() - 1,
            "Header schema decoded"
        );

        Ok(Self {
            station,
            names,
            units,
            aggregations,
        })
    }

    /// Station name, used as the site identifier.
    pub fn site_id(&self) -> &str {
        &self.station[1]
    }

    /// Station row fields keyed by their conventional names. Fields beyond
    /// the known eight are kept under `station_field_<n>` (1-based).
    pub fn station_metadata(&self) -> BTreeMap<String, String> {
        self.station
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let key = constants::STATION_FIELD_KEYS
                    .get(i)
                    .map(|k| (*k).to_string())
                    .unwrap_or_else(|| format!("station_field_{}", i + 1));
                (key, value.clone())
            })
            .collect()
    }
}

/// Positional-to-named column binding derived from a `HeaderSchema`.
///
/// Position 0 of every header row describes the timestamp field; positions
/// 1.. become the dataset's `ColumnDef`s in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub timestamp_column: String,
    pub columns: Vec<ColumnDef>,
}

impl ColumnBinding {
    pub fn bind(schema: &HeaderSchema) -> Result<Self, FormatError> {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(schema.names.len() - 1);

        for i in 1..schema.names.len() {
            let name = &schema.names[i];
            if !seen.insert(name.as_str()) {
                return Err(FormatError::DuplicateColumn {
                    name: name.clone(),
                    fragment: fragment(&schema.names.join(",")),
                });
            }
            columns.push(ColumnDef {
                name: name.clone(),
                unit: schema.units[i].clone(),
                aggregation: Aggregation::from_tag(&schema.aggregations[i]),
            });
        }

        Ok(Self {
            timestamp_column: schema.names[0].clone(),
            columns,
        })
    }

    /// Number of fields every data row must carry (timestamp + columns).
    pub fn field_count(&self) -> usize {
        self.columns.len() + 1
    }
}

/// Split one header line into trimmed, unquoted fields.
fn split_fields(line: HeaderLine<'_>) -> Result<Vec<String>, FormatError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.text.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Ok(record.iter().map(str::to_string).collect()),
        Some(Err(e)) => Err(FormatError::Unreadable {
            line_number: line.line_number,
            reason: e.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

fn check_length(
    row: &'static str,
    fields: &[String],
    expected: usize,
    line: HeaderLine<'_>,
) -> Result<(), FormatError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(FormatError::HeaderLength {
            row,
            expected,
            found: fields.len(),
            fragment: fragment(line.text),
        })
    }
}

/// Bound a raw header line for inclusion in an error message.
fn fragment(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.chars().count() <= constants::MAX_FRAGMENT_LEN {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(constants::MAX_FRAGMENT_LEN).collect();
        format!("{cut}...")
    }
}
