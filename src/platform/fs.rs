// SensorIngest - platform/fs.rs
//
// Filesystem helpers: reading logger files and writing the composed
// artifact to an output directory.

use crate::core::export;
use crate::core::model::Artifact;
use crate::util::error::ExportError;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Read the full content of a file as a string.
///
/// For files with invalid UTF-8, uses lossy conversion.
pub fn read_file_lossy(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write `artifact` under `dir` as `<stem>.data.csv`, `<stem>.columns.csv`,
/// `<stem>.notes.csv` and `<stem>.json`. Creates `dir` if needed.
///
/// Missing values in the data table are written as `na_repr`; empty cells in
/// the other tables stay empty. Returns the written paths in that order.
pub fn write_artifact(
    dir: &Path,
    stem: &str,
    artifact: &Artifact,
    na_repr: &str,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(4);

    let tables = [
        ("data", &artifact.data, na_repr),
        ("columns", &artifact.metadata, ""),
        ("notes", &artifact.notes, ""),
    ];
    for (suffix, table, empty) in tables {
        let path = dir.join(format!("{stem}.{suffix}.csv"));
        let file = create(&path)?;
        export::write_table_csv(table, BufWriter::new(file), empty)?;
        written.push(path);
    }

    let json_path = dir.join(format!("{stem}.json"));
    let file = create(&json_path)?;
    export::write_artifact_json(artifact, BufWriter::new(file))?;
    written.push(json_path);

    tracing::info!(dir = %dir.display(), stem, files = written.len(), "Artifact written");
    Ok(written)
}

fn create(path: &Path) -> Result<std::fs::File, ExportError> {
    std::fs::File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
