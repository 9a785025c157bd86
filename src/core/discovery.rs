// SensorIngest - core/discovery.rs
//
// Batch discovery of logger files under a directory.
//
// Reads directory entries only, never file contents. Per-entry access
// errors are non-fatal and collected as warnings; only an unusable root
// is an error. Results are sorted by path so batch runs are reproducible.

use crate::util::constants;
use crate::util::error::DiscoveryError;
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum directory recursion depth.
    pub max_depth: usize,

    /// Maximum number of files returned; extra matches are dropped with a warning.
    pub max_files: usize,

    /// Filename globs a file must match. Empty means "everything not excluded".
    pub include_patterns: Vec<String>,

    /// Globs matched against file names and literal directory names.
    /// Matching directories are not descended into.
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::DEFAULT_MAX_FILES,
            include_patterns: constants::DEFAULT_INCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Find logger files under `root`.
///
/// A `root` that is itself a file is returned as-is (no pattern filtering),
/// so callers can pass a mix of files and directories.
///
/// Returns the accepted paths in sorted order plus human-readable warnings
/// for entries that could not be read.
pub fn discover_files(
    root: &Path,
    config: &DiscoveryConfig,
) -> Result<(Vec<PathBuf>, Vec<String>), DiscoveryError> {
    let meta = std::fs::metadata(root).map_err(|_| DiscoveryError::RootNotFound {
        path: root.to_path_buf(),
    })?;
    if meta.is_file() {
        return Ok((vec![root.to_path_buf()], Vec::new()));
    }

    tracing::debug!(
        root = %root.display(),
        max_depth = config.max_depth,
        include = ?config.include_patterns,
        exclude = ?config.exclude_patterns,
        "Discovery starting"
    );

    let include_pats = compile_patterns(&config.include_patterns, "include");
    let exclude_pats = compile_patterns(&config.exclude_patterns, "exclude");

    let mut files = Vec::new();
    let mut warnings = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(config.max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or("");
            !is_excluded_component(name, &exclude_pats)
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(DiscoveryError::Traversal {
                    path: root.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warnings.push(format!("Skipping '{}': non-UTF-8 filename", path.display()));
            continue;
        };

        if exclude_pats.iter().any(|p| p.matches(file_name)) {
            tracing::trace!(file = file_name, "Excluded by pattern");
            continue;
        }
        if !include_pats.is_empty() && !include_pats.iter().any(|p| p.matches(file_name)) {
            tracing::trace!(file = file_name, "Not matched by include patterns");
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();

    let total_found = files.len();
    if total_found > config.max_files {
        files.truncate(config.max_files);
        warnings.push(format!(
            "{total_found} logger files were found but the batch limit is {}. \
             Only the first {} (by path) will be processed.",
            config.max_files, config.max_files
        ));
        tracing::info!(
            total_found,
            limit = config.max_files,
            "File list truncated"
        );
    }

    tracing::debug!(
        total_found,
        accepted = files.len(),
        warnings = warnings.len(),
        "Discovery complete"
    );

    Ok((files, warnings))
}

// =============================================================================
// Glob helpers
// =============================================================================

/// Compile glob strings, logging and skipping any that fail.
fn compile_patterns(patterns: &[String], kind: &str) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, kind, error = %e, "Invalid glob pattern, skipping");
                None
            }
        })
        .collect()
}

/// Only literal exclude patterns (no wildcards) prune directories.
fn is_excluded_component(dir_name: &str, exclude_pats: &[glob::Pattern]) -> bool {
    exclude_pats.iter().any(|p| {
        let s = p.as_str();
        !s.contains(['*', '?', '[']) && p.matches(dir_name)
    })
}
