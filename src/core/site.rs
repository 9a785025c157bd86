// SensorIngest - core/site.rs
//
// Static per-site deployment profiles, keyed by the station name a logger
// writes into its header.
//
// A profile can supply the site's nominal sampling interval, standard
// display names for logger columns and extra site metadata. Lookup is by
// normalised site id (trimmed, lowercase, spaces as underscores), so
// "Austin Creek" in a file matches `site_id = "austin_creek"` in config.

use crate::core::model::{ColumnMetadataOverride, ParsedDataset};
use crate::util::error::ConfigError;
use chrono::Duration;
use std::collections::{BTreeMap, HashSet};

/// Deployment details for one site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteProfile {
    pub site_id: String,
    /// Overrides the global sampling interval for this site's files.
    pub sampling_interval: Option<Duration>,
    /// Logger column name -> standard display name.
    pub display_names: BTreeMap<String, String>,
    /// Static site metadata merged into the dataset's logger metadata.
    pub metadata: BTreeMap<String, String>,
}

impl SiteProfile {
    /// Merge static metadata into the dataset. Values read from the file
    /// header win over static ones with the same key.
    pub fn merge_metadata(&self, dataset: &mut ParsedDataset) {
        for (key, value) in &self.metadata {
            dataset
                .logger_metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Initial column overrides carrying the profile's display names.
    ///
    /// Names the dataset does not contain are ignored, with a debug log.
    pub fn column_overrides(
        &self,
        dataset: &ParsedDataset,
    ) -> BTreeMap<usize, ColumnMetadataOverride> {
        let mut overrides = BTreeMap::new();
        for (name, display) in &self.display_names {
            match dataset.columns.iter().position(|c| &c.name == name) {
                Some(index) => {
                    overrides.insert(
                        index,
                        ColumnMetadataOverride {
                            display_name: Some(display.clone()),
                            ..ColumnMetadataOverride::default()
                        },
                    );
                }
                None => tracing::debug!(
                    site = %self.site_id,
                    column = %name,
                    "Site profile names a column the file does not have"
                ),
            }
        }
        overrides
    }
}

/// All configured site profiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteCatalog {
    profiles: Vec<SiteProfile>,
}

impl SiteCatalog {
    /// Build a catalog, rejecting empty site ids and ids that collide after
    /// normalisation.
    pub fn new(profiles: Vec<SiteProfile>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            let key = normalize_site_id(&profile.site_id);
            if key.is_empty() {
                return Err(ConfigError::InvalidSite {
                    site_id: profile.site_id.clone(),
                    reason: "site_id must not be empty",
                });
            }
            if !seen.insert(key) {
                return Err(ConfigError::InvalidSite {
                    site_id: profile.site_id.clone(),
                    reason: "site_id is listed more than once",
                });
            }
        }
        Ok(Self { profiles })
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Profile for the station name found in a file header, if any.
    pub fn find(&self, site_id: &str) -> Option<&SiteProfile> {
        let key = normalize_site_id(site_id);
        self.profiles
            .iter()
            .find(|p| normalize_site_id(&p.site_id) == key)
    }
}

/// Lowercase, trim and replace spaces with underscores.
pub fn normalize_site_id(site_id: &str) -> String {
    site_id.trim().replace(' ', "_").to_lowercase()
}
