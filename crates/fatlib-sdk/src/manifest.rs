//! `dist/manifest.json`, a record of what a run produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::recipes::LibraryRecipe;
use crate::sdk::SdkInventory;
use crate::types::{BuildError, DistributionBundle, Platform};

/// File name of the manifest inside the distribution directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub name: String,
    pub version: String,
    pub archive_url: String,
}

/// Summary of one successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub generated_at: String,
    pub generated_at_unix: u64,
    pub fatlib_version: String,
    pub developer_dir: PathBuf,
    pub sdks: BTreeMap<Platform, String>,
    pub libraries: Vec<LibraryVersion>,
    pub bundles: Vec<DistributionBundle>,
}

impl BuildManifest {
    pub fn new(
        inventory: &SdkInventory,
        recipes: &[LibraryRecipe],
        bundles: &[DistributionBundle],
    ) -> Self {
        let generated_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| generated_at_unix.to_string());

        Self {
            generated_at,
            generated_at_unix,
            fatlib_version: crate::VERSION.to_string(),
            developer_dir: inventory.developer_dir.clone(),
            sdks: inventory.versions.clone(),
            libraries: recipes
                .iter()
                .map(|r| LibraryVersion {
                    name: r.name.clone(),
                    version: r.version.clone(),
                    archive_url: r.archive_url.clone(),
                })
                .collect(),
            bundles: bundles.to_vec(),
        }
    }

    /// Writes the manifest to `<dist_dir>/manifest.json` and returns its path.
    pub fn write_to(&self, dist_dir: &Path) -> Result<PathBuf, BuildError> {
        let path = dist_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
