//! Store manifest
//!
//! A small JSON file written next to the database recording the metric and
//! the dimensionality of each collection. Checked on every open so that a
//! store created with one set of dimensions fails fast when reopened with
//! another, before any engine file is touched.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub(crate) const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;
const METRIC: &str = "cosine";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreManifest {
    version: u32,
    metric: String,
    /// Collection name -> embedding dimensionality
    collections: BTreeMap<String, usize>,
}

impl StoreManifest {
    fn new(collections: &[(&str, usize)]) -> Self {
        Self {
            version: MANIFEST_VERSION,
            metric: METRIC.to_string(),
            collections: collections
                .iter()
                .map(|(name, dims)| (name.to_string(), *dims))
                .collect(),
        }
    }

    /// Verify the manifest in `dir` against the configured collections,
    /// writing a fresh one when none exists yet.
    pub(crate) fn check_or_write(dir: &Path, collections: &[(&str, usize)]) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            let manifest = Self::new(collections);
            let json = serde_json::to_string_pretty(&manifest)
                .context("Failed to serialize store manifest")?;
            fs::write(&path, json)
                .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
            return Ok(());
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest: StoreManifest = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        if manifest.metric != METRIC {
            bail!(
                "Store at {} uses metric '{}', this build expects '{}'",
                dir.display(),
                manifest.metric,
                METRIC
            );
        }

        for (name, dims) in collections {
            match manifest.collections.get(*name) {
                Some(stored) if stored == dims => {}
                Some(stored) => bail!(
                    "Collection '{}' was created with {} dimensions, configured with {}",
                    name,
                    stored,
                    dims
                ),
                None => bail!(
                    "Collection '{}' is missing from manifest: {}",
                    name,
                    path.display()
                ),
            }
        }

        Ok(())
    }
}
