//! Scrape targets and the published file format

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One entry of the scraper's file-based discovery format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl ScrapeTarget {
    pub fn new(address: String, labels: BTreeMap<String, String>) -> Self {
        Self {
            targets: vec![address],
            labels,
        }
    }

    /// The single `ip:port` address of this target
    pub fn address(&self) -> &str {
        self.targets.first().map(String::as_str).unwrap_or_default()
    }
}

/// Targets of one export, deduplicated by `ip:port` plus metrics path
///
/// The first target inserted under a key wins; later ones are ignored.
#[derive(Debug, Default)]
pub struct TargetSet {
    targets: BTreeMap<String, ScrapeTarget>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(address: &str, metrics_path: &str) -> String {
        format!("{}{}", address, metrics_path)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.targets.contains_key(key)
    }

    /// Insert unless the key is already taken; returns whether it was added
    pub fn insert(&mut self, key: String, target: ScrapeTarget) -> bool {
        if self.targets.contains_key(&key) {
            return false;
        }
        self.targets.insert(key, target);
        true
    }

    pub fn get(&self, key: &str) -> Option<&ScrapeTarget> {
        self.targets.get(key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn into_targets(self) -> Vec<ScrapeTarget> {
        self.targets.into_values().collect()
    }
}

/// Encode targets in the scraper's YAML file format
pub fn encode_targets(targets: &[ScrapeTarget]) -> Result<String> {
    Ok(serde_yaml::to_string(targets)?)
}

/// Decode a published target file
pub fn decode_targets(data: &str) -> Result<Vec<ScrapeTarget>> {
    Ok(serde_yaml::from_str(data)?)
}

/// Read and decode a published target file
pub fn read_targets(path: &Path) -> Result<Vec<ScrapeTarget>> {
    let data = std::fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e))?;
    decode_targets(&data)
}

/// Temporary path written before the rename over `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Publish targets to `path` by writing a sibling temp file and renaming it
/// over the destination, so readers never observe a partial file.
pub fn publish_targets(path: &Path, targets: &[ScrapeTarget]) -> Result<()> {
    let encoded = encode_targets(targets)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| DiscoveryError::io(parent, e))?;
        }
    }

    let temp = temp_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp)
        .map_err(|e| DiscoveryError::io(&temp, e))?;

    file.write_all(encoded.as_bytes())
        .map_err(|e| DiscoveryError::io(&temp, e))?;
    file.sync_all().map_err(|e| DiscoveryError::io(&temp, e))?;

    std::fs::rename(&temp, path).map_err(|e| DiscoveryError::io(path, e))?;

    debug!(path = %path.display(), targets = targets.len(), "Published scrape targets");
    Ok(())
}
