//! Manifest of a recorded expansion snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{TerminologyError, TerminologyResult};

/// File name of the manifest inside a snapshot directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Describes the files of a snapshot directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// When the snapshot was written.
    pub recorded_at: DateTime<Utc>,
    /// Version of the tooling that wrote it.
    pub recorder_version: String,
    /// Server the expansions came from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Number of recorded displays.
    pub display_count: usize,
    /// One entry per recorded expansion, ordered by canonical.
    pub expansions: Vec<SnapshotEntry>,
}

/// A recorded expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Value set URL.
    pub url: String,
    /// Requested value set version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Number of codes in the expansion.
    pub code_count: usize,
    /// File name relative to the manifest.
    pub filename: String,
}

impl SnapshotManifest {
    /// Creates an empty manifest stamped with the current time.
    pub fn new(server: Option<String>) -> Self {
        Self {
            recorded_at: Utc::now(),
            recorder_version: env!("CARGO_PKG_VERSION").to_string(),
            server,
            display_count: 0,
            expansions: Vec::new(),
        }
    }

    /// Total number of codes across all expansions.
    pub fn total_codes(&self) -> usize {
        self.expansions.iter().map(|e| e.code_count).sum()
    }

    /// Finds the entry of a value set.
    pub fn get_entry(&self, url: &str, version: Option<&str>) -> Option<&SnapshotEntry> {
        self.expansions
            .iter()
            .find(|e| e.url == url && e.version.as_deref() == version)
    }

    /// Saves the manifest to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TerminologyResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| TerminologyError::io_error(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            TerminologyError::Snapshot {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Loads a manifest from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> TerminologyResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TerminologyError::io_error(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| TerminologyError::Snapshot {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl std::fmt::Display for SnapshotManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Expansion Snapshot")?;
        writeln!(f, "  Recorded:    {}", self.recorded_at)?;
        writeln!(f, "  Recorder:    {}", self.recorder_version)?;
        if let Some(server) = &self.server {
            writeln!(f, "  Server:      {server}")?;
        }
        writeln!(f, "  Value Sets:  {}", self.expansions.len())?;
        writeln!(f, "  Codes:       {}", self.total_codes())?;
        writeln!(f, "  Displays:    {}", self.display_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(url: &str, version: Option<&str>, code_count: usize) -> SnapshotEntry {
        SnapshotEntry {
            url: url.to_string(),
            version: version.map(str::to_string),
            code_count,
            filename: format!("{url}.json"),
        }
    }

    #[test]
    fn test_lookup_respects_version() {
        let mut manifest = SnapshotManifest::new(None);
        manifest.expansions.push(entry("http://vs/icd", Some("2024"), 12));
        manifest.expansions.push(entry("http://vs/icd", None, 10));

        assert_eq!(manifest.get_entry("http://vs/icd", None).map(|e| e.code_count), Some(10));
        assert_eq!(manifest.get_entry("http://vs/icd", Some("2024")).map(|e| e.code_count), Some(12));
        assert!(manifest.get_entry("http://vs/icd", Some("2023")).is_none());
        assert_eq!(manifest.total_codes(), 22);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let mut manifest = SnapshotManifest::new(Some("https://tx.example.org/fhir".to_string()));
        manifest.display_count = 3;
        manifest.expansions.push(entry("http://vs/loinc", None, 2));

        manifest.save(&path).unwrap();
        let loaded = SnapshotManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_display_lists_counts() {
        let mut manifest = SnapshotManifest::new(None);
        manifest.expansions.push(entry("http://vs/loinc", None, 2));
        let text = manifest.to_string();
        assert!(text.contains("Value Sets:  1"));
        assert!(text.contains("Codes:       2"));
        assert!(!text.contains("Server"));
    }
}
