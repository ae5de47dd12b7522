//! Record and replay value set expansions on disk.
//!
//! A snapshot directory makes mapping runs reproducible without a
//! terminology server. Record once against the server, then replay:
//!
//! ```text
//! snapshot/
//!   manifest.json                 recorded_at, counts, one entry per value set
//!   displays.json                 every recorded (system, code, display)
//!   3f0c...e1.json                codes of one value set
//! ```
//!
//! Expansion files are named by the hex SHA-256 of the value set canonical
//! (`url` or `url|version`).
//!
//! # Example
//!
//! ```rust
//! use criteria_mapper::{InMemoryTerminology, TermCode, TerminologyService};
//! use criteria_terminology::persistence::{ExpansionSnapshot, RecordingTerminology};
//!
//! let server = InMemoryTerminology::new().with_expansion(
//!     "http://vs",
//!     vec![TermCode::new("http://loinc.org", "8480-6", "")],
//! );
//! let recorder = RecordingTerminology::new(server, None);
//! recorder.expand_value_set("http://vs", None);
//!
//! let dir = tempfile::tempdir().unwrap();
//! recorder.into_snapshot().save(dir.path()).unwrap();
//!
//! let replay = ExpansionSnapshot::load(dir.path()).unwrap();
//! assert_eq!(replay.expand_value_set("http://vs", None).len(), 1);
//! ```

mod manifest;

pub use manifest::{SnapshotEntry, SnapshotManifest, MANIFEST_FILE};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use criteria_mapper::{TermCode, TerminologyService};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{TerminologyError, TerminologyResult};

/// File name of the recorded displays inside a snapshot directory.
pub const DISPLAYS_FILE: &str = "displays.json";

type ExpansionKey = (String, Option<String>);

#[derive(Debug, Serialize, Deserialize)]
struct ExpansionFile {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    codes: Vec<TermCode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DisplayRecord {
    system: String,
    code: String,
    display: String,
}

/// Canonical of a value set request: `url` or `url|version`.
fn canonical(url: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{url}|{version}"),
        None => url.to_string(),
    }
}

/// File name of a recorded expansion: hex SHA-256 of its canonical.
pub fn expansion_file_name(url: &str, version: Option<&str>) -> String {
    let digest = Sha256::digest(canonical(url, version).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{hex}.json")
}

/// Recorded expansions and displays, replayable as a [`TerminologyService`].
#[derive(Debug, Clone, Default)]
pub struct ExpansionSnapshot {
    server: Option<String>,
    expansions: BTreeMap<ExpansionKey, Vec<TermCode>>,
    displays: BTreeMap<(String, String), String>,
}

impl ExpansionSnapshot {
    /// Creates an empty snapshot.
    pub fn new(server: Option<String>) -> Self {
        Self {
            server,
            ..Default::default()
        }
    }

    /// Records the expansion of a value set. Codes are stored sorted.
    pub fn record_expansion(&mut self, url: &str, version: Option<&str>, mut codes: Vec<TermCode>) {
        codes.sort();
        codes.dedup();
        self.expansions
            .insert((url.to_string(), version.map(str::to_string)), codes);
    }

    /// Records the display of a code.
    pub fn record_display(&mut self, system: &str, code: &str, display: &str) {
        self.displays
            .insert((system.to_string(), code.to_string()), display.to_string());
    }

    /// Number of recorded expansions.
    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty() && self.displays.is_empty()
    }

    /// Writes the snapshot into `dir`, creating it if needed, and returns
    /// the manifest that was written.
    pub fn save(&self, dir: &Path) -> TerminologyResult<SnapshotManifest> {
        fs::create_dir_all(dir).map_err(|e| TerminologyError::io_error(dir, e))?;

        let mut manifest = SnapshotManifest::new(self.server.clone());
        for ((url, version), codes) in &self.expansions {
            let filename = expansion_file_name(url, version.as_deref());
            let file = ExpansionFile {
                url: url.clone(),
                version: version.clone(),
                codes: codes.clone(),
            };
            write_json(&dir.join(&filename), &file)?;
            manifest.expansions.push(SnapshotEntry {
                url: url.clone(),
                version: version.clone(),
                code_count: codes.len(),
                filename,
            });
        }

        let displays: Vec<DisplayRecord> = self
            .displays
            .iter()
            .map(|((system, code), display)| DisplayRecord {
                system: system.clone(),
                code: code.clone(),
                display: display.clone(),
            })
            .collect();
        write_json(&dir.join(DISPLAYS_FILE), &displays)?;
        manifest.display_count = displays.len();

        manifest.save(dir.join(MANIFEST_FILE))?;
        info!(
            dir = %dir.display(),
            value_sets = manifest.expansions.len(),
            codes = manifest.total_codes(),
            displays = manifest.display_count,
            "Saved expansion snapshot"
        );
        Ok(manifest)
    }

    /// Loads a snapshot written by [`save`](Self::save).
    ///
    /// Every expansion file must hold the value set its name was derived
    /// from, otherwise [`TerminologyError::HashMismatch`] is returned.
    pub fn load(dir: &Path) -> TerminologyResult<Self> {
        let manifest = SnapshotManifest::load(dir.join(MANIFEST_FILE))?;
        let mut snapshot = Self::new(manifest.server.clone());

        for entry in &manifest.expansions {
            let file: ExpansionFile = read_json(&dir.join(&entry.filename))?;
            let expected = expansion_file_name(&file.url, file.version.as_deref());
            if expected != entry.filename {
                return Err(TerminologyError::HashMismatch {
                    filename: entry.filename.clone(),
                    expected,
                });
            }
            snapshot
                .expansions
                .insert((file.url, file.version), file.codes);
        }

        let displays_path = dir.join(DISPLAYS_FILE);
        if displays_path.is_file() {
            let displays: Vec<DisplayRecord> = read_json(&displays_path)?;
            for record in displays {
                snapshot
                    .displays
                    .insert((record.system, record.code), record.display);
            }
        }

        info!(
            dir = %dir.display(),
            recorded_at = %manifest.recorded_at,
            value_sets = snapshot.expansions.len(),
            "Loaded expansion snapshot"
        );
        Ok(snapshot)
    }
}

impl TerminologyService for ExpansionSnapshot {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        self.displays
            .get(&(system.to_string(), code.to_string()))
            .cloned()
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        let key = (url.to_string(), version.map(str::to_string));
        match self.expansions.get(&key) {
            Some(codes) => codes.clone(),
            None => {
                debug!(value_set = %canonical(url, version), "Expansion not recorded");
                Vec::new()
            }
        }
    }
}

/// Forwards to a service and records every non-empty answer.
#[derive(Debug)]
pub struct RecordingTerminology<T> {
    inner: T,
    snapshot: Mutex<ExpansionSnapshot>,
}

impl<T: TerminologyService> RecordingTerminology<T> {
    /// Wraps a service; `server` is stored in the manifest.
    pub fn new(inner: T, server: Option<String>) -> Self {
        Self {
            inner,
            snapshot: Mutex::new(ExpansionSnapshot::new(server)),
        }
    }

    /// Returns everything recorded so far.
    pub fn into_snapshot(self) -> ExpansionSnapshot {
        self.snapshot
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: TerminologyService> TerminologyService for RecordingTerminology<T> {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        let display = self.inner.lookup_display(system, code)?;
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.record_display(system, code, &display);
        }
        Some(display)
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        let codes = self.inner.expand_value_set(url, version);
        if !codes.is_empty() {
            if let Ok(mut snapshot) = self.snapshot.lock() {
                snapshot.record_expansion(url, version, codes.clone());
            }
        }
        codes
    }
}

fn write_json<V: Serialize + ?Sized>(path: &Path, value: &V) -> TerminologyResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|source| TerminologyError::Snapshot {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|e| TerminologyError::io_error(path, e))
}

fn read_json<V: DeserializeOwned>(path: &Path) -> TerminologyResult<V> {
    let content = fs::read_to_string(path).map_err(|e| TerminologyError::io_error(path, e))?;
    serde_json::from_str(&content).map_err(|source| TerminologyError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}
