//! Search parameter definitions and the catalog they are looked up in.

use std::fs;
use std::path::{Path, PathBuf};

use criteria_chain::fhirpath::split_alternatives;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MappingError, MappingResult};

/// One component of a composite search parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchParameterComponent {
    /// Canonical URL of the component's search parameter.
    #[serde(default)]
    pub definition: String,
    /// Expression relative to the composite's own expression.
    #[serde(default)]
    pub expression: Option<String>,
}

/// A FHIR SearchParameter resource, reduced to the fields used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchParameterEntry {
    /// Canonical URL.
    pub url: String,
    /// Computer friendly name.
    pub name: String,
    /// Code used in search URLs.
    pub code: String,
    /// `|`-delimited FHIRPath alternatives.
    pub expression: Option<String>,
    /// Resource types the parameter applies to.
    pub base: Vec<String>,
    /// Resource types a reference parameter points to.
    pub target: Vec<String>,
    /// Parameter type (`token`, `quantity`, `reference`, `composite`, ...).
    #[serde(rename = "type")]
    pub param_type: String,
    /// Components of a composite parameter.
    pub component: Vec<SearchParameterComponent>,
}

impl SearchParameterEntry {
    /// The code used in search URLs, falling back to the name.
    pub fn search_code(&self) -> &str {
        if self.code.is_empty() {
            &self.name
        } else {
            &self.code
        }
    }
}

/// A search parameter together with its normalized expression alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The definition.
    pub parameter: SearchParameterEntry,
    /// Expression alternatives in operator cast form.
    pub expressions: Vec<String>,
}

#[derive(Deserialize)]
struct BundleEntry {
    resource: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Bundle {
    #[serde(default)]
    entry: Vec<BundleEntry>,
}

/// Ordered collection of search parameters: defaults first, then module overrides.
#[derive(Debug, Clone, Default)]
pub struct SearchParameterCatalog {
    entries: Vec<CatalogEntry>,
}

impl SearchParameterCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from definitions, keeping their order.
    pub fn from_entries(parameters: impl IntoIterator<Item = SearchParameterEntry>) -> Self {
        let mut catalog = Self::new();
        for parameter in parameters {
            catalog.push(parameter);
        }
        catalog
    }

    /// Appends a definition.
    pub fn push(&mut self, parameter: SearchParameterEntry) {
        let expressions = parameter
            .expression
            .as_deref()
            .map(split_alternatives)
            .unwrap_or_default();
        self.entries.push(CatalogEntry {
            parameter,
            expressions,
        });
    }

    /// Loads a catalog from a default bundle and a directory of module overrides.
    ///
    /// Either source may be absent. Override files are read in file-name order.
    pub fn load(default_bundle: Option<&Path>, module_dir: Option<&Path>) -> MappingResult<Self> {
        let mut catalog = Self::new();
        if let Some(path) = default_bundle {
            catalog.extend_from_file(path)?;
        }
        if let Some(dir) = module_dir.filter(|d| d.is_dir()) {
            for path in sorted_files(dir, |name| name.ends_with(".json"))? {
                catalog.extend_from_file(&path)?;
            }
        }
        info!(entries = catalog.len(), "Loaded search parameter catalog");
        Ok(catalog)
    }

    /// Appends every search parameter contained in a bundle or a single resource file.
    pub fn extend_from_file(&mut self, path: &Path) -> MappingResult<()> {
        let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let json_err = |source| MappingError::Json {
            path: path.to_path_buf(),
            source,
        };
        let value: serde_json::Value = serde_json::from_str(&content).map_err(json_err)?;

        let resources = if value.get("resourceType").and_then(|v| v.as_str()) == Some("Bundle") {
            let bundle: Bundle = serde_json::from_value(value).map_err(json_err)?;
            bundle.entry.into_iter().filter_map(|e| e.resource).collect()
        } else {
            vec![value]
        };

        for resource in resources {
            let parameter: SearchParameterEntry =
                serde_json::from_value(resource).map_err(json_err)?;
            debug!(
                code = %parameter.search_code(),
                bases = ?parameter.base,
                "Loaded search parameter"
            );
            self.push(parameter);
        }
        Ok(())
    }

    /// Entries in load order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lists the files of a directory accepted by `filter`, sorted by file name.
pub(crate) fn sorted_files(
    dir: &Path,
    filter: impl Fn(&str) -> bool,
) -> MappingResult<Vec<PathBuf>> {
    let io_err = |source| MappingError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let accepted = path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(&filter);
        if accepted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
