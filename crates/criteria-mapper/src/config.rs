//! Configuration types for mapping generation.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration for a mapping run over a dataset directory.
///
/// A dataset holds one directory per module:
///
/// ```text
/// {dataset_dir}/{module}/package/*-snapshot.json
/// {dataset_dir}/{module}/package/extension/*-snapshot.json
/// {dataset_dir}/{module}/search_parameter/*.json
/// {dataset_dir}/{module}/QueryingMetaData/*.json
/// ```
///
/// # Example
///
/// ```rust
/// use criteria_mapper::MapperConfig;
///
/// let config = MapperConfig::builder()
///     .with_dataset_dir("resources/modules")
///     .with_default_search_parameters("resources/search-parameters.json")
///     .with_model_info("resources/elm-modelinfo.xml")
///     .with_kind_defaults(true)
///     .build();
///
/// assert_eq!(config.package_subdir, "package");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Root directory containing one sub-directory per module.
    pub dataset_dir: PathBuf,
    /// Module sub-directory holding profile snapshots.
    pub package_subdir: String,
    /// Package sub-directory holding extension snapshots.
    pub extension_subdir: String,
    /// File name suffix identifying snapshot documents.
    pub snapshot_suffix: String,
    /// Module sub-directory holding module-specific search parameters.
    pub search_parameter_subdir: String,
    /// Module sub-directory holding querying metadata records.
    pub querying_metadata_subdir: String,
    /// Bundle of default search parameters (None = module catalogs only).
    pub default_search_parameters: Option<PathBuf>,
    /// CQL model info document (None = no primary code path elision).
    pub model_info: Option<PathBuf>,
    /// Fill gaps in generated FHIR mappings from the per-kind defaults table.
    pub apply_kind_defaults: bool,
    /// Assemble profiles on a worker pool (requires `parallel` feature).
    pub parallel: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("."),
            package_subdir: "package".to_string(),
            extension_subdir: "extension".to_string(),
            snapshot_suffix: "-snapshot.json".to_string(),
            search_parameter_subdir: "search_parameter".to_string(),
            querying_metadata_subdir: "QueryingMetaData".to_string(),
            default_search_parameters: None,
            model_info: None,
            apply_kind_defaults: false,
            parallel: false,
        }
    }
}

impl MapperConfig {
    /// Creates a new builder for MapperConfig.
    pub fn builder() -> MapperConfigBuilder {
        MapperConfigBuilder::default()
    }

    /// Directory of a module's profile snapshots.
    pub fn package_dir(&self, module: &str) -> PathBuf {
        self.dataset_dir.join(module).join(&self.package_subdir)
    }

    /// Directory of the extension snapshots belonging to a package.
    pub fn extension_dir(&self, package_dir: &Path) -> PathBuf {
        package_dir.join(&self.extension_subdir)
    }

    /// Directory of a module's own search parameter definitions.
    pub fn search_parameter_dir(&self, module: &str) -> PathBuf {
        self.dataset_dir
            .join(module)
            .join(&self.search_parameter_subdir)
    }

    /// Directory of a module's querying metadata records.
    pub fn querying_metadata_dir(&self, module: &str) -> PathBuf {
        self.dataset_dir
            .join(module)
            .join(&self.querying_metadata_subdir)
    }

    /// Returns true if a file name denotes a snapshot document.
    pub fn is_snapshot_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&self.snapshot_suffix))
    }
}

/// Builder for MapperConfig.
#[derive(Debug, Clone, Default)]
pub struct MapperConfigBuilder {
    config: MapperConfig,
}

impl MapperConfigBuilder {
    /// Sets the dataset root directory.
    pub fn with_dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dataset_dir = dir.into();
        self
    }

    /// Sets the package sub-directory name.
    pub fn with_package_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.config.package_subdir = subdir.into();
        self
    }

    /// Sets the extension sub-directory name.
    pub fn with_extension_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.config.extension_subdir = subdir.into();
        self
    }

    /// Sets the snapshot file name suffix.
    pub fn with_snapshot_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.snapshot_suffix = suffix.into();
        self
    }

    /// Sets the default search parameter bundle.
    pub fn with_default_search_parameters(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.default_search_parameters = Some(path.into());
        self
    }

    /// Sets the CQL model info document.
    pub fn with_model_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_info = Some(path.into());
        self
    }

    /// Enables or disables the per-kind defaults table.
    pub fn with_kind_defaults(mut self, enabled: bool) -> Self {
        self.config.apply_kind_defaults = enabled;
        self
    }

    /// Enables or disables parallel assembly.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Builds the MapperConfig.
    pub fn build(self) -> MapperConfig {
        self.config
    }
}
