//! Walks chained element ids through profile snapshots.
//!
//! A chain starts in one profile and may continue into the StructureDefinition
//! of an extension (found in the package's extension directory) or into the
//! profile a reference points to (found anywhere in the dataset).

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::MapperConfig;
use crate::error::{MappingError, MappingResult};
use crate::model::search_parameter::sorted_files;
use crate::model::{ElementDefinition, ProfileSnapshot};

/// Prefix of element ids inside an extension's own StructureDefinition.
pub const EXTENSION_ROOT: &str = "Extension";

/// One visited element together with the profile and package it came from.
#[derive(Debug, Clone)]
pub struct ResolvedHop {
    /// The element.
    pub element: ElementDefinition,
    /// Profile owning the element.
    pub profile: Arc<ProfileSnapshot>,
    /// Package directory of the owning profile.
    pub package_dir: PathBuf,
}

impl ResolvedHop {
    /// Id of the element.
    pub fn id(&self) -> &str {
        &self.element.id
    }
}

/// Elements visited while resolving a chained id, in visitation order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedChain {
    hops: Vec<ResolvedHop>,
}

impl ResolvedChain {
    /// Builds a chain from hops that were resolved elsewhere.
    pub fn from_hops(hops: Vec<ResolvedHop>) -> Self {
        Self { hops }
    }

    /// The hops in order.
    pub fn hops(&self) -> &[ResolvedHop] {
        &self.hops
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Returns true if no element was visited.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// The terminal hop.
    pub fn last(&self) -> Option<&ResolvedHop> {
        self.hops.last()
    }

    /// Element ids in order.
    pub fn ids(&self) -> Vec<&str> {
        self.hops.iter().map(ResolvedHop::id).collect()
    }
}

/// Resolves chained element ids against a dataset laid out per [`MapperConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ProfileResolver<'c> {
    config: &'c MapperConfig,
}

impl<'c> ProfileResolver<'c> {
    /// Creates a resolver over the configured dataset.
    pub fn new(config: &'c MapperConfig) -> Self {
        Self { config }
    }

    /// The configuration the resolver reads the dataset layout from.
    pub fn config(&self) -> &'c MapperConfig {
        self.config
    }

    /// Parses and resolves a chained element id starting in `profile`.
    ///
    /// A trailing ` as ValueSet` marker on the id is ignored.
    pub fn resolve(
        &self,
        chained_id: &str,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<ResolvedChain> {
        let chained_id = chained_id
            .trim()
            .strip_suffix(" as ValueSet")
            .unwrap_or(chained_id.trim());
        let tokens = criteria_chain::parse(chained_id)?;
        self.resolve_tokens(tokens, profile, package_dir)
    }

    /// Resolves an already parsed token sequence.
    pub fn resolve_tokens(
        &self,
        tokens: Vec<String>,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<ResolvedChain> {
        let mut tokens: VecDeque<String> = tokens.into();
        let mut profile = Arc::clone(profile);
        let mut package_dir = package_dir.to_path_buf();
        let mut chain = ResolvedChain::default();

        while let Some(token) = tokens.pop_front() {
            let element = profile.require_element(&token)?.clone();
            trace!(profile = %profile.name, element = %element.id, "Resolved chain hop");

            let next = tokens.pop_front();
            chain.hops.push(ResolvedHop {
                element: element.clone(),
                profile: Arc::clone(&profile),
                package_dir: package_dir.clone(),
            });
            let Some(next) = next else {
                break;
            };

            if let Some(extension_type) = element.find_type("Extension") {
                let url = match extension_type.profile.as_slice() {
                    [url] => url,
                    [] => {
                        return Err(MappingError::UnsupportedChain(format!(
                            "extension element '{}' declares no profile",
                            element.id
                        )))
                    }
                    _ => {
                        return Err(MappingError::UnsupportedChain(format!(
                            "extension element '{}' declares more than one profile",
                            element.id
                        )))
                    }
                };
                profile = self.find_extension(&package_dir, url)?;
                tokens.push_front(format!("{EXTENSION_ROOT}.{next}"));
            } else if let Some(reference_type) = element.find_type("Reference") {
                let target = match reference_type.target_profile.as_slice() {
                    [] => {
                        return Err(MappingError::ProfileNotFound(format!(
                            "reference element '{}' declares no target profile",
                            element.id
                        )))
                    }
                    [first, rest @ ..] => {
                        if !rest.is_empty() {
                            warn!(
                                element = %element.id,
                                targets = reference_type.target_profile.len(),
                                "Reference supports multiple profiles, using first"
                            );
                        }
                        first
                    }
                };
                let (target_profile, target_dir) =
                    self.find_reference_target(target, Some(&next))?;
                tokens.push_front(format!("{}.{next}", target_profile.resource_type));
                profile = target_profile;
                package_dir = target_dir;
            } else if element.has_type("Coding") {
                return Err(MappingError::UnsupportedChain(format!(
                    "element '{}' of type Coding cannot be followed by '{next}'",
                    element.id
                )));
            } else {
                return Err(MappingError::UnsupportedChain(format!(
                    "element '{}' of type {:?} cannot be followed by '{next}'",
                    element.id,
                    element.type_codes()
                )));
            }
        }

        debug!(hops = ?chain.ids(), "Resolved chained element id");
        Ok(chain)
    }

    /// Finds the StructureDefinition of an extension by its canonical URL.
    pub fn find_extension(&self, package_dir: &Path, url: &str) -> MappingResult<Arc<ProfileSnapshot>> {
        let dir = self.config.extension_dir(package_dir);
        if dir.is_dir() {
            for path in sorted_files(&dir, |name| name.ends_with(&self.config.snapshot_suffix))? {
                let Some(extension) = load_snapshot(&path) else {
                    continue;
                };
                if extension.url == url {
                    return Ok(Arc::new(extension));
                }
            }
        }
        Err(MappingError::ProfileNotFound(format!(
            "no extension definition for '{url}' in {}",
            dir.display()
        )))
    }

    /// Finds the profile a reference target points to.
    ///
    /// Modules and their snapshot files are scanned in file-name order; the
    /// first profile whose base definition, type or URL matches `target` wins.
    /// If `partial_id` is given the profile must also contain
    /// `{type}.{partial_id}`.
    pub fn find_reference_target(
        &self,
        target: &str,
        partial_id: Option<&str>,
    ) -> MappingResult<(Arc<ProfileSnapshot>, PathBuf)> {
        let target_type = target.rsplit('/').next().unwrap_or(target);
        for package_dir in self.module_package_dirs()? {
            for path in sorted_files(&package_dir, |name| name.ends_with(&self.config.snapshot_suffix))? {
                let Some(candidate) = load_snapshot(&path) else {
                    continue;
                };
                let matches = candidate.base_definition.as_deref() == Some(target)
                    || candidate.resource_type == target_type
                    || candidate.url == target;
                if !matches {
                    continue;
                }
                if let Some(partial) = partial_id {
                    let id = format!("{}.{partial}", candidate.resource_type);
                    if candidate.element_by_id(&id).is_none() {
                        continue;
                    }
                }
                debug!(target = %target, profile = %candidate.name, "Resolved reference target");
                return Ok((Arc::new(candidate), package_dir));
            }
        }
        Err(MappingError::ProfileNotFound(format!(
            "no profile matches reference target '{target}'"
        )))
    }

    /// Resource type a reference element points to.
    ///
    /// Falls back to the last segment of the target profile URL when no
    /// matching profile exists in the dataset.
    pub fn reference_target_type(&self, element: &ElementDefinition) -> Option<String> {
        let target = element.find_type("Reference")?.target_profile.first()?;
        match self.find_reference_target(target, None) {
            Ok((profile, _)) => Some(profile.resource_type.clone()),
            Err(_) => target.rsplit('/').next().map(str::to_string),
        }
    }

    fn module_package_dirs(&self) -> MappingResult<Vec<PathBuf>> {
        let root = &self.config.dataset_dir;
        let io_err = |source| MappingError::Io {
            path: root.clone(),
            source,
        };
        let mut dirs = Vec::new();
        for entry in fs::read_dir(root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let package = path.join(&self.config.package_subdir);
            if path.is_dir() && package.is_dir() {
                dirs.push(package);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Reads a snapshot while scanning, skipping files that fail to parse.
fn load_snapshot(path: &Path) -> Option<ProfileSnapshot> {
    match ProfileSnapshot::from_path(path) {
        Ok(snapshot) => Some(snapshot),
        Err(error) => {
            warn!(file = %path.display(), error = %error, "Skipping malformed snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &Path, value: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn profile(value: serde_json::Value) -> Arc<ProfileSnapshot> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn dataset() -> (TempDir, MapperConfig) {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("diagnose").join("package");
        write(
            &package.join("extension").join("Stage-snapshot.json"),
            json!({
                "name": "Stage", "url": "https://example.org/Extension/stage", "type": "Extension",
                "snapshot": {"element": [
                    {"id": "Extension", "path": "Extension"},
                    {"id": "Extension.value[x]", "path": "Extension.value[x]", "type": [{"code": "CodeableConcept"}]}
                ]}
            }),
        );
        write(
            &dir.path().join("bioprobe").join("package").join("Specimen-snapshot.json"),
            json!({
                "name": "ProfileSpecimen", "url": "https://example.org/Specimen", "type": "Specimen",
                "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Specimen",
                "snapshot": {"element": [
                    {"id": "Specimen.type", "path": "Specimen.type", "type": [{"code": "CodeableConcept"}]}
                ]}
            }),
        );
        let config = MapperConfig::builder().with_dataset_dir(dir.path()).build();
        (dir, config)
    }

    fn condition() -> Arc<ProfileSnapshot> {
        profile(json!({
            "name": "ProfileCondition", "url": "https://example.org/Condition", "type": "Condition",
            "snapshot": {"element": [
                {"id": "Condition.code.coding", "path": "Condition.code.coding", "type": [{"code": "Coding"}]},
                {"id": "Condition.extension:stage", "path": "Condition.extension",
                 "type": [{"code": "Extension", "profile": ["https://example.org/Extension/stage"]}]},
                {"id": "Condition.evidence.detail", "path": "Condition.evidence.detail",
                 "type": [{"code": "Reference", "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Specimen"]}]},
                {"id": "Condition.note", "path": "Condition.note", "type": [{"code": "Annotation"}]}
            ]}
        }))
    }

    mod resolve {
        use super::*;

        #[test]
        fn test_single_element() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let chain = resolver
                .resolve("Condition.code.coding", &condition(), &dir.path().join("diagnose/package"))
                .unwrap();
            assert_eq!(chain.ids(), vec!["Condition.code.coding"]);
        }

        #[test]
        fn test_value_set_marker_is_ignored() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let chain = resolver
                .resolve(
                    "Condition.code.coding as ValueSet",
                    &condition(),
                    &dir.path().join("diagnose/package"),
                )
                .unwrap();
            assert_eq!(chain.len(), 1);
        }

        #[test]
        fn test_through_extension() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let chain = resolver
                .resolve(
                    "(Condition.extension:stage).value[x]",
                    &condition(),
                    &dir.path().join("diagnose/package"),
                )
                .unwrap();
            assert_eq!(chain.ids(), vec!["Condition.extension:stage", "Extension.value[x]"]);
            assert!(chain.last().unwrap().id().starts_with(EXTENSION_ROOT));
            assert_eq!(chain.last().unwrap().profile.name, "Stage");
        }

        #[test]
        fn test_through_reference_switches_package() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let chain = resolver
                .resolve(
                    "(Condition.evidence.detail).type",
                    &condition(),
                    &dir.path().join("diagnose/package"),
                )
                .unwrap();
            assert_eq!(chain.ids(), vec!["Condition.evidence.detail", "Specimen.type"]);
            assert_eq!(chain.hops()[1].package_dir, dir.path().join("bioprobe/package"));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_element_not_found() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let err = resolver
                .resolve("Condition.foo", &condition(), dir.path())
                .unwrap_err();
            assert!(matches!(err, MappingError::ElementNotFound { .. }));
        }

        #[test]
        fn test_grammar_error() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let err = resolver.resolve("(", &condition(), dir.path()).unwrap_err();
            assert!(matches!(err, MappingError::Grammar(_)));
        }

        #[test]
        fn test_coding_with_more_tokens() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let err = resolver
                .resolve("(Condition.code.coding).system", &condition(), dir.path())
                .unwrap_err();
            assert!(matches!(err, MappingError::UnsupportedChain(ref m) if m.contains("Coding")));
        }

        #[test]
        fn test_other_type_with_more_tokens() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let err = resolver
                .resolve("(Condition.note).text", &condition(), dir.path())
                .unwrap_err();
            assert!(matches!(err, MappingError::UnsupportedChain(ref m) if m.contains("Annotation")));
        }

        #[test]
        fn test_missing_extension_definition() {
            let (dir, config) = dataset();
            let resolver = ProfileResolver::new(&config);
            let err = resolver
                .resolve(
                    "(Condition.extension:stage).value[x]",
                    &condition(),
                    &dir.path().join("bioprobe/package"),
                )
                .unwrap_err();
            assert!(matches!(err, MappingError::ProfileNotFound(_)));
        }
    }

    mod malformed {
        use super::*;

        #[test]
        fn test_reference_scan_skips_broken_snapshot_in_other_module() {
            let (dir, config) = dataset();
            let broken = dir.path().join("aaa/package/Broken-snapshot.json");
            fs::create_dir_all(broken.parent().unwrap()).unwrap();
            fs::write(&broken, "{ not json").unwrap();

            let resolver = ProfileResolver::new(&config);
            let chain = resolver
                .resolve(
                    "(Condition.evidence.detail).type",
                    &condition(),
                    &dir.path().join("diagnose/package"),
                )
                .unwrap();
            assert_eq!(chain.ids(), vec!["Condition.evidence.detail", "Specimen.type"]);
        }

        #[test]
        fn test_extension_scan_skips_broken_snapshot() {
            let (dir, config) = dataset();
            fs::write(
                dir.path().join("diagnose/package/extension/Aaa-snapshot.json"),
                "{ not json",
            )
            .unwrap();

            let resolver = ProfileResolver::new(&config);
            let extension = resolver
                .find_extension(
                    &dir.path().join("diagnose/package"),
                    "https://example.org/Extension/stage",
                )
                .unwrap();
            assert_eq!(extension.name, "Stage");
        }
    }

    #[test]
    fn test_reference_target_type() {
        let (_dir, config) = dataset();
        let resolver = ProfileResolver::new(&config);
        let element = condition()
            .element_by_id("Condition.evidence.detail")
            .cloned()
            .unwrap();
        assert_eq!(resolver.reference_target_type(&element).as_deref(), Some("Specimen"));

        let mut unknown = element.clone();
        unknown.types[0].target_profile = vec!["http://hl7.org/fhir/StructureDefinition/Patient".into()];
        assert_eq!(resolver.reference_target_type(&unknown).as_deref(), Some("Patient"));
    }
}
