//! Read-only views of FHIR StructureDefinition snapshots.
//!
//! Only the fields the mapper looks at are modeled; unknown fields are ignored.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{MappingError, MappingResult};
use crate::model::TermCode;

/// One declared type of an element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementType {
    /// FHIR type code, e.g. `CodeableConcept` or `Extension`.
    pub code: String,
    /// Profiles the type is constrained to (extensions).
    #[serde(default)]
    pub profile: Vec<String>,
    /// Profiles a reference may point to.
    #[serde(default)]
    pub target_profile: Vec<String>,
}

/// Value set binding of a coded element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBinding {
    /// Canonical URL of the bound value set, optionally `|version`.
    pub value_set: Option<String>,
}

/// A Coding as it appears in pattern/fixed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Coding {
    /// Code system URL.
    pub system: Option<String>,
    /// Code within the system.
    pub code: Option<String>,
    /// Display text.
    pub display: Option<String>,
    /// Code system version.
    pub version: Option<String>,
}

impl Coding {
    /// Converts to a term code if both system and code are present.
    pub fn to_term_code(&self) -> Option<TermCode> {
        let (system, code) = (self.system.as_ref()?, self.code.as_ref()?);
        let mut term_code = TermCode::new(
            system.clone(),
            code.clone(),
            self.display.clone().unwrap_or_default(),
        );
        term_code.version = self.version.clone();
        Some(term_code)
    }
}

/// A CodeableConcept as it appears in pattern/fixed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CodeableConcept {
    /// Codings of the concept.
    #[serde(default)]
    pub coding: Vec<Coding>,
}

/// One entry of a snapshot's element array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementDefinition {
    /// Unique id within the snapshot, including slice names.
    pub id: String,
    /// Dotted path without slice names.
    pub path: String,
    /// Slice name if the element defines a slice.
    pub slice_name: Option<String>,
    /// Minimum cardinality.
    pub min: Option<u32>,
    /// Maximum cardinality (`*` for unbounded).
    pub max: Option<String>,
    /// Short description.
    pub short: Option<String>,
    /// Declared types.
    #[serde(rename = "type")]
    pub types: Vec<ElementType>,
    /// Value set binding.
    pub binding: Option<ElementBinding>,
    /// Required Coding pattern.
    pub pattern_coding: Option<Coding>,
    /// Required CodeableConcept pattern.
    pub pattern_codeable_concept: Option<CodeableConcept>,
    /// Fixed Coding value.
    pub fixed_coding: Option<Coding>,
    /// Fixed CodeableConcept value.
    pub fixed_codeable_concept: Option<CodeableConcept>,
    /// Required code pattern.
    pub pattern_code: Option<String>,
    /// Fixed code value.
    pub fixed_code: Option<String>,
    /// Required uri pattern.
    pub pattern_uri: Option<String>,
    /// Fixed uri value.
    pub fixed_uri: Option<String>,
}

impl ElementDefinition {
    /// Returns the declared type codes in declaration order.
    pub fn type_codes(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.code.as_str()).collect()
    }

    /// Returns the declared type with the given code.
    pub fn find_type(&self, code: &str) -> Option<&ElementType> {
        self.types.iter().find(|t| t.code == code)
    }

    /// Returns true if the element declares the given type code.
    pub fn has_type(&self, code: &str) -> bool {
        self.find_type(code).is_some()
    }

    /// Bound value set URL, if any.
    pub fn value_set(&self) -> Option<&str> {
        self.binding.as_ref()?.value_set.as_deref()
    }
}

/// The snapshot part of a StructureDefinition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    /// Flattened element list.
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

/// A StructureDefinition in snapshot form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    /// Computer friendly profile name.
    #[serde(default)]
    pub name: String,
    /// Canonical URL.
    #[serde(default)]
    pub url: String,
    /// Constrained resource or data type.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// URL of the profile this one derives from.
    pub base_definition: Option<String>,
    /// The element list.
    #[serde(default)]
    pub snapshot: Snapshot,
}

impl ProfileSnapshot {
    /// Reads a snapshot document from disk.
    pub fn from_path(path: &Path) -> MappingResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| MappingError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Elements of the snapshot.
    pub fn elements(&self) -> &[ElementDefinition] {
        &self.snapshot.element
    }

    /// Looks up an element by exact id.
    pub fn element_by_id(&self, id: &str) -> Option<&ElementDefinition> {
        self.snapshot.element.iter().find(|e| e.id == id)
    }

    /// Looks up an element by exact id, failing with [`MappingError::ElementNotFound`].
    pub fn require_element(&self, id: &str) -> MappingResult<&ElementDefinition> {
        self.element_by_id(id)
            .ok_or_else(|| MappingError::ElementNotFound {
                profile: self.name.clone(),
                element_id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONDITION: &str = r#"{
        "resourceType": "StructureDefinition",
        "name": "ProfileConditionDiagnose",
        "url": "https://example.org/StructureDefinition/Diagnose",
        "type": "Condition",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Condition",
        "snapshot": {
            "element": [
                {"id": "Condition", "path": "Condition"},
                {
                    "id": "Condition.code.coding",
                    "path": "Condition.code.coding",
                    "type": [{"code": "Coding"}],
                    "binding": {"strength": "required", "valueSet": "https://example.org/ValueSet/icd|2024"}
                },
                {
                    "id": "Condition.onset[x]",
                    "path": "Condition.onset[x]",
                    "type": [{"code": "dateTime"}, {"code": "Period"}]
                }
            ]
        }
    }"#;

    #[test]
    fn test_deserialize_snapshot() {
        let profile: ProfileSnapshot = serde_json::from_str(CONDITION).unwrap();
        assert_eq!(profile.name, "ProfileConditionDiagnose");
        assert_eq!(profile.resource_type, "Condition");
        assert_eq!(profile.elements().len(), 3);

        let coding = profile.element_by_id("Condition.code.coding").unwrap();
        assert_eq!(coding.value_set(), Some("https://example.org/ValueSet/icd|2024"));
        assert!(coding.has_type("Coding"));

        let onset = profile.element_by_id("Condition.onset[x]").unwrap();
        assert_eq!(onset.type_codes(), vec!["dateTime", "Period"]);
    }

    #[test]
    fn test_require_element_error() {
        let profile: ProfileSnapshot = serde_json::from_str(CONDITION).unwrap();
        let err = profile.require_element("Condition.foo").unwrap_err();
        assert!(matches!(
            err,
            MappingError::ElementNotFound { ref profile, ref element_id }
                if profile == "ProfileConditionDiagnose" && element_id == "Condition.foo"
        ));
    }

    #[test]
    fn test_coding_to_term_code() {
        let coding = Coding {
            system: Some("http://loinc.org".into()),
            code: Some("8480-6".into()),
            display: None,
            version: None,
        };
        let tc = coding.to_term_code().unwrap();
        assert_eq!(tc.code, "8480-6");
        assert_eq!(tc.display, "");

        assert!(Coding::default().to_term_code().is_none());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = ProfileSnapshot::from_path(Path::new("/nonexistent/x-snapshot.json")).unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }
}
