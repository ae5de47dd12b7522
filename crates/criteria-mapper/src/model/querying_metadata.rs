//! Querying metadata records: which elements of a profile define a criterion.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};
use crate::model::TermCode;

/// Value types a record may declare explicitly.
pub const ALLOWED_VALUE_TYPES: &[&str] = &[
    "code",
    "concept",
    "quantity",
    "Age",
    "reference",
    "integer",
    "calculated",
    "date",
];

/// Module a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    /// Module code.
    pub code: String,
    /// Module display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Per-attribute overrides of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Display name of the attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit attribute type (`composite`, `reference`, `concept`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<String>,
    /// Whether the attribute may be omitted in a query.
    #[serde(default = "default_true")]
    pub optional: bool,
}

impl Default for AttributeSpec {
    fn default() -> Self {
        Self {
            name: None,
            attribute_type: None,
            optional: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Describes how one criterion is extracted from a profile.
///
/// # Example
///
/// ```rust
/// use criteria_mapper::QueryingMetadata;
///
/// let record: QueryingMetadata = serde_json::from_str(r#"{
///     "name": "Diagnose",
///     "resource_type": "Condition",
///     "context": {"system": "fdpg.mii.cds", "code": "Diagnose", "display": "Diagnose"},
///     "term_code_defining_id": "Condition.code.coding:icd10-gm"
/// }"#).unwrap();
/// assert!(record.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryingMetadata {
    /// Logical mapping name; defaults to the resource type.
    #[serde(default)]
    pub name: String,
    /// Context term code shared by all term codes of the criterion.
    pub context: TermCode,
    /// Owning module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleRef>,
    /// FHIR resource type the record applies to.
    #[serde(alias = "resourceType")]
    pub resource_type: String,
    /// Explicit value type; inferred from the profile when absent.
    #[serde(default, alias = "valueType", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Element carrying the criterion value.
    #[serde(default, alias = "valueDefiningId", skip_serializing_if = "Option::is_none")]
    pub value_defining_id: Option<String>,
    /// Whether the value may be omitted.
    #[serde(default = "default_true")]
    pub value_optional: bool,
    /// Element carrying the criterion's term code.
    #[serde(default, alias = "termCodeDefiningId", skip_serializing_if = "Option::is_none")]
    pub term_code_defining_id: Option<String>,
    /// Explicit term codes, used instead of the defining element's codes.
    #[serde(default, alias = "termCodes", skip_serializing_if = "Option::is_none")]
    pub term_codes: Option<Vec<TermCode>>,
    /// Attribute element ids with their overrides, in declaration order.
    #[serde(default, alias = "attributeDefiningIds")]
    pub attribute_defining_id_type_map: IndexMap<String, AttributeSpec>,
    /// Element restricting the criterion in time.
    #[serde(
        default,
        alias = "timeRestrictionDefiningId",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_restriction_defining_id: Option<String>,
}

impl QueryingMetadata {
    /// Reads a record from disk, filling in the default name.
    pub fn from_path(path: &Path) -> MappingResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut record: Self =
            serde_json::from_str(&content).map_err(|source| MappingError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        record.fill_defaults();
        Ok(record)
    }

    /// Sets `name` to the resource type when missing.
    pub fn fill_defaults(&mut self) {
        if self.name.is_empty() {
            self.name = self.resource_type.clone();
        }
    }

    /// Logical mapping name.
    pub fn mapping_name(&self) -> &str {
        if self.name.is_empty() {
            &self.resource_type
        } else {
            &self.name
        }
    }

    /// Checks the record for a usable term code source and a known value type.
    pub fn validate(&self) -> MappingResult<()> {
        let invalid = |reason: String| MappingError::InvalidMetadata {
            name: self.mapping_name().to_string(),
            reason,
        };
        if self.resource_type.is_empty() {
            return Err(invalid("resource_type is empty".to_string()));
        }
        if self.term_code_defining_id.is_none() && self.term_codes.is_none() {
            return Err(invalid(
                "either term_code_defining_id or term_codes must be provided".to_string(),
            ));
        }
        if let Some(value_type) = &self.value_type {
            if !ALLOWED_VALUE_TYPES.contains(&value_type.as_str()) {
                return Err(invalid(format!("value type '{value_type}' is not supported")));
            }
        }
        Ok(())
    }
}
