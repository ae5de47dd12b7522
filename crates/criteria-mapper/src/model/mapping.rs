//! Output records: FHIR Search and CQL mappings plus their term code index.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::model::TermCode;

/// A criterion that is always part of the generated FHIR query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedCriterion {
    /// `code` or `coding`.
    #[serde(rename = "type")]
    pub criterion_type: String,
    /// Search parameter restricted by the criterion.
    pub search_parameter: String,
    /// Element path restricted by the criterion.
    pub fhir_path: String,
    /// Accepted values.
    pub value: Vec<TermCode>,
}

impl FixedCriterion {
    /// Creates a fixed criterion.
    pub fn new(
        criterion_type: &str,
        search_parameter: &str,
        fhir_path: &str,
        value: Vec<TermCode>,
    ) -> Self {
        Self {
            criterion_type: criterion_type.to_string(),
            search_parameter: search_parameter.to_string(),
            fhir_path: fhir_path.to_string(),
            value,
        }
    }
}

/// How an attribute translates into a FHIR Search query snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirAttributeSearchParameter {
    /// Attribute value type, `composite-quantity` style types included.
    pub attribute_type: String,
    /// Key identifying the attribute within the criterion.
    pub attribute_key: TermCode,
    /// Search parameter (possibly chained) filtering on the attribute.
    pub attribute_search_parameter: String,
    /// Code fixed by the qualifier of a composite attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_code: Option<TermCode>,
}

/// Everything needed to translate a criterion into a FHIR Search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirMapping {
    /// Logical mapping name.
    pub name: String,
    /// Resource type searched.
    pub fhir_resource_type: String,
    /// Search parameter matching the criterion's term codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_code_search_parameter: Option<String>,
    /// Search parameter filtering on the criterion value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_search_parameter: Option<String>,
    /// Value type of the criterion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Search parameter used for time restrictions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_restriction_parameter: Option<String>,
    /// Criteria added to every query.
    pub fixed_criteria: Vec<FixedCriterion>,
    /// Attribute search parameters in declaration order.
    pub attribute_search_parameters: Vec<FhirAttributeSearchParameter>,
}

/// How an attribute translates into a CQL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CqlAttributeSearchParameter {
    /// Attribute value type.
    pub attribute_type: String,
    /// Key identifying the attribute within the criterion.
    pub attribute_key: TermCode,
    /// CQL path of the attribute relative to the resource.
    pub attribute_path: String,
    /// Resource type a reference attribute points to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_target_type: Option<String>,
    /// Code fixed by the qualifier of a composite attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_code: Option<TermCode>,
}

/// Everything needed to translate a criterion into a CQL query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CqlMapping {
    /// Logical mapping name.
    pub name: String,
    /// Resource type retrieved.
    pub resource_type: String,
    /// Term code path; omitted when it is the resource's primary code path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_code_fhir_path: Option<String>,
    /// Value path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_fhir_path: Option<String>,
    /// Value type of the criterion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Time restriction path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_restriction_fhir_path: Option<String>,
    /// Attribute paths in declaration order.
    pub attribute_search_parameters: Vec<CqlAttributeSearchParameter>,
}

/// Maps (context, term code) pairs to mapping names.
///
/// Later inserts overwrite earlier ones. Iteration and serialization are
/// ordered by (context, key).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingIndex {
    entries: BTreeMap<(TermCode, TermCode), String>,
}

#[derive(Serialize)]
struct IndexEntry<'a> {
    context: &'a TermCode,
    key: &'a TermCode,
    name: &'a str,
}

impl MappingIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the mapping name for a (context, term code) pair.
    pub fn insert(&mut self, context: TermCode, key: TermCode, name: impl Into<String>) {
        self.entries.insert((context, key), name.into());
    }

    /// Returns the mapping name for a pair.
    pub fn get(&self, context: &TermCode, key: &TermCode) -> Option<&str> {
        self.entries
            .get(&(context.clone(), key.clone()))
            .map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries ordered by (context, key).
    pub fn iter(&self) -> impl Iterator<Item = (&TermCode, &TermCode, &str)> {
        self.entries
            .iter()
            .map(|((context, key), name)| (context, key, name.as_str()))
    }

    /// Moves every entry of `other` into this index.
    pub fn extend(&mut self, other: MappingIndex) {
        self.entries.extend(other.entries);
    }
}

impl Serialize for MappingIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.iter()
                .map(|(context, key, name)| IndexEntry { context, key, name }),
        )
    }
}
