//! CQL path rewriting.
//!
//! CQL paths are relative to the retrieved resource and use the method call
//! cast form:
//!
//! | Translated expression | CQL path |
//! |-----------------------|----------|
//! | `Observation.value as Quantity` | `value.as(Quantity)` |
//! | `(Observation.value as Quantity).code` | `value.as(Quantity).code` |
//! | `Specimen.extension.where(url='u').value as Reference` | `extension.where(url='u').first().value.as(Reference)` |
//!
//! The primary code path of each resource type comes from an ELM model info
//! document; a term code path equal to it is left out of the mapping.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use criteria_chain::fhirpath::{
    common_path_prefix_len, extract_where_clause, insert_first_after_extension_where, strip_cast,
    strip_resource_type, sub_path_equals, to_cql_cast,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::model::TermCode;
use crate::resolver::ResolvedChain;
use crate::translator::PathSegment;

// =============================================================================
// Model info
// =============================================================================

/// Primary code paths per resource type, read from an ELM model info document.
///
/// # Example
///
/// ```rust
/// use criteria_mapper::ModelInfo;
///
/// let info = ModelInfo::from_xml(r#"
///     <modelInfo xmlns="urn:hl7-org:elm-modelinfo:r1" name="FHIR">
///         <typeInfo xsi:type="ClassInfo" name="Condition" primaryCodePath="code"/>
///         <typeInfo xsi:type="ClassInfo" name="Patient"/>
///     </modelInfo>
/// "#).unwrap();
/// assert_eq!(info.primary_code_path("Condition"), Some("code"));
/// assert_eq!(info.primary_code_path("Patient"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    primary_code_paths: HashMap<String, String>,
}

impl ModelInfo {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a model info document from disk.
    pub fn from_path(path: &Path) -> MappingResult<Self> {
        let file = File::open(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let info = Self::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), types = info.len(), "Loaded model info");
        Ok(info)
    }

    /// Parses a model info document held in memory.
    pub fn from_xml(xml: &str) -> MappingResult<Self> {
        Self::from_reader(xml.as_bytes())
    }

    /// Parses a model info document, keeping every `typeInfo` that has both
    /// a `name` and a `primaryCodePath`.
    pub fn from_reader<R: BufRead>(reader: R) -> MappingResult<Self> {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);

        let mut info = Self::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"typeInfo" =>
                {
                    let mut name = None;
                    let mut primary = None;
                    for attribute in e.attributes().flatten() {
                        let value = attribute
                            .unescape_value()
                            .map_err(|err| MappingError::ModelInfo(err.to_string()))?
                            .to_string();
                        match attribute.key.local_name().as_ref() {
                            b"name" => name = Some(value),
                            b"primaryCodePath" => primary = Some(value),
                            _ => {}
                        }
                    }
                    if let (Some(name), Some(primary)) = (name, primary) {
                        info.primary_code_paths.insert(name, primary);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(MappingError::ModelInfo(format!(
                        "XML parse error at {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(info)
    }

    /// Adds or replaces an entry.
    pub fn with_primary_code_path(
        mut self,
        resource_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.primary_code_paths
            .insert(resource_type.into(), path.into());
        self
    }

    /// Primary code path of a resource type.
    pub fn primary_code_path(&self, resource_type: &str) -> Option<&str> {
        self.primary_code_paths
            .get(resource_type)
            .map(String::as_str)
    }

    /// Returns true if `path` is the resource type's primary code path or
    /// extends it.
    pub fn is_primary_path(&self, resource_type: &str, path: &str) -> bool {
        self.primary_code_path(resource_type)
            .is_some_and(|primary| sub_path_equals(primary, path))
    }

    /// Number of resource types with a primary code path.
    pub fn len(&self) -> usize {
        self.primary_code_paths.len()
    }

    /// Returns true if no primary code path is known.
    pub fn is_empty(&self) -> bool {
        self.primary_code_paths.is_empty()
    }
}

// =============================================================================
// Path rewriting
// =============================================================================

/// Rewrites one translated segment into CQL form.
///
/// ```rust
/// use criteria_mapper::cql::cql_segment;
///
/// assert_eq!(cql_segment("Observation.value as CodeableConcept"), "value.as(CodeableConcept)");
/// assert_eq!(
///     cql_segment("Condition.extension.where(url='u').value as Quantity"),
///     "extension.where(url='u').first().value.as(Quantity)"
/// );
/// ```
pub fn cql_segment(expression: &str) -> String {
    let relative = strip_resource_type(expression);
    insert_first_after_extension_where(&to_cql_cast(&relative))
}

/// CQL path of a whole chain: every segment rewritten, joined with `.`.
pub fn cql_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|s| cql_segment(&s.expression))
        .collect::<Vec<_>>()
        .join(".")
}

/// CQL path of a chain crossing a reference, ending in `.reference`.
///
/// The path stops at the segment holding the first Reference typed element,
/// since CQL joins the target with `such that ... contains 'Type/' + id`.
/// Chains without a reference fall back to [`cql_path`].
pub fn reference_path(chain: &ResolvedChain, segments: &[PathSegment]) -> String {
    let hops = chain.hops();
    let reference_segment = segments.iter().position(|segment| {
        hops.get(segment.hops.clone())
            .unwrap_or_default()
            .iter()
            .any(|hop| hop.element.has_type("Reference"))
    });
    match reference_segment {
        Some(last) => format!("{}.reference", cql_path(&segments[..=last])),
        None => cql_path(segments),
    }
}

/// Time restriction path: each segment without its resource node and cast.
///
/// ```rust
/// use criteria_mapper::cql::time_restriction_segment;
///
/// assert_eq!(time_restriction_segment("Condition.onset as dateTime"), "onset");
/// assert_eq!(time_restriction_segment("Condition"), "Condition");
/// ```
pub fn time_restriction_segment(expression: &str) -> String {
    match expression.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => strip_cast(rest).to_string(),
        _ => expression.to_string(),
    }
}

/// Time restriction path of a whole chain.
pub fn time_restriction_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|s| time_restriction_segment(&s.expression))
        .collect::<Vec<_>>()
        .join(".")
}

/// Combines the value and qualifier sides of a composite attribute.
///
/// The part both expressions share becomes the filtered element, the
/// qualifier's remainder is turned into an equality test against `code`, and
/// the value's remainder is appended:
///
/// ```rust
/// use criteria_mapper::cql::composite_path;
/// use criteria_mapper::TermCode;
///
/// let code = TermCode::new("http://loinc.org", "8480-6", "Systolic blood pressure");
/// let path = composite_path(
///     "Observation.component.value as Quantity",
///     "Observation.component.code",
///     &code,
/// ).unwrap();
/// assert_eq!(
///     path,
///     "component.where(code.coding.exists(system = 'http://loinc.org' and code = '8480-6')).value.as(Quantity)"
/// );
/// ```
pub fn composite_path(value: &str, qualifier: &str, code: &TermCode) -> MappingResult<String> {
    let prefix_len = common_path_prefix_len(value, qualifier);
    if prefix_len == 0 {
        return Err(MappingError::UnsupportedChain(format!(
            "composite sides '{value}' and '{qualifier}' share no element"
        )));
    }
    let shared = &value[..prefix_len];
    let qualifier_rest = qualifier[prefix_len..].trim_start_matches('.');
    let code_side = format!("{shared}.where({qualifier_rest})");

    let clause = extract_where_clause(&code_side, prefix_len).ok_or_else(|| {
        MappingError::UnsupportedChain(format!("no where clause in '{code_side}'"))
    })?;
    let condition = coding_condition(clause.body, code);
    let rewritten = format!(
        "{}{condition}{}",
        &code_side[..=clause.open()],
        &code_side[clause.end..]
    );

    let value_rest = &value[prefix_len..];
    let joined = if value_rest.is_empty() || value_rest.starts_with('.') {
        format!("{rewritten}{value_rest}")
    } else {
        format!("{rewritten}.{value_rest}")
    };
    Ok(cql_segment(&joined))
}

fn coding_condition(element: &str, code: &TermCode) -> String {
    let exists = format!(
        "exists(system = '{}' and code = '{}')",
        code.system, code.code
    );
    if element.is_empty() {
        return format!("coding.{exists}");
    }
    if element == "coding" || element.ends_with(".coding") {
        format!("{element}.{exists}")
    } else {
        format!("{element}.coding.{exists}")
    }
}
