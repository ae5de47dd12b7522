//! Translates resolved chains into FHIRPath-like expressions.

use std::ops::Range;

use criteria_chain::fhirpath::{
    is_polymorphic, polymorphic_base_id, polymorphic_choice_id, replace_polymorphic_with_cast,
};
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::model::{ElementDefinition, ProfileSnapshot};
use crate::resolver::{ResolvedChain, ResolvedHop, EXTENSION_ROOT};

/// One translated expression and the hops it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// The expression, rooted at the hop's resource or data type.
    pub expression: String,
    /// Indices into the resolved chain covered by this segment.
    pub hops: Range<usize>,
}

/// Picks the concrete type of an element.
///
/// A single declared type wins. Two special pairs are disambiguated:
/// `{dateTime, Period}` to `dateTime` and `{Reference, CodeableConcept}` to
/// `CodeableConcept`.
pub fn element_type(element: &ElementDefinition) -> MappingResult<String> {
    let codes = element.type_codes();
    match codes.as_slice() {
        [] => Err(MappingError::MissingElementType(element.id.clone())),
        [single] => Ok((*single).to_string()),
        many => {
            let has = |code: &str| many.contains(&code);
            if many.len() == 2 && has("dateTime") && has("Period") {
                Ok("dateTime".to_string())
            } else if many.len() == 2 && has("Reference") && has("CodeableConcept") {
                Ok("CodeableConcept".to_string())
            } else {
                Err(MappingError::AmbiguousType {
                    element_id: element.id.clone(),
                    types: many.iter().map(|c| c.to_string()).collect(),
                })
            }
        }
    }
}

/// Type of a polymorphic element, read from the element declaring the `[x]` choice.
///
/// The type slice (`value[x]:valueQuantity`) is preferred over the bare
/// choice element; the element itself is used if neither exists.
pub fn polymorphic_type(
    profile: &ProfileSnapshot,
    element: &ElementDefinition,
) -> MappingResult<String> {
    let declaring = polymorphic_base_id(&element.id)
        .and_then(|id| profile.element_by_id(id))
        .or_else(|| polymorphic_choice_id(&element.id).and_then(|id| profile.element_by_id(id)))
        .unwrap_or(element);
    element_type(declaring)
}

/// Translates every hop of a chain into path segments.
///
/// An extension hop absorbs the hop that follows it when that hop is the
/// extension's `value[x]` or a nested `extension:{slice}.value[x]`.
pub fn translate_chain(chain: &ResolvedChain) -> MappingResult<Vec<PathSegment>> {
    let hops = chain.hops();
    let mut segments = Vec::with_capacity(hops.len());
    let mut i = 0;
    while i < hops.len() {
        let hop = &hops[i];
        let segment = match extension_url(&hop.element) {
            Some(url) => translate_extension(hop, hops.get(i + 1), url, i)?,
            None => PathSegment {
                expression: translate_element(hop)?,
                hops: i..i + 1,
            },
        };
        i = segment.hops.end;
        segments.push(segment);
    }
    debug!(
        segments = ?segments.iter().map(|s| s.expression.as_str()).collect::<Vec<_>>(),
        "Translated chain"
    );
    Ok(segments)
}

/// Joins segment expressions with `.`.
pub fn join_segments(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|s| s.expression.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn extension_url(element: &ElementDefinition) -> Option<&str> {
    element
        .find_type("Extension")?
        .profile
        .first()
        .map(String::as_str)
}

fn translate_element(hop: &ResolvedHop) -> MappingResult<String> {
    let element = &hop.element;
    let mut expression = element.path.clone();
    if is_polymorphic(&expression) {
        let type_code = polymorphic_type(&hop.profile, element)?;
        expression = replace_polymorphic_with_cast(&expression, &type_code);
    }
    if element.value_set().is_some() {
        if let Some(parent) = expression.strip_suffix(".coding") {
            expression = parent.to_string();
        }
    }
    Ok(expression)
}

fn translate_extension(
    hop: &ResolvedHop,
    next: Option<&ResolvedHop>,
    url: &str,
    index: usize,
) -> MappingResult<PathSegment> {
    let base = format!("{}.where(url='{url}')", hop.element.path);
    let Some(next) = next else {
        return Ok(PathSegment {
            expression: base,
            hops: index..index + 1,
        });
    };

    let value_id = format!("{EXTENSION_ROOT}.value[x]");
    let merged = if next.id() == value_id {
        Some(format!("{base}.value[x]"))
    } else {
        nested_slice(next.id()).map(|slice| format!("{base}.extension.where(url='{slice}').value[x]"))
    };

    match merged {
        Some(expression) => {
            let type_code = polymorphic_type(&next.profile, &next.element)?;
            Ok(PathSegment {
                expression: replace_polymorphic_with_cast(&expression, &type_code),
                hops: index..index + 2,
            })
        }
        None => Ok(PathSegment {
            expression: base,
            hops: index..index + 1,
        }),
    }
}

/// Slice name of an `Extension.extension:{slice}.value[x]` id.
fn nested_slice(id: &str) -> Option<&str> {
    id.strip_prefix(EXTENSION_ROOT)?
        .strip_prefix(".extension:")?
        .strip_suffix(".value[x]")
        .filter(|slice| !slice.is_empty() && !slice.contains('.'))
}
