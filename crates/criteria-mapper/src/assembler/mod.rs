//! Mapping assembly: querying metadata plus a profile in, mappings out.
//!
//! [`FhirSearchAssembler`] and [`CqlAssembler`] turn one record into one
//! mapping each. [`MappingSession`] drives them over whole modules, keeps the
//! per-run name cache and collects the term code indices.

mod cql;
mod fhir_search;
mod session;

use std::path::Path;
use std::sync::Arc;

use criteria_chain::fhirpath::{attribute_key_code, is_polymorphic};
use criteria_chain::parse_composite;

use crate::config::MapperConfig;
use crate::cql::ModelInfo;
use crate::error::{MappingError, MappingResult};
use crate::model::{AttributeSpec, ProfileSnapshot, QueryingMetadata, SearchParameterCatalog, TermCode};
use crate::resolver::{ProfileResolver, ResolvedChain, ResolvedHop};
use crate::termcode::TermCodeExtractor;
use crate::traits::TerminologyService;
use crate::translator::{element_type, join_segments, polymorphic_type, translate_chain, PathSegment};

pub use cql::CqlAssembler;
pub use fhir_search::FhirSearchAssembler;
pub use session::{CriterionFailure, MappingOutput, MappingSession, RunReport};

/// Read-only inputs shared by every assembly of a run.
#[derive(Clone, Copy)]
pub struct MappingContext<'a> {
    /// Dataset layout.
    pub config: &'a MapperConfig,
    /// Search parameters of the module being assembled.
    pub catalog: &'a SearchParameterCatalog,
    /// Primary code paths for CQL.
    pub model_info: &'a ModelInfo,
    /// Terminology server access.
    pub terminology: &'a dyn TerminologyService,
}

impl std::fmt::Debug for MappingContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("config", self.config)
            .field("catalog_entries", &self.catalog.len())
            .field("model_info_types", &self.model_info.len())
            .finish_non_exhaustive()
    }
}

/// A resolved chained id and its translated segments.
#[derive(Debug, Clone)]
pub(crate) struct Translated {
    pub chain: ResolvedChain,
    pub segments: Vec<PathSegment>,
}

impl Translated {
    pub fn expressions(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.expression.clone()).collect()
    }

    pub fn terminal(&self) -> MappingResult<&ResolvedHop> {
        self.chain
            .last()
            .ok_or_else(|| MappingError::UnsupportedChain("empty chain".to_string()))
    }

    /// Whether the chain passes through a Reference: a Reference typed hop
    /// it continues past, or a terminal element resolving to `reference`.
    pub fn crosses_reference(&self) -> bool {
        let Some((terminal, inner)) = self.chain.hops().split_last() else {
            return false;
        };
        inner.iter().any(|hop| hop.element.has_type("Reference"))
            || matches!(value_type_of(terminal).as_deref(), Ok("reference"))
    }
}

/// The two sides of a composite attribute, each translated on its own.
#[derive(Debug, Clone)]
pub(crate) struct Composite {
    pub value: ResolvedHop,
    pub qualifier: ResolvedHop,
    pub value_expression: String,
    pub qualifier_expression: String,
}

impl<'a> MappingContext<'a> {
    /// Creates a context.
    pub fn new(
        config: &'a MapperConfig,
        catalog: &'a SearchParameterCatalog,
        model_info: &'a ModelInfo,
        terminology: &'a dyn TerminologyService,
    ) -> Self {
        Self {
            config,
            catalog,
            model_info,
            terminology,
        }
    }

    /// Resolver over the configured dataset.
    pub fn resolver(&self) -> ProfileResolver<'a> {
        ProfileResolver::new(self.config)
    }

    /// Term code extractor over the configured terminology service.
    pub fn extractor(&self) -> TermCodeExtractor<'a> {
        TermCodeExtractor::new(self.terminology)
    }

    /// Term codes a record is indexed under.
    ///
    /// Explicit codes on the record win; otherwise they are read from the
    /// terminal element of the term code defining chain.
    pub fn term_codes(
        &self,
        metadata: &QueryingMetadata,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<Vec<TermCode>> {
        if let Some(codes) = metadata.term_codes.as_ref().filter(|c| !c.is_empty()) {
            return Ok(codes.clone());
        }
        let Some(id) = metadata.term_code_defining_id.as_deref() else {
            return Err(MappingError::InvalidMetadata {
                name: metadata.mapping_name().to_string(),
                reason: "no term code source".to_string(),
            });
        };
        let chain = self.resolver().resolve(id, profile, package_dir)?;
        let terminal = chain
            .last()
            .ok_or_else(|| MappingError::TermCodeNotFound(id.to_string()))?;
        self.extractor()
            .term_codes(&terminal.profile, &terminal.element)
    }

    pub(crate) fn translate(
        &self,
        id: &str,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<Translated> {
        let chain = self.resolver().resolve(id, profile, package_dir)?;
        let segments = translate_chain(&chain)?;
        Ok(Translated { chain, segments })
    }

    /// Resolves a composite attribute into its value and qualifier elements.
    ///
    /// `P.where(Q)` ids resolve both sides separately; any other id must
    /// resolve to exactly two elements, value first.
    pub(crate) fn composite(
        &self,
        id: &str,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<Composite> {
        let resolver = self.resolver();
        let mut hops: Vec<ResolvedHop> = match parse_composite(id)? {
            Some(composite) => {
                let value = resolver.resolve(&composite.value, profile, package_dir)?;
                let qualifier = resolver.resolve(&composite.qualifier, profile, package_dir)?;
                value
                    .hops()
                    .iter()
                    .chain(qualifier.hops())
                    .cloned()
                    .collect()
            }
            None => resolver
                .resolve(id, profile, package_dir)?
                .hops()
                .to_vec(),
        };
        if hops.len() != 2 {
            return Err(MappingError::CompositeArity { count: hops.len() });
        }
        let qualifier = hops.pop().ok_or(MappingError::CompositeArity { count: 1 })?;
        let value = hops.pop().ok_or(MappingError::CompositeArity { count: 0 })?;

        let side = |hop: &ResolvedHop| -> MappingResult<String> {
            let chain = ResolvedChain::from_hops(vec![hop.clone()]);
            Ok(join_segments(&translate_chain(&chain)?))
        };
        Ok(Composite {
            value_expression: side(&value)?,
            qualifier_expression: side(&qualifier)?,
            value,
            qualifier,
        })
    }

    /// Code fixing the qualifier side of a composite attribute.
    pub(crate) fn composite_code(&self, composite: &Composite) -> MappingResult<TermCode> {
        let hop = &composite.qualifier;
        self.extractor()
            .fixed_term_codes(&hop.profile, &hop.element)?
            .into_iter()
            .next()
            .ok_or_else(|| MappingError::TermCodeNotFound(hop.element.id.clone()))
    }
}

/// Whether an attribute goes through composite resolution: an explicit
/// `composite` type, or no type and the `P.where(Q)` form.
pub(crate) fn is_composite(id: &str, spec: &AttributeSpec) -> MappingResult<bool> {
    match spec.attribute_type.as_deref() {
        Some(explicit) => Ok(explicit == "composite"),
        None => Ok(parse_composite(id)?.is_some()),
    }
}

/// Whether a resolved attribute is mapped as a reference: an explicit
/// `reference` type, or no type and a Reference typed terminal element.
pub(crate) fn is_reference(spec: &AttributeSpec, translated: &Translated) -> MappingResult<bool> {
    match spec.attribute_type.as_deref() {
        Some(explicit) => Ok(explicit == "reference"),
        None => Ok(value_type_of(translated.terminal()?)? == "reference"),
    }
}

/// Value type of a resolved element.
///
/// Coded types collapse to `concept`, `Quantity` to `quantity` and
/// `Reference` to `reference`; other FHIR types are kept as they are.
pub fn value_type_of(hop: &ResolvedHop) -> MappingResult<String> {
    let type_code = if is_polymorphic(&hop.element.id) {
        polymorphic_type(&hop.profile, &hop.element)?
    } else {
        element_type(&hop.element)?
    };
    let value_type = match type_code.as_str() {
        "CodeableConcept" | "Coding" | "code" => "concept".to_string(),
        "Quantity" => "quantity".to_string(),
        "Reference" => "reference".to_string(),
        _ => type_code,
    };
    Ok(value_type)
}

/// Attribute key of a non-composite attribute.
pub fn attribute_key(id: &str) -> TermCode {
    TermCode::attribute_key(attribute_key_code(id).unwrap_or(id))
}

/// Value type of a record: the explicit override, else inferred from the
/// terminal element.
pub(crate) fn record_value_type(
    metadata: &QueryingMetadata,
    value: Option<&Translated>,
) -> MappingResult<Option<String>> {
    if let Some(explicit) = &metadata.value_type {
        return Ok(Some(explicit.clone()));
    }
    match value {
        Some(translated) => value_type_of(translated.terminal()?).map(Some),
        None => Ok(None),
    }
}
