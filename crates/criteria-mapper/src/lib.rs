//! # criteria-mapper
//!
//! Compiles querying metadata and FHIR profile snapshots into FHIR Search and
//! CQL mappings.
//!
//! This crate provides:
//! - **Profile Resolver**: Walk chained element ids across profiles, extension
//!   definitions and reference targets
//! - **Path Translator**: Turn resolved chains into FHIRPath-like expressions
//! - **Search Parameter Matcher**: Map expressions onto a search parameter
//!   catalog, with cast and path shortening fallbacks
//! - **CQL Rewriter**: CQL casts, `.first()` after extension filters,
//!   reference joins, composite `where` clauses and primary path elision
//! - **Assemblers**: Build complete mappings and term code indices per record,
//!   per profile or per module
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use criteria_mapper::{MapperConfig, MappingSession, NullTerminology};
//!
//! let config = MapperConfig::builder()
//!     .with_dataset_dir("resources/fdpg")
//!     .with_default_search_parameters("resources/search_parameters.json")
//!     .with_model_info("resources/fhir-modelinfo-4.0.1.xml")
//!     .build();
//! let terminology = NullTerminology;
//!
//! let mut session = MappingSession::new(&config, &terminology)?;
//! let report = session.run_module("Diagnose")?;
//! println!("{} mappings, {} failures", report.produced, report.failures.len());
//!
//! let output = session.into_output();
//! let json = serde_json::to_string_pretty(&output).unwrap();
//! # Ok::<(), criteria_mapper::MappingError>(())
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | [`ProfileResolver`] | `(Condition.extension:stage).value[x]` | `[Condition.extension:stage, Extension.value[x]]` |
//! | [`translate_chain`] | resolved chain | `Condition.extension.where(url='..').value as CodeableConcept` |
//! | [`SearchParameterMatcher`] | expressions | `stage` |
//! | [`cql::cql_path`] | expressions | `extension.where(url='..').first().value.as(CodeableConcept)` |
//!
//! ## Value Types
//!
//! | Element type | Value type |
//! |--------------|------------|
//! | `CodeableConcept`, `Coding`, `code` | `concept` |
//! | `Quantity` | `quantity` |
//! | `Reference` | `reference` |
//! | anything else | the FHIR type code |
//!
//! ## Feature Flags
//!
//! - `parallel` - Assembles the profiles of a module on a rayon pool when
//!   [`MapperConfig::parallel`] is set
//!
//! ## Errors
//!
//! Every failure of a single criterion is a [`MappingError`] for which
//! [`MappingError::is_recoverable`] returns `true`; module runs collect these
//! in [`RunReport::failures`] and continue.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod assembler;
mod config;
pub mod cql;
mod error;
mod matcher;
mod model;
mod resolver;
mod termcode;
mod traits;
mod translator;

// Public re-exports
pub use assembler::{
    attribute_key, value_type_of, CqlAssembler, CriterionFailure, FhirSearchAssembler,
    MappingContext, MappingOutput, MappingSession, RunReport,
};
pub use config::{MapperConfig, MapperConfigBuilder};
pub use cql::ModelInfo;
pub use error::{MappingError, MappingResult};
pub use matcher::{MatchedParameters, SearchParameterMatcher};
pub use model::{
    normalize_display, AttributeSpec, CatalogEntry, CodeableConcept, Coding,
    CqlAttributeSearchParameter, CqlMapping, ElementBinding, ElementDefinition, ElementType,
    FhirAttributeSearchParameter, FhirMapping, FixedCriterion, FixedCriterionDefault,
    KindDefaults, MappingIndex, MappingKind, ModuleRef, ProfileSnapshot, QueryingMetadata,
    SearchParameterCatalog, SearchParameterComponent, SearchParameterEntry, Snapshot, TermCode,
    ALLOWED_VALUE_TYPES, STRUCTURE_DEFINITION_SYSTEM,
};
pub use resolver::{ProfileResolver, ResolvedChain, ResolvedHop, EXTENSION_ROOT};
pub use termcode::TermCodeExtractor;
pub use traits::{InMemoryTerminology, NullTerminology, TerminologyService};
pub use translator::{element_type, join_segments, polymorphic_type, translate_chain, PathSegment};

// Re-export the chain grammar for convenience
pub use criteria_chain::{parse, parse_composite, ChainError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let _: Option<MapperConfig> = None;
        let _: Option<MappingOutput> = None;
        let _: Option<RunReport> = None;
        let _: Option<ResolvedChain> = None;
        let _: Option<MappingResult<()>> = None;
        let _: Option<Box<dyn TerminologyService>> = None;
        assert_eq!(MappingKind::ALL.len(), 9);
    }
}
