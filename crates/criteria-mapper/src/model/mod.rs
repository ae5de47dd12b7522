//! Input documents and output records.
//!
//! Inputs are read-only views of FHIR StructureDefinition snapshots,
//! SearchParameter definitions and querying metadata records. Outputs are
//! the FHIR Search and CQL mappings plus the index from term codes to
//! mapping names.

mod kind;
mod mapping;
mod querying_metadata;
pub(crate) mod search_parameter;
mod structure_definition;
mod term_code;

// Re-export term code types
pub use term_code::{normalize_display, TermCode, STRUCTURE_DEFINITION_SYSTEM};

// Re-export snapshot types
pub use structure_definition::{
    CodeableConcept, Coding, ElementBinding, ElementDefinition, ElementType, ProfileSnapshot,
    Snapshot,
};

// Re-export metadata types
pub use querying_metadata::{AttributeSpec, ModuleRef, QueryingMetadata, ALLOWED_VALUE_TYPES};

// Re-export catalog types
pub use search_parameter::{
    CatalogEntry, SearchParameterCatalog, SearchParameterComponent, SearchParameterEntry,
};

// Re-export output types
pub use kind::{FixedCriterionDefault, KindDefaults, MappingKind};
pub use mapping::{
    CqlAttributeSearchParameter, CqlMapping, FhirAttributeSearchParameter, FhirMapping,
    FixedCriterion, MappingIndex,
};
