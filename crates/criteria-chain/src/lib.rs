//! # criteria-chain
//!
//! Grammar and path-expression algebra for chained FHIR element ids.
//!
//! This crate provides:
//! - **Chain Parser**: Parse chained element ids that cross extension and
//!   reference boundaries into the flat token sequence a profile resolver walks
//! - **Composite Ids**: Split `P.where(Q)` attribute ids into value and qualifier sides
//! - **Path Algebra**: Balanced-parenthesis scanning, cast rewriting and segment
//!   operations over FHIRPath-like expressions
//!
//! ## Chain Syntax
//!
//! | Form | Meaning | Example |
//! |------|---------|---------|
//! | `id` | A single element of the current profile | `Condition.code.coding` |
//! | `(chain).id` | Continue into the extension or reference target | `(Condition.extension:stage).value[x]` |
//! | `((chain).id).id` | Cross more than one boundary | `((Specimen.extension:a).extension:b).value[x]` |
//! | `P.where(Q)` | Composite attribute (value `P`, code-fixing sibling `Q`) | `Observation.component.where(Observation.component:s.code):s.value[x]` |
//!
//! ## Usage
//!
//! ```rust
//! use criteria_chain::{parse, parse_composite};
//!
//! let tokens = parse("(Condition.extension:stage).value[x]").unwrap();
//! assert_eq!(tokens, vec!["Condition.extension:stage", "value[x]"]);
//!
//! assert!(parse_composite("Condition.code").unwrap().is_none());
//! ```
//!
//! ## Path Algebra
//!
//! ```rust
//! use criteria_chain::fhirpath::{replace_polymorphic_with_cast, to_cql_cast};
//!
//! let search = replace_polymorphic_with_cast("Observation.value[x]", "Quantity");
//! assert_eq!(search, "Observation.value as Quantity");
//! assert_eq!(to_cql_cast("value as Quantity"), "value.as(Quantity)");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
mod error;
pub mod fhirpath;
mod parser;

pub use ast::{ChainNode, CompositeId};
pub use error::{ChainError, ChainResult};
pub use parser::{parse, parse_composite, parse_tree};
