//! The terminology contract consumed by mapping generation.
//!
//! This crate never talks to a terminology server itself. Term code
//! extraction only needs two capabilities, captured by [`TerminologyService`].
//! `criteria-terminology` provides an HTTP implementation plus caching and
//! offline replay; tests and offline runs can use [`InMemoryTerminology`].
//!
//! # Example: A custom service
//!
//! ```rust
//! use criteria_mapper::{TermCode, TerminologyService};
//!
//! struct Fixed;
//!
//! impl TerminologyService for Fixed {
//!     fn lookup_display(&self, _system: &str, code: &str) -> Option<String> {
//!         Some(format!("Code {code}"))
//!     }
//!
//!     fn expand_value_set(&self, _url: &str, _version: Option<&str>) -> Vec<TermCode> {
//!         vec![TermCode::new("http://fhir.de/CodeSystem/bfarm/icd-10-gm", "I10", "")]
//!     }
//! }
//!
//! assert_eq!(Fixed.lookup_display("s", "1").as_deref(), Some("Code 1"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::TermCode;

/// Access to a FHIR terminology server.
///
/// Implementations degrade failures to empty results: a missing display is
/// `None`, a failed expansion is an empty list. Mapping generation never
/// aborts because of the terminology server.
pub trait TerminologyService: Send + Sync {
    /// Display of a code (`CodeSystem/$lookup`).
    fn lookup_display(&self, system: &str, code: &str) -> Option<String>;

    /// Codes contained in a value set (`ValueSet/$expand`).
    ///
    /// The result is sorted by (system, code) without duplicates.
    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode>;
}

impl<T: TerminologyService + ?Sized> TerminologyService for &T {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        (**self).lookup_display(system, code)
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        (**self).expand_value_set(url, version)
    }
}

impl<T: TerminologyService + ?Sized> TerminologyService for Arc<T> {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        (**self).lookup_display(system, code)
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        (**self).expand_value_set(url, version)
    }
}

/// A service that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTerminology;

impl TerminologyService for NullTerminology {
    fn lookup_display(&self, _system: &str, _code: &str) -> Option<String> {
        None
    }

    fn expand_value_set(&self, _url: &str, _version: Option<&str>) -> Vec<TermCode> {
        Vec::new()
    }
}

/// A service answering from fixed tables.
///
/// Expansions are keyed by value set URL and ignore the version.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerminology {
    displays: HashMap<(String, String), String>,
    expansions: HashMap<String, Vec<TermCode>>,
}

impl InMemoryTerminology {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a display for (system, code).
    pub fn with_display(
        mut self,
        system: impl Into<String>,
        code: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        self.displays
            .insert((system.into(), code.into()), display.into());
        self
    }

    /// Adds the expansion of a value set.
    pub fn with_expansion(mut self, url: impl Into<String>, codes: Vec<TermCode>) -> Self {
        let mut codes = codes;
        codes.sort();
        codes.dedup();
        self.expansions.insert(url.into(), codes);
        self
    }
}

impl TerminologyService for InMemoryTerminology {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        self.displays
            .get(&(system.to_string(), code.to_string()))
            .cloned()
    }

    fn expand_value_set(&self, url: &str, _version: Option<&str>) -> Vec<TermCode> {
        self.expansions.get(url).cloned().unwrap_or_default()
    }
}
