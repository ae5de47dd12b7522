//! Coded concept identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// System used for attribute keys derived from element ids.
pub const STRUCTURE_DEFINITION_SYSTEM: &str = "http://hl7.org/fhir/StructureDefinition";

/// A (system, code, display) triple identifying a coded concept.
///
/// Equality, hashing and ordering only look at `system` and `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermCode {
    /// Code system URL.
    pub system: String,
    /// Code within the system.
    pub code: String,
    /// Human readable display.
    #[serde(default)]
    pub display: String,
    /// Code system version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TermCode {
    /// Creates a term code without a version.
    pub fn new(
        system: impl Into<String>,
        code: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: display.into(),
            version: None,
        }
    }

    /// Sets the code system version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Creates an attribute key for an element-derived code.
    pub fn attribute_key(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::new(STRUCTURE_DEFINITION_SYSTEM, code.clone(), code)
    }
}

impl PartialEq for TermCode {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system && self.code == other.code
    }
}

impl Eq for TermCode {}

impl Hash for TermCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system.hash(state);
        self.code.hash(state);
    }
}

impl PartialOrd for TermCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermCode {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.system, &self.code).cmp(&(&other.system, &other.code))
    }
}

impl fmt::Display for TermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.system, self.code)?;
        if !self.display.is_empty() {
            write!(f, " |{}|", self.display)?;
        }
        Ok(())
    }
}

/// Title-cases a display that is written in all capitals.
///
/// Other displays are returned unchanged.
pub fn normalize_display(display: &str) -> String {
    let has_letters = display.chars().any(char::is_alphabetic);
    if !has_letters || display.chars().any(char::is_lowercase) {
        return display.to_string();
    }
    display
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
