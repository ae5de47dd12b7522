//! Term code extraction from element definitions.

use tracing::{debug, warn};

use crate::error::{MappingError, MappingResult};
use crate::model::{normalize_display, Coding, ElementDefinition, ProfileSnapshot, TermCode};
use crate::traits::TerminologyService;

/// Derives term codes from elements, consulting a terminology service for
/// value set expansions and displays.
#[derive(Clone, Copy)]
pub struct TermCodeExtractor<'t> {
    terminology: &'t dyn TerminologyService,
}

impl std::fmt::Debug for TermCodeExtractor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermCodeExtractor").finish_non_exhaustive()
    }
}

impl<'t> TermCodeExtractor<'t> {
    /// Creates an extractor backed by `terminology`.
    pub fn new(terminology: &'t dyn TerminologyService) -> Self {
        Self { terminology }
    }

    /// Term codes identifying a criterion, read from its defining element.
    ///
    /// Sources, first hit wins: `patternCoding`, the first coding of
    /// `patternCodeableConcept`, the expansion of the bound value set, and
    /// the `code`/`system` sub-elements. A bound value set whose expansion
    /// comes back empty yields no codes rather than an error.
    pub fn term_codes(
        &self,
        profile: &ProfileSnapshot,
        element: &ElementDefinition,
    ) -> MappingResult<Vec<TermCode>> {
        if let Some(term_code) = element.pattern_coding.as_ref().and_then(Coding::to_term_code) {
            return Ok(vec![self.with_display(term_code)]);
        }
        if let Some(term_code) = element
            .pattern_codeable_concept
            .as_ref()
            .and_then(|concept| concept.coding.first())
            .and_then(Coding::to_term_code)
        {
            return Ok(vec![self.with_display(term_code)]);
        }
        if let Some(value_set) = element.value_set() {
            let (url, version) = split_canonical(value_set);
            let codes = self.terminology.expand_value_set(url, version);
            if codes.is_empty() {
                warn!(value_set = %url, element = %element.id, "Value set expansion is empty");
            } else {
                debug!(value_set = %url, codes = codes.len(), "Expanded value set");
            }
            return Ok(codes);
        }
        if let Some(term_code) = sub_element_term_code(profile, element) {
            return Ok(vec![self.with_display(term_code)]);
        }
        Err(MappingError::TermCodeNotFound(element.id.clone()))
    }

    /// Codes an element is fixed to, used to qualify composite attributes.
    ///
    /// Sources, first hit wins: `fixedCodeableConcept`,
    /// `patternCodeableConcept`, `fixedCoding`, `patternCoding`, and the
    /// `code`/`system` sub-elements. Displays are looked up.
    pub fn fixed_term_codes(
        &self,
        profile: &ProfileSnapshot,
        element: &ElementDefinition,
    ) -> MappingResult<Vec<TermCode>> {
        let concept = element
            .fixed_codeable_concept
            .as_ref()
            .or(element.pattern_codeable_concept.as_ref());
        let codings: Vec<&Coding> = match concept {
            Some(concept) => concept.coding.iter().collect(),
            None => element
                .fixed_coding
                .as_ref()
                .or(element.pattern_coding.as_ref())
                .into_iter()
                .collect(),
        };

        let mut codes: Vec<TermCode> = codings
            .into_iter()
            .filter_map(Coding::to_term_code)
            .map(|t| self.lookup_display(t))
            .collect();
        if codes.is_empty() {
            if let Some(term_code) = sub_element_term_code(profile, element) {
                codes.push(self.lookup_display(term_code));
            }
        }
        if codes.is_empty() {
            return Err(MappingError::TermCodeNotFound(element.id.clone()));
        }
        Ok(codes)
    }

    /// Keeps an existing display, otherwise looks it up.
    fn with_display(&self, term_code: TermCode) -> TermCode {
        if term_code.display.is_empty() {
            self.lookup_display(term_code)
        } else {
            term_code
        }
    }

    /// Prefers the server display; falls back to the given display, then the code.
    fn lookup_display(&self, mut term_code: TermCode) -> TermCode {
        let display = self
            .terminology
            .lookup_display(&term_code.system, &term_code.code)
            .filter(|d| !d.is_empty())
            .or_else(|| Some(term_code.display.clone()).filter(|d| !d.is_empty()))
            .unwrap_or_else(|| term_code.code.clone());
        term_code.display = normalize_display(&display);
        term_code
    }
}

/// Splits `url|version`.
fn split_canonical(canonical: &str) -> (&str, Option<&str>) {
    match canonical.split_once('|') {
        Some((url, version)) if !version.is_empty() => (url, Some(version)),
        Some((url, _)) => (url, None),
        None => (canonical, None),
    }
}

/// Reads `{id}.system` and `{id}.code` pattern or fixed values.
fn sub_element_term_code(profile: &ProfileSnapshot, element: &ElementDefinition) -> Option<TermCode> {
    let code_element = profile.element_by_id(&format!("{}.code", element.id))?;
    let system_element = profile.element_by_id(&format!("{}.system", element.id))?;
    let code = code_element
        .pattern_code
        .as_ref()
        .or(code_element.fixed_code.as_ref())?;
    let system = system_element
        .pattern_uri
        .as_ref()
        .or(system_element.fixed_uri.as_ref())?;
    Some(TermCode::new(system.clone(), code.clone(), ""))
}
