//! Maps translated path expressions onto catalog search parameters.

use criteria_chain::fhirpath::{
    resource_type_of, shorten_path, strip_enclosing_parens, strip_trailing_cast,
};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{MappingError, MappingResult};
use crate::model::{SearchParameterCatalog, SearchParameterEntry};
use crate::resolver::EXTENSION_ROOT;

/// Matched parameters keyed by the expression that matched, in hop order.
pub type MatchedParameters<'a> = IndexMap<String, &'a SearchParameterEntry>;

/// Looks up search parameters for path expressions.
///
/// # Example
///
/// ```rust
/// use criteria_mapper::{SearchParameterCatalog, SearchParameterEntry, SearchParameterMatcher};
///
/// let catalog = SearchParameterCatalog::from_entries([SearchParameterEntry {
///     code: "code".into(),
///     expression: Some("Observation.code | Observation.valueCodeableConcept".into()),
///     base: vec!["Observation".into()],
///     param_type: "token".into(),
///     ..Default::default()
/// }]);
/// let matcher = SearchParameterMatcher::new(&catalog);
/// let matched = matcher.find(&["Observation.code".to_string()]).unwrap();
/// assert_eq!(matched["Observation.code"].code, "code");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SearchParameterMatcher<'a> {
    catalog: &'a SearchParameterCatalog,
}

impl<'a> SearchParameterMatcher<'a> {
    /// Creates a matcher over a catalog.
    pub fn new(catalog: &'a SearchParameterCatalog) -> Self {
        Self { catalog }
    }

    /// Finds a search parameter for every searchable candidate expression.
    ///
    /// Expressions rooted in an extension's own definition are skipped. A
    /// candidate without a direct match is retried without its trailing cast,
    /// then shortened segment by segment down to the resource root; the
    /// expression that finally matched becomes the key.
    pub fn find(&self, expressions: &[String]) -> MappingResult<MatchedParameters<'a>> {
        let candidates: Vec<&str> = expressions
            .iter()
            .filter(|e| !e.starts_with(EXTENSION_ROOT))
            .map(|e| strip_enclosing_parens(e))
            .collect();
        if candidates.is_empty() {
            return Err(MappingError::SearchParameterNotFound {
                expressions: expressions.to_vec(),
            });
        }

        let mut matched = MatchedParameters::new();
        let mut missing = Vec::new();
        for candidate in candidates {
            match self.match_with_fallback(candidate) {
                Some((expression, entry)) => {
                    debug!(
                        candidate = %candidate,
                        expression = %expression,
                        parameter = %entry.search_code(),
                        "Matched search parameter"
                    );
                    matched.insert(expression, entry);
                }
                None => missing.push(candidate.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(matched)
        } else {
            Err(MappingError::SearchParameterNotFound {
                expressions: missing,
            })
        }
    }

    /// Best catalog entry whose normalized expressions contain `expression`.
    ///
    /// Among several matches the entry covering the fewest expressions of
    /// the same resource type wins; ties keep the first entry seen.
    pub fn best_match(&self, expression: &str) -> Option<&'a SearchParameterEntry> {
        let resource_type = resource_type_of(expression);
        let mut best: Option<(&'a SearchParameterEntry, usize)> = None;
        for entry in self.catalog.entries() {
            if !entry.expressions.iter().any(|e| e == expression) {
                continue;
            }
            let overload = entry
                .expressions
                .iter()
                .filter(|e| resource_type_of(e) == resource_type)
                .count();
            if best.map_or(true, |(_, fewest)| overload < fewest) {
                best = Some((&entry.parameter, overload));
            }
        }
        best.map(|(entry, _)| entry)
    }

    fn match_with_fallback(&self, candidate: &str) -> Option<(String, &'a SearchParameterEntry)> {
        let mut current = candidate.to_string();
        loop {
            if let Some(entry) = self.best_match(&current) {
                return Some((current, entry));
            }
            let next = match strip_trailing_cast(&current) {
                Some(uncast) => strip_enclosing_parens(uncast).to_string(),
                None => shorten_path(&current)?,
            };
            trace!(from = %current, to = %next, "Retrying search parameter lookup");
            current = next;
        }
    }

    /// Joins matched parameters into a chained search string such as `subject.gender`.
    ///
    /// Every parameter must point to a resource type the next one is defined on.
    pub fn chain(&self, matched: &MatchedParameters<'a>) -> MappingResult<String> {
        let entries: Vec<&SearchParameterEntry> = matched.values().copied().collect();
        for pair in entries.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if !from.target.iter().any(|t| to.base.contains(t)) {
                return Err(MappingError::ChainValidity {
                    from: from.search_code().to_string(),
                    to: to.search_code().to_string(),
                    targets: from.target.clone(),
                    bases: to.base.clone(),
                });
            }
        }
        Ok(entries
            .iter()
            .map(|e| e.search_code())
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Finds the composite parameter combining exactly two matched parameters.
    ///
    /// The components may appear in either order. The returned key is
    /// `{first}.where({second})`.
    pub fn find_composite(
        &self,
        matched: &MatchedParameters<'a>,
    ) -> MappingResult<(String, &'a SearchParameterEntry)> {
        if matched.len() != 2 {
            return Err(MappingError::CompositeArity {
                count: matched.len(),
            });
        }
        let (path_1, first) = matched.get_index(0).ok_or(MappingError::CompositeArity { count: 0 })?;
        let (path_2, second) = matched.get_index(1).ok_or(MappingError::CompositeArity { count: 1 })?;
        let key = format!("{path_1}.where({path_2})");

        let found = self
            .catalog
            .entries()
            .iter()
            .map(|e| &e.parameter)
            .filter(|p| p.param_type == "composite")
            .find(|p| match p.component.as_slice() {
                [a, b, ..] => {
                    (a.definition == first.url && b.definition == second.url)
                        || (a.definition == second.url && b.definition == first.url)
                }
                _ => false,
            });

        match found {
            Some(parameter) => Ok((key, parameter)),
            None => Err(MappingError::SearchParameterNotFound {
                expressions: vec![key],
            }),
        }
    }
}
