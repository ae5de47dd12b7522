//! Segment-level operations on dotted path expressions.

use super::cast::to_operator_cast;
use super::scan::{is_balanced, last_top_level_dot, matching_close, split_top_level};

/// Splits a search parameter expression into its `|` alternatives.
///
/// Each alternative is trimmed, unwrapped from enclosing parentheses and
/// normalized to the operator cast form.
///
/// ```rust
/// use criteria_chain::fhirpath::split_alternatives;
///
/// assert_eq!(
///     split_alternatives("Condition.onset.as(dateTime) | (Condition.recordedDate)"),
///     vec!["Condition.onset as dateTime", "Condition.recordedDate"]
/// );
/// ```
pub fn split_alternatives(expression: &str) -> Vec<String> {
    split_top_level(expression, '|')
        .into_iter()
        .map(|alternative| to_operator_cast(strip_enclosing_parens(alternative)))
        .filter(|alternative| !alternative.is_empty())
        .collect()
}

/// Removes one layer of parentheses enclosing the whole expression.
///
/// `(A.b as X)` becomes `A.b as X`, but `(A.b as X).c` is left untouched.
pub fn strip_enclosing_parens(expression: &str) -> &str {
    let trimmed = expression.trim();
    if trimmed.starts_with('(')
        && trimmed.ends_with(')')
        && matching_close(trimmed, 0) == Some(trimmed.len() - 1)
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Returns the leading resource type of an expression, ignoring opening parens.
pub fn resource_type_of(expression: &str) -> &str {
    let trimmed = expression.trim_start_matches('(');
    let end = trimmed
        .find(|c: char| c == '.' || c == ' ' || c == ')')
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Drops the leading resource type node, keeping any wrapping parentheses.
///
/// ```rust
/// use criteria_chain::fhirpath::strip_resource_type;
///
/// assert_eq!(strip_resource_type("Observation.value.as(CodeableConcept)"), "value.as(CodeableConcept)");
/// assert_eq!(strip_resource_type("(Observation.value as Quantity).code"), "(value as Quantity).code");
/// assert_eq!(strip_resource_type("code"), "code");
/// ```
pub fn strip_resource_type(expression: &str) -> String {
    let opening = expression.len() - expression.trim_start_matches('(').len();
    let body = &expression[opening..];
    let mut chars = body.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_uppercase() => {}
        _ => return expression.to_string(),
    }
    let name_end = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let closing = body[name_end..].len() - body[name_end..].trim_start_matches(')').len();
    let after = name_end + closing;
    if !body[after..].starts_with('.') {
        return expression.to_string();
    }
    // Parens closed right after the type name cancel out the same number of openers.
    let keep_open = opening.saturating_sub(closing);
    format!("{}{}", &expression[..keep_open], &body[after + 1..])
}

/// Shortens the expression by its last top-level segment.
///
/// Returns `None` once only the root node is left.
pub fn shorten_path(expression: &str) -> Option<String> {
    let dot = last_top_level_dot(expression)?;
    let shortened = strip_enclosing_parens(&expression[..dot]);
    if shortened.is_empty() || !is_balanced(shortened) {
        return None;
    }
    Some(shortened.to_string())
}

/// Checks whether `sub_path` equals `path` or any of its dot-truncated prefixes.
pub fn sub_path_equals(sub_path: &str, path: &str) -> bool {
    if sub_path == path {
        return true;
    }
    let segments: Vec<&str> = path.split('.').collect();
    (1..=segments.len())
        .rev()
        .any(|n| segments[..n].join(".") == sub_path)
}

/// Length of the longest common prefix of two expressions, backed off to
/// the last segment boundary so the prefix always ends on a whole node.
pub fn common_path_prefix_len(a: &str, b: &str) -> usize {
    let raw = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, ca), cb)| ca == cb)
        .last()
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(0);
    let a_boundary = raw == a.len() || a[raw..].starts_with('.');
    let b_boundary = raw == b.len() || b[raw..].starts_with('.');
    if a_boundary && b_boundary {
        return raw;
    }
    a[..raw].rfind('.').unwrap_or(0)
}

/// Removes `:sliceName` qualifiers from every segment of an element id.
pub fn strip_slice_names(element_id: &str) -> String {
    element_id
        .split('.')
        .map(|segment| segment.split(':').next().unwrap_or(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Inserts `.first()` after each `extension.where(...)` that has more path after it.
///
/// ```rust
/// use criteria_chain::fhirpath::insert_first_after_extension_where;
///
/// assert_eq!(
///     insert_first_after_extension_where("extension.where(url='u').value"),
///     "extension.where(url='u').first().value"
/// );
/// assert_eq!(
///     insert_first_after_extension_where("extension.where(url='u')"),
///     "extension.where(url='u')"
/// );
/// ```
pub fn insert_first_after_extension_where(expression: &str) -> String {
    const NEEDLE: &str = "extension.where(";
    const FIRST: &str = ".first()";
    let mut out = expression.to_string();
    let mut from = 0;
    while let Some(rel) = out[from..].find(NEEDLE) {
        let open = from + rel + NEEDLE.len() - 1;
        let Some(close) = matching_close(&out, open) else {
            break;
        };
        let rest = &out[close + 1..];
        let has_more_path = rest.len() > 1 && rest.starts_with('.') && !rest.starts_with(FIRST);
        if has_more_path {
            out.insert_str(close + 1, FIRST);
            from = close + 1 + FIRST.len();
        } else {
            from = close + 1;
        }
    }
    out
}

/// Derives the attribute key code from an element id.
///
/// The innermost text of the last parenthesised group is considered first;
/// a slice name wins over the last path segment.
///
/// ```rust
/// use criteria_chain::fhirpath::attribute_key_code;
///
/// assert_eq!(attribute_key_code("Condition.bodySite"), Some("bodySite"));
/// assert_eq!(attribute_key_code("Condition.extension:stage.value[x]"), Some("stage"));
/// assert_eq!(attribute_key_code("(Specimen.collection.bodySite).code"), Some("bodySite"));
/// ```
pub fn attribute_key_code(element_id: &str) -> Option<&str> {
    let mut id = element_id;
    if let Some(open) = id.rfind('(') {
        let inner = &id[open + 1..];
        id = match inner.find(')') {
            Some(close) => &inner[..close],
            None => inner,
        };
    }
    let key = match id.rfind(':') {
        Some(colon) => id[colon + 1..].split('.').next().unwrap_or(""),
        None => id.rsplit('.').next().unwrap_or(""),
    };
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_enclosing_parens() {
        assert_eq!(strip_enclosing_parens("(A.b as X)"), "A.b as X");
        assert_eq!(strip_enclosing_parens("(A.b as X).c"), "(A.b as X).c");
        assert_eq!(strip_enclosing_parens("(A).(b)"), "(A).(b)");
        assert_eq!(strip_enclosing_parens("A.b"), "A.b");
    }

    #[test]
    fn test_resource_type_of() {
        assert_eq!(resource_type_of("Observation.code"), "Observation");
        assert_eq!(resource_type_of("(Observation.value as Quantity).code"), "Observation");
        assert_eq!(resource_type_of("Patient"), "Patient");
    }

    #[test]
    fn test_strip_resource_type_closing_paren_after_type() {
        assert_eq!(strip_resource_type("((Condition).code)"), "(code)");
    }

    #[test]
    fn test_strip_resource_type_requires_upper_case_root() {
        assert_eq!(strip_resource_type("value.as(Quantity)"), "value.as(Quantity)");
    }

    #[test]
    fn test_shorten_path() {
        assert_eq!(shorten_path("Observation.code.coding"), Some("Observation.code".into()));
        assert_eq!(
            shorten_path("(Observation.value as Quantity).code"),
            Some("Observation.value as Quantity".into())
        );
        assert_eq!(shorten_path("Observation"), None);
    }

    #[test]
    fn test_sub_path_equals() {
        assert!(sub_path_equals("code", "code"));
        assert!(sub_path_equals("code", "code.coding"));
        assert!(!sub_path_equals("code", "category.coding"));
        assert!(!sub_path_equals("code.coding", "code"));
    }

    #[test]
    fn test_common_path_prefix_len() {
        let a = "Observation.component.value as Quantity";
        let b = "Observation.component.code";
        assert_eq!(&a[..common_path_prefix_len(a, b)], "Observation.component");

        let c = "Observation.codeX";
        let d = "Observation.code";
        assert_eq!(&c[..common_path_prefix_len(c, d)], "Observation");
        assert_eq!(common_path_prefix_len("abc", "xyz"), 0);
    }

    #[test]
    fn test_strip_slice_names() {
        assert_eq!(
            strip_slice_names("Observation.component:systolic.code.coding:loinc"),
            "Observation.component.code.coding"
        );
    }

    #[test]
    fn test_insert_first_nested_extensions() {
        assert_eq!(
            insert_first_after_extension_where(
                "extension.where(url='a').extension.where(url='age').value"
            ),
            "extension.where(url='a').first().extension.where(url='age').first().value"
        );
    }

    #[test]
    fn test_insert_first_is_idempotent() {
        let once = insert_first_after_extension_where("extension.where(url='u').value");
        assert_eq!(insert_first_after_extension_where(&once), once);
    }

    #[test]
    fn test_attribute_key_code_edge_cases() {
        assert_eq!(attribute_key_code("Observation.component:systolic"), Some("systolic"));
        assert_eq!(attribute_key_code("Condition."), None);
    }
}
