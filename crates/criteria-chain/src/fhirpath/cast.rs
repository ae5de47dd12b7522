//! Type casts in path expressions.
//!
//! Two dialects are handled: the operator form `X as T` used for search
//! parameter expressions, and the method-call form `X.as(T)` used by CQL.

use super::scan::matching_open;

const POLYMORPHIC: &str = "[x]";

/// Returns true if the path or id contains a polymorphic `[x]` marker.
pub fn is_polymorphic(path: &str) -> bool {
    path.contains(POLYMORPHIC)
}

/// Rewrites `prefix[x]suffix` into a cast to `type_code`.
///
/// An optional `:sliceName` directly after `[x]` is consumed with the marker.
/// A non-empty suffix is kept outside a parenthesised cast.
///
/// ```rust
/// use criteria_chain::fhirpath::replace_polymorphic_with_cast;
///
/// assert_eq!(
///     replace_polymorphic_with_cast("Condition.onset[x]", "dateTime"),
///     "Condition.onset as dateTime"
/// );
/// assert_eq!(
///     replace_polymorphic_with_cast("Observation.value[x]:valueQuantity.code", "Quantity"),
///     "(Observation.value as Quantity).code"
/// );
/// ```
pub fn replace_polymorphic_with_cast(path: &str, type_code: &str) -> String {
    let Some(marker) = path.find(POLYMORPHIC) else {
        return path.to_string();
    };
    let prefix = &path[..marker];
    let mut rest = &path[marker + POLYMORPHIC.len()..];
    if let Some(after_colon) = rest.strip_prefix(':') {
        let slice_len = after_colon
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after_colon.len());
        rest = &after_colon[slice_len..];
    }
    if rest.is_empty() {
        format!("{prefix} as {type_code}")
    } else {
        format!("({prefix} as {type_code}){rest}")
    }
}

/// Returns the id of the element that declares the `[x]` choice.
///
/// `Observation.value[x]:valueQuantity.code` yields
/// `Observation.value[x]:valueQuantity`; `Observation.value[x].code` yields
/// `Observation.value[x]`.
pub fn polymorphic_base_id(element_id: &str) -> Option<&str> {
    let marker = element_id.find(POLYMORPHIC)?;
    let end = marker + POLYMORPHIC.len();
    let rest = &element_id[end..];
    if rest.starts_with(':') {
        let slice_end = rest.find('.').unwrap_or(rest.len());
        Some(&element_id[..end + slice_end])
    } else {
        Some(&element_id[..end])
    }
}

/// Returns the id of the bare `[x]` element, dropping any type slice.
pub fn polymorphic_choice_id(element_id: &str) -> Option<&str> {
    let marker = element_id.find(POLYMORPHIC)?;
    Some(&element_id[..marker + POLYMORPHIC.len()])
}

/// Removes a trailing ` as T` when nothing follows the cast.
///
/// Returns `None` if the expression does not end in a bare cast.
pub fn strip_trailing_cast(expression: &str) -> Option<&str> {
    let idx = expression.rfind(" as ")?;
    let type_code = &expression[idx + 4..];
    if type_code.is_empty() || !type_code.chars().all(is_type_char) {
        return None;
    }
    Some(&expression[..idx])
}

/// Cuts the expression at the first ` as `, dropping the cast and anything after.
pub fn strip_cast(expression: &str) -> &str {
    match expression.find(" as ") {
        Some(idx) => &expression[..idx],
        None => expression,
    }
}

/// Converts every operator cast into CQL's method-call form.
///
/// `(value as Quantity).code` becomes `value.as(Quantity).code` and
/// `value as CodeableConcept` becomes `value.as(CodeableConcept)`.
pub fn to_cql_cast(expression: &str) -> String {
    let mut out = expression.to_string();
    while let Some(idx) = out.find(" as ") {
        let type_start = idx + 4;
        let type_len = out[type_start..]
            .find(|c: char| !is_type_char(c))
            .unwrap_or(out.len() - type_start);
        let type_end = type_start + type_len;
        let type_code = out[type_start..type_end].to_string();

        // Only a grouping paren wraps the cast, never a function call's.
        let wrapping = if out[type_end..].starts_with(')') {
            matching_open(&out, type_end).filter(|&open| {
                !out[..open]
                    .chars()
                    .next_back()
                    .is_some_and(is_type_char)
            })
        } else {
            None
        };
        match wrapping {
            Some(open) => {
                let inner = &out[open + 1..idx];
                let replaced = format!("{}{inner}.as({type_code}){}", &out[..open], &out[type_end + 1..]);
                out = replaced;
            }
            None => {
                let replaced = format!("{}.as({type_code}){}", &out[..idx], &out[type_end..]);
                out = replaced;
            }
        }
    }
    out
}

/// Rewrites `.ofType(T)` and the deprecated `.as(T)` call into ` as T`.
pub fn to_operator_cast(expression: &str) -> String {
    let mut out = expression.to_string();
    for call in [".ofType(", ".as("] {
        while let Some(idx) = out.find(call) {
            let type_start = idx + call.len();
            let Some(close_rel) = out[type_start..].find(')') else {
                break;
            };
            let type_end = type_start + close_rel;
            let type_code = out[type_start..type_end].trim().to_string();
            out = format!("{} as {type_code}{}", &out[..idx], &out[type_end + 1..]);
        }
    }
    out
}

fn is_type_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
