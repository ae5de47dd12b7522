//! Decoding of `$expand` and `$lookup` responses.
//!
//! Both functions accept the parsed JSON body and never fail: anything
//! missing decodes to an empty result.

use criteria_mapper::TermCode;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct ValueSet {
    #[serde(default)]
    expansion: Option<Expansion>,
}

#[derive(Debug, Default, Deserialize)]
struct Expansion {
    #[serde(default)]
    parameter: Vec<ExpansionParameter>,
    #[serde(default)]
    contains: Vec<Contains>,
}

#[derive(Debug, Deserialize)]
struct ExpansionParameter {
    name: String,
    #[serde(rename = "valueUri")]
    value_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contains {
    system: Option<String>,
    code: Option<String>,
    display: Option<String>,
    version: Option<String>,
    #[serde(default)]
    contains: Vec<Contains>,
}

#[derive(Debug, Default, Deserialize)]
struct Parameters {
    #[serde(default)]
    parameter: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    name: String,
    #[serde(rename = "valueString")]
    value_string: Option<String>,
}

/// Codes of a `ValueSet/$expand` response, sorted by (system, code) without
/// duplicates.
///
/// Nested `contains` are flattened; abstract groupers without a code are
/// dropped. A code without its own version takes the version from the
/// expansion parameter named `version` (the part after the last `|`).
///
/// # Example
///
/// ```rust
/// use criteria_terminology::decode_expansion;
/// use serde_json::json;
///
/// let codes = decode_expansion(&json!({
///     "resourceType": "ValueSet",
///     "expansion": {"contains": [
///         {"system": "http://snomed.info/sct", "code": "73211009", "display": "Diabetes mellitus"}
///     ]}
/// }));
/// assert_eq!(codes[0].code, "73211009");
/// ```
pub fn decode_expansion(body: &Value) -> Vec<TermCode> {
    let value_set = ValueSet::deserialize(body).unwrap_or_default();
    let Some(expansion) = value_set.expansion else {
        return Vec::new();
    };
    let default_version = expansion
        .parameter
        .iter()
        .find(|p| p.name == "version")
        .and_then(|p| p.value_uri.as_deref())
        .map(|uri| uri.rsplit('|').next().unwrap_or(uri).to_string());

    let mut codes = Vec::new();
    collect(&expansion.contains, default_version.as_deref(), &mut codes);
    codes.sort();
    codes.dedup();
    codes
}

fn collect(contains: &[Contains], default_version: Option<&str>, out: &mut Vec<TermCode>) {
    for item in contains {
        if let (Some(system), Some(code)) = (&item.system, &item.code) {
            let mut term_code = TermCode::new(
                system.as_str(),
                code.as_str(),
                item.display.as_deref().unwrap_or_default(),
            );
            term_code.version = item
                .version
                .clone()
                .or_else(|| default_version.map(str::to_string));
            out.push(term_code);
        }
        collect(&item.contains, default_version, out);
    }
}

/// Display of a `CodeSystem/$lookup` response.
pub fn decode_display(body: &Value) -> Option<String> {
    let parameters = Parameters::deserialize(body).ok()?;
    parameters
        .parameter
        .into_iter()
        .find(|p| p.name == "display")
        .and_then(|p| p.value_string)
}
