//! Per-kind mapping defaults.
//!
//! Some resource types always need the same search parameters and fixed
//! criteria, e.g. a Condition is only counted when its verification status
//! is `confirmed`. [`MappingKind`] names these kinds and [`KindDefaults`]
//! holds the table entry for each.

use std::fmt;

use crate::model::{FhirMapping, FixedCriterion, TermCode};

/// Kinds of mappings with known defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// Observation with a quantity value.
    QuantityObservation,
    /// Observation with a coded value.
    ConceptObservation,
    /// Condition.
    Condition,
    /// Procedure.
    Procedure,
    /// MedicationStatement.
    MedicationStatement,
    /// MedicationAdministration.
    MedicationAdministration,
    /// Immunization.
    Immunization,
    /// DiagnosticReport.
    DiagnosticReport,
    /// Specimen.
    Specimen,
}

/// A fixed criterion template: type, search parameter, path, system and codes.
#[derive(Debug, Clone, Copy)]
pub struct FixedCriterionDefault {
    /// `code` or `coding`.
    pub criterion_type: &'static str,
    /// Search parameter.
    pub search_parameter: &'static str,
    /// Element path.
    pub fhir_path: &'static str,
    /// Code system of all values.
    pub system: &'static str,
    /// (code, display) pairs.
    pub values: &'static [(&'static str, &'static str)],
}

impl FixedCriterionDefault {
    /// Materializes the template.
    pub fn to_criterion(&self) -> FixedCriterion {
        FixedCriterion::new(
            self.criterion_type,
            self.search_parameter,
            self.fhir_path,
            self.values
                .iter()
                .map(|(code, display)| TermCode::new(self.system, *code, *display))
                .collect(),
        )
    }
}

/// Default values for one mapping kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindDefaults {
    /// Term code search parameter.
    pub term_code_search_parameter: Option<&'static str>,
    /// Value search parameter.
    pub value_search_parameter: Option<&'static str>,
    /// Time restriction search parameter.
    pub time_restriction_parameter: Option<&'static str>,
    /// Criteria appended to every query.
    pub fixed_criteria: &'static [FixedCriterionDefault],
}

const EVENT_STATUS: &str = "http://hl7.org/fhir/event-status";

const CONDITION_CONFIRMED: &[FixedCriterionDefault] = &[FixedCriterionDefault {
    criterion_type: "coding",
    search_parameter: "verification-status",
    fhir_path: "verificationStatus",
    system: "http://terminology.hl7.org/CodeSystem/condition-ver-status",
    values: &[("confirmed", "Confirmed")],
}];

const PROCEDURE_PERFORMED: &[FixedCriterionDefault] = &[FixedCriterionDefault {
    criterion_type: "code",
    search_parameter: "status",
    fhir_path: "status",
    system: EVENT_STATUS,
    values: &[("completed", "Completed"), ("in-progress", "In Progress")],
}];

const MEDICATION_STATEMENT_TAKEN: &[FixedCriterionDefault] = &[FixedCriterionDefault {
    criterion_type: "code",
    search_parameter: "status",
    fhir_path: "status",
    system: "http://hl7.org/fhir/CodeSystem/medication-statement-status",
    values: &[("active", "Active"), ("completed", "Completed")],
}];

const MEDICATION_ADMINISTERED: &[FixedCriterionDefault] = &[FixedCriterionDefault {
    criterion_type: "code",
    search_parameter: "status",
    fhir_path: "status",
    system: "http://hl7.org/fhir/CodeSystem/medication-admin-status",
    values: &[("active", "Active"), ("completed", "Completed")],
}];

const IMMUNIZATION_COMPLETED: &[FixedCriterionDefault] = &[FixedCriterionDefault {
    criterion_type: "code",
    search_parameter: "status",
    fhir_path: "status",
    system: EVENT_STATUS,
    values: &[("completed", "Completed")],
}];

impl MappingKind {
    /// All kinds, in table order.
    pub const ALL: [MappingKind; 9] = [
        MappingKind::QuantityObservation,
        MappingKind::ConceptObservation,
        MappingKind::Condition,
        MappingKind::Procedure,
        MappingKind::MedicationStatement,
        MappingKind::MedicationAdministration,
        MappingKind::Immunization,
        MappingKind::DiagnosticReport,
        MappingKind::Specimen,
    ];

    /// Picks the kind for a resource type and value type.
    ///
    /// Observations are split by value type; other resource types ignore it.
    ///
    /// ```rust
    /// use criteria_mapper::MappingKind;
    ///
    /// assert_eq!(MappingKind::resolve("Observation", Some("quantity")), Some(MappingKind::QuantityObservation));
    /// assert_eq!(MappingKind::resolve("Condition", None), Some(MappingKind::Condition));
    /// assert_eq!(MappingKind::resolve("Patient", None), None);
    /// ```
    pub fn resolve(resource_type: &str, value_type: Option<&str>) -> Option<Self> {
        let kind = match resource_type {
            "Observation" => match value_type? {
                "quantity" => MappingKind::QuantityObservation,
                "concept" => MappingKind::ConceptObservation,
                _ => return None,
            },
            "Condition" => MappingKind::Condition,
            "Procedure" => MappingKind::Procedure,
            "MedicationStatement" => MappingKind::MedicationStatement,
            "MedicationAdministration" => MappingKind::MedicationAdministration,
            "Immunization" => MappingKind::Immunization,
            "DiagnosticReport" => MappingKind::DiagnosticReport,
            "Specimen" => MappingKind::Specimen,
            _ => return None,
        };
        Some(kind)
    }

    /// Term code search parameter of the first kind mapping `resource_type`.
    ///
    /// ```rust
    /// use criteria_mapper::MappingKind;
    ///
    /// assert_eq!(MappingKind::term_code_parameter_for("Observation"), Some("code"));
    /// assert_eq!(MappingKind::term_code_parameter_for("Immunization"), Some("vaccine-code"));
    /// assert_eq!(MappingKind::term_code_parameter_for("Patient"), None);
    /// ```
    pub fn term_code_parameter_for(resource_type: &str) -> Option<&'static str> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == resource_type)
            .and_then(|kind| kind.defaults().term_code_search_parameter)
    }

    /// Resource type mapped by this kind.
    pub fn resource_type(self) -> &'static str {
        match self {
            MappingKind::QuantityObservation | MappingKind::ConceptObservation => "Observation",
            MappingKind::Condition => "Condition",
            MappingKind::Procedure => "Procedure",
            MappingKind::MedicationStatement => "MedicationStatement",
            MappingKind::MedicationAdministration => "MedicationAdministration",
            MappingKind::Immunization => "Immunization",
            MappingKind::DiagnosticReport => "DiagnosticReport",
            MappingKind::Specimen => "Specimen",
        }
    }

    /// Table entry of this kind.
    pub fn defaults(self) -> KindDefaults {
        match self {
            MappingKind::QuantityObservation => KindDefaults {
                term_code_search_parameter: Some("code"),
                value_search_parameter: Some("value-quantity"),
                time_restriction_parameter: Some("date"),
                fixed_criteria: &[],
            },
            MappingKind::ConceptObservation => KindDefaults {
                term_code_search_parameter: Some("code"),
                value_search_parameter: Some("value-concept"),
                time_restriction_parameter: Some("date"),
                fixed_criteria: &[],
            },
            MappingKind::Condition => KindDefaults {
                term_code_search_parameter: Some("code"),
                time_restriction_parameter: Some("recorded-date"),
                fixed_criteria: CONDITION_CONFIRMED,
                ..Default::default()
            },
            MappingKind::Procedure => KindDefaults {
                term_code_search_parameter: Some("code"),
                time_restriction_parameter: Some("date"),
                fixed_criteria: PROCEDURE_PERFORMED,
                ..Default::default()
            },
            MappingKind::MedicationStatement => KindDefaults {
                term_code_search_parameter: Some("medication.code"),
                time_restriction_parameter: Some("effective"),
                fixed_criteria: MEDICATION_STATEMENT_TAKEN,
                ..Default::default()
            },
            MappingKind::MedicationAdministration => KindDefaults {
                term_code_search_parameter: Some("medication.code"),
                time_restriction_parameter: Some("effective-time"),
                fixed_criteria: MEDICATION_ADMINISTERED,
                ..Default::default()
            },
            MappingKind::Immunization => KindDefaults {
                term_code_search_parameter: Some("vaccine-code"),
                time_restriction_parameter: Some("date"),
                fixed_criteria: IMMUNIZATION_COMPLETED,
                ..Default::default()
            },
            MappingKind::DiagnosticReport => KindDefaults {
                term_code_search_parameter: Some("code"),
                value_search_parameter: Some("conclusion"),
                time_restriction_parameter: Some("date"),
                fixed_criteria: &[],
            },
            MappingKind::Specimen => KindDefaults {
                term_code_search_parameter: Some("type"),
                time_restriction_parameter: Some("collected"),
                ..Default::default()
            },
        }
    }

    /// Fills the gaps of a mapping with this kind's defaults.
    ///
    /// Values already derived from the profile are kept. Fixed criteria are
    /// appended unless a criterion on the same search parameter exists.
    pub fn apply(self, mapping: &mut FhirMapping) {
        let defaults = self.defaults();
        let fill = |slot: &mut Option<String>, default: Option<&'static str>| {
            if slot.is_none() {
                *slot = default.map(str::to_string);
            }
        };
        fill(
            &mut mapping.term_code_search_parameter,
            defaults.term_code_search_parameter,
        );
        fill(
            &mut mapping.value_search_parameter,
            defaults.value_search_parameter,
        );
        fill(
            &mut mapping.time_restriction_parameter,
            defaults.time_restriction_parameter,
        );
        for template in defaults.fixed_criteria {
            let present = mapping
                .fixed_criteria
                .iter()
                .any(|c| c.search_parameter == template.search_parameter);
            if !present {
                mapping.fixed_criteria.push(template.to_criterion());
            }
        }
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingKind::QuantityObservation => "QuantityObservation",
            MappingKind::ConceptObservation => "ConceptObservation",
            MappingKind::Condition => "Condition",
            MappingKind::Procedure => "Procedure",
            MappingKind::MedicationStatement => "MedicationStatement",
            MappingKind::MedicationAdministration => "MedicationAdministration",
            MappingKind::Immunization => "Immunization",
            MappingKind::DiagnosticReport => "DiagnosticReport",
            MappingKind::Specimen => "Specimen",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_round_trips_its_resource_type() {
        for kind in MappingKind::ALL {
            let value_type = match kind {
                MappingKind::QuantityObservation => Some("quantity"),
                MappingKind::ConceptObservation => Some("concept"),
                _ => None,
            };
            assert_eq!(MappingKind::resolve(kind.resource_type(), value_type), Some(kind));
        }
    }

    #[test]
    fn test_observation_without_value_type() {
        assert_eq!(MappingKind::resolve("Observation", None), None);
        assert_eq!(MappingKind::resolve("Observation", Some("date")), None);
    }

    #[test]
    fn test_apply_fills_gaps_only() {
        let mut mapping = FhirMapping {
            name: "Diagnose".into(),
            fhir_resource_type: "Condition".into(),
            term_code_search_parameter: Some("code-derived".into()),
            ..Default::default()
        };
        MappingKind::Condition.apply(&mut mapping);

        assert_eq!(mapping.term_code_search_parameter.as_deref(), Some("code-derived"));
        assert_eq!(mapping.time_restriction_parameter.as_deref(), Some("recorded-date"));
        assert_eq!(mapping.fixed_criteria.len(), 1);
        let criterion = &mapping.fixed_criteria[0];
        assert_eq!(criterion.search_parameter, "verification-status");
        assert_eq!(criterion.value[0].code, "confirmed");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut mapping = FhirMapping::default();
        MappingKind::Procedure.apply(&mut mapping);
        MappingKind::Procedure.apply(&mut mapping);
        assert_eq!(mapping.fixed_criteria.len(), 1);
        assert_eq!(mapping.fixed_criteria[0].value.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(MappingKind::QuantityObservation.to_string(), "QuantityObservation");
    }
}
