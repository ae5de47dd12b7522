//! Integration tests for module runs over on-disk datasets.
//!
//! Each test builds a small dataset with two modules: `Diagnose` (Condition
//! profile with an extension) and `Bioprobe` (Specimen profile used as a
//! reference target), plus a `Vitalwerte` module for composite attributes.

use std::fs;
use std::path::Path;

use criteria_mapper::{
    InMemoryTerminology, MapperConfig, MappingError, MappingSession, ModelInfo, TermCode,
};
use serde_json::{json, Value};
use tempfile::TempDir;

const STAGE_URL: &str = "https://example.org/fhir/StructureDefinition/stage";

fn write(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn search_parameter(code: &str, expression: &str, base: &str, param_type: &str) -> Value {
    json!({
        "resourceType": "SearchParameter",
        "url": format!("http://hl7.org/fhir/SearchParameter/{base}-{code}"),
        "name": code,
        "code": code,
        "expression": expression,
        "base": [base],
        "type": param_type
    })
}

fn search_parameter_bundle() -> Value {
    let mut evidence = search_parameter("evidence-detail", "Condition.evidence.detail", "Condition", "reference");
    evidence["target"] = json!(["Specimen"]);
    let mut subject = search_parameter("subject", "Condition.subject", "Condition", "reference");
    subject["target"] = json!(["Patient", "Group"]);
    let mut composite = search_parameter(
        "component-code-value-quantity",
        "Observation.component",
        "Observation",
        "composite",
    );
    composite["component"] = json!([
        {"definition": "http://hl7.org/fhir/SearchParameter/Observation-component-code", "expression": "code"},
        {"definition": "http://hl7.org/fhir/SearchParameter/Observation-component-value-quantity", "expression": "value.ofType(Quantity)"}
    ]);

    let entries = vec![
        search_parameter("code", "Condition.code | Observation.code", "Condition", "token"),
        search_parameter("recorded-date", "Condition.recordedDate", "Condition", "date"),
        search_parameter("body-site", "Condition.bodySite", "Condition", "token"),
        subject,
        evidence,
        search_parameter("type", "Specimen.type", "Specimen", "token"),
        search_parameter("date", "Observation.effective", "Observation", "date"),
        search_parameter("component-code", "Observation.component.code", "Observation", "token"),
        search_parameter(
            "component-value-quantity",
            "Observation.component.value.ofType(Quantity)",
            "Observation",
            "quantity",
        ),
        composite,
    ];
    json!({
        "resourceType": "Bundle",
        "entry": entries.into_iter().map(|resource| json!({"resource": resource})).collect::<Vec<_>>()
    })
}

fn module_search_parameters() -> Value {
    search_parameter(
        "stage",
        &format!("Condition.extension.where(url='{STAGE_URL}').value.ofType(CodeableConcept)"),
        "Condition",
        "token",
    )
}

const MODEL_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<modelInfo xmlns="urn:hl7-org:elm-modelinfo:r1" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" name="FHIR" version="4.0.1">
   <typeInfo xsi:type="ClassInfo" namespace="FHIR" name="Condition" primaryCodePath="code"/>
   <typeInfo xsi:type="ClassInfo" namespace="FHIR" name="Observation" primaryCodePath="code"/>
   <typeInfo xsi:type="ClassInfo" namespace="FHIR" name="Specimen" primaryCodePath="type"/>
</modelInfo>
"#;

fn condition_profile() -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "name": "ProfileConditionDiagnose",
        "url": "https://example.org/fhir/StructureDefinition/Diagnose",
        "type": "Condition",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Condition",
        "snapshot": {"element": [
            {"id": "Condition", "path": "Condition"},
            {"id": "Condition.extension:stage", "path": "Condition.extension",
             "type": [{"code": "Extension", "profile": [STAGE_URL]}]},
            {"id": "Condition.code", "path": "Condition.code", "type": [{"code": "CodeableConcept"}]},
            {"id": "Condition.code.coding:icd10-gm", "path": "Condition.code.coding",
             "type": [{"code": "Coding"}],
             "binding": {"strength": "required", "valueSet": "http://fhir.de/ValueSet/bfarm/icd-10-gm|2024"}},
            {"id": "Condition.bodySite", "path": "Condition.bodySite", "type": [{"code": "CodeableConcept"}]},
            {"id": "Condition.subject", "path": "Condition.subject",
             "type": [{"code": "Reference", "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Patient"]}]},
            {"id": "Condition.recordedDate", "path": "Condition.recordedDate", "type": [{"code": "dateTime"}]},
            {"id": "Condition.evidence.detail", "path": "Condition.evidence.detail",
             "type": [{"code": "Reference", "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Specimen"]}]}
        ]}
    })
}

fn stage_extension() -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "name": "ExtensionStage",
        "url": STAGE_URL,
        "type": "Extension",
        "snapshot": {"element": [
            {"id": "Extension", "path": "Extension"},
            {"id": "Extension.url", "path": "Extension.url", "type": [{"code": "uri"}]},
            {"id": "Extension.value[x]", "path": "Extension.value[x]", "type": [{"code": "CodeableConcept"}]}
        ]}
    })
}

fn specimen_profile() -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "name": "ProfileSpecimenBioprobe",
        "url": "https://example.org/fhir/StructureDefinition/Specimen",
        "type": "Specimen",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Specimen",
        "snapshot": {"element": [
            {"id": "Specimen", "path": "Specimen"},
            {"id": "Specimen.type", "path": "Specimen.type", "type": [{"code": "CodeableConcept"}]}
        ]}
    })
}

fn blood_pressure_profile() -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "name": "ProfileObservationBlutdruck",
        "url": "https://example.org/fhir/StructureDefinition/Blutdruck",
        "type": "Observation",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Observation",
        "snapshot": {"element": [
            {"id": "Observation.code", "path": "Observation.code", "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"system": "http://loinc.org", "code": "85354-9"}]}},
            {"id": "Observation.effective[x]", "path": "Observation.effective[x]",
             "type": [{"code": "dateTime"}, {"code": "Period"}]},
            {"id": "Observation.component:systolic", "path": "Observation.component",
             "type": [{"code": "BackboneElement"}]},
            {"id": "Observation.component:systolic.code", "path": "Observation.component.code",
             "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"system": "http://loinc.org", "code": "8480-6"}]}},
            {"id": "Observation.component:systolic.value[x]", "path": "Observation.component.value[x]",
             "type": [{"code": "Quantity"}]}
        ]}
    })
}

fn context(code: &str) -> Value {
    json!({"system": "fdpg.mii.cds", "code": code, "display": code})
}

/// Builds the dataset and returns the temp dir with a config pointing into it.
fn dataset() -> (TempDir, MapperConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(&root.join("search_parameters.json"), &search_parameter_bundle());
    fs::write(root.join("modelinfo.xml"), MODEL_INFO).unwrap();

    let diagnose = root.join("Diagnose");
    write(&diagnose.join("package/Condition-snapshot.json"), &condition_profile());
    write(&diagnose.join("package/extension/Stage-snapshot.json"), &stage_extension());
    write(&diagnose.join("search_parameter/stage.json"), &module_search_parameters());
    write(
        &diagnose.join("QueryingMetaData/Diagnose.json"),
        &json!({
            "name": "Diagnose",
            "context": context("Diagnose"),
            "module": {"code": "Diagnose", "display": "Diagnose"},
            "resource_type": "Condition",
            "term_code_defining_id": "Condition.code.coding:icd10-gm",
            "time_restriction_defining_id": "Condition.recordedDate",
            "attribute_defining_id_type_map": {
                "Condition.bodySite": {},
                "(Condition.extension:stage).value[x]": {},
                "Condition.subject": {},
                "(Condition.evidence.detail).type": {"type": "reference"}
            }
        }),
    );
    write(
        &diagnose.join("QueryingMetaData/DiagnoseKopie.json"),
        &json!({
            "name": "Diagnose",
            "context": context("Diagnose"),
            "resource_type": "Condition",
            "term_codes": [{"system": "http://fhir.de/CodeSystem/bfarm/icd-10-gm", "code": "Z99", "display": "Z99"}]
        }),
    );
    write(
        &diagnose.join("QueryingMetaData/Fehlerhaft.json"),
        &json!({
            "name": "Fehlerhaft",
            "context": context("Fehlerhaft"),
            "resource_type": "Condition",
            "term_code_defining_id": "Condition.code.coding:icd10-gm",
            "attribute_defining_id_type_map": {"Condition.severity": {}}
        }),
    );
    fs::write(diagnose.join("QueryingMetaData/Kaputt.json"), "{ not json").unwrap();

    write(&root.join("Bioprobe/package/Specimen-snapshot.json"), &specimen_profile());

    let vital = root.join("Vitalwerte");
    write(&vital.join("package/Blutdruck-snapshot.json"), &blood_pressure_profile());
    write(
        &vital.join("QueryingMetaData/Blutdruck.json"),
        &json!({
            "name": "Blutdruck",
            "context": context("Blutdruck"),
            "resource_type": "Observation",
            "term_code_defining_id": "Observation.code",
            "time_restriction_defining_id": "Observation.effective[x]",
            "attribute_defining_id_type_map": {
                "Observation.component:systolic.where(Observation.component:systolic.code).value[x]": {}
            }
        }),
    );

    let config = MapperConfig::builder()
        .with_dataset_dir(root)
        .with_default_search_parameters(root.join("search_parameters.json"))
        .with_model_info(root.join("modelinfo.xml"))
        .build();
    (dir, config)
}

fn terminology() -> InMemoryTerminology {
    InMemoryTerminology::new()
        .with_expansion(
            "http://fhir.de/ValueSet/bfarm/icd-10-gm",
            vec![
                TermCode::new("http://fhir.de/CodeSystem/bfarm/icd-10-gm", "I10", "Essentielle Hypertonie"),
                TermCode::new("http://fhir.de/CodeSystem/bfarm/icd-10-gm", "E11", "Diabetes mellitus, Typ 2"),
            ],
        )
        .with_display("http://loinc.org", "8480-6", "SYSTOLIC BLOOD PRESSURE")
}

mod condition {
    use super::*;

    #[test]
    fn test_term_code_and_time_restriction() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        session.run_module("Diagnose").unwrap();
        let output = session.into_output();

        let fhir = &output.fhir_mappings["Diagnose"];
        assert_eq!(fhir.fhir_resource_type, "Condition");
        assert_eq!(fhir.term_code_search_parameter.as_deref(), Some("code"));
        assert_eq!(fhir.time_restriction_parameter.as_deref(), Some("recorded-date"));
        assert!(fhir.value_search_parameter.is_none());

        let cql = &output.cql_mappings["Diagnose"];
        assert_eq!(cql.resource_type, "Condition");
        assert!(cql.term_code_fhir_path.is_none());
        assert_eq!(cql.time_restriction_fhir_path.as_deref(), Some("recordedDate"));

        let json = serde_json::to_value(cql).unwrap();
        assert!(json.get("termCodeFhirPath").is_none());
    }

    #[test]
    fn test_attributes_in_declaration_order() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        session.run_module("Diagnose").unwrap();
        let output = session.into_output();

        let fhir = &output.fhir_mappings["Diagnose"].attribute_search_parameters;
        let keys: Vec<&str> = fhir.iter().map(|a| a.attribute_key.code.as_str()).collect();
        assert_eq!(keys, vec!["bodySite", "stage", "subject", "detail"]);
        let parameters: Vec<&str> = fhir.iter().map(|a| a.attribute_search_parameter.as_str()).collect();
        assert_eq!(parameters, vec!["body-site", "stage", "subject", "evidence-detail"]);
        assert_eq!(fhir[1].attribute_type, "concept");
        assert_eq!(fhir[2].attribute_type, "reference");

        let cql = &output.cql_mappings["Diagnose"].attribute_search_parameters;
        assert_eq!(cql[0].attribute_path, "bodySite");
        assert_eq!(
            cql[1].attribute_path,
            format!("extension.where(url='{STAGE_URL}').first().value.as(CodeableConcept)")
        );
        assert_eq!(cql[2].attribute_path, "subject.reference");
        assert_eq!(cql[2].reference_target_type.as_deref(), Some("Patient"));
        assert_eq!(cql[3].attribute_path, "evidence.detail.reference");
        assert_eq!(cql[3].reference_target_type.as_deref(), Some("Specimen"));
    }

    #[test]
    fn test_untyped_attribute_through_reference() {
        let (dir, config) = dataset();
        let befund = dir.path().join("Befund");
        write(&befund.join("package/Condition-snapshot.json"), &condition_profile());
        write(
            &befund.join("QueryingMetaData/Befund.json"),
            &json!({
                "name": "Befund",
                "context": context("Befund"),
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "attribute_defining_id_type_map": {"(Condition.evidence.detail).type": {}}
            }),
        );
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        let report = session.run_module("Befund").unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        let output = session.into_output();

        let fhir = &output.fhir_mappings["Befund"].attribute_search_parameters[0];
        assert_eq!(fhir.attribute_search_parameter, "evidence-detail.type");
        assert_eq!(fhir.attribute_type, "concept");

        let cql = &output.cql_mappings["Befund"].attribute_search_parameters[0];
        assert_eq!(cql.attribute_path, "evidence.detail.reference");
        assert_eq!(cql.attribute_type, "concept");
        assert_eq!(cql.reference_target_type.as_deref(), Some("Specimen"));
    }

    #[test]
    fn test_broken_snapshot_in_unrelated_module() {
        let (dir, config) = dataset();
        let broken = dir.path().join("Aaa/package/Broken-snapshot.json");
        fs::create_dir_all(broken.parent().unwrap()).unwrap();
        fs::write(&broken, "{ not json").unwrap();

        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        let report = session.run_module("Diagnose").unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].criterion, "Fehlerhaft");

        let output = session.into_output();
        let cql = &output.cql_mappings["Diagnose"].attribute_search_parameters;
        assert_eq!(cql.len(), 4);
        assert_eq!(cql[3].reference_target_type.as_deref(), Some("Specimen"));
    }
}

mod runs {
    use super::*;

    #[test]
    fn test_report_counts_and_failures() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        let report = session.run_module("Diagnose").unwrap();

        assert_eq!(report.module, "Diagnose");
        assert_eq!(report.profiles, 1);
        assert_eq!(report.records, 3);
        assert_eq!(report.produced, 1);
        assert_eq!(report.reused, 1);
        assert_eq!(report.index_entries, 3);
        assert!(!report.is_clean());
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.criterion, "Fehlerhaft");
        assert_eq!(failure.profile, "ProfileConditionDiagnose");
        assert!(matches!(
            &failure.error,
            MappingError::ElementNotFound { element_id, .. } if element_id == "Condition.severity"
        ));
        assert!(failure.error.is_recoverable());
    }

    #[test]
    fn test_reused_name_still_indexes_its_codes() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        session.run_module("Diagnose").unwrap();
        let output = session.output();

        let context = TermCode::new("fdpg.mii.cds", "Diagnose", "Diagnose");
        let icd = "http://fhir.de/CodeSystem/bfarm/icd-10-gm";
        for code in ["I10", "E11", "Z99"] {
            assert_eq!(
                output.fhir_index.get(&context, &TermCode::new(icd, code, "")),
                Some("Diagnose")
            );
        }
        assert_eq!(output.fhir_index, output.cql_index);
        assert!(!output.fhir_mappings.contains_key("Fehlerhaft"));
    }

    #[test]
    fn test_missing_module_yields_empty_report() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        let report = session.run_module("Unbekannt").unwrap();
        assert_eq!(report.profiles, 0);
        assert_eq!(report.produced, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_output_is_byte_identical_across_sessions() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let run = || {
            let mut session = MappingSession::new(&config, &terminology).unwrap();
            for module in ["Diagnose", "Vitalwerte"] {
                session.run_module(module).unwrap();
            }
            serde_json::to_string(&session.into_output()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let (dir, config) = dataset();
        let parallel = MapperConfig::builder()
            .with_dataset_dir(dir.path())
            .with_default_search_parameters(dir.path().join("search_parameters.json"))
            .with_model_info(dir.path().join("modelinfo.xml"))
            .with_parallel(true)
            .build();
        let terminology = terminology();
        let run = |config: &MapperConfig| {
            let mut session = MappingSession::new(config, &terminology).unwrap();
            let report = session.run_module("Diagnose").unwrap();
            (report.produced, report.reused, serde_json::to_string(&session.into_output()).unwrap())
        };
        assert_eq!(run(&config), run(&parallel));
    }
}

mod composite {
    use super::*;

    #[test]
    fn test_component_attribute() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        let report = session.run_module("Vitalwerte").unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        let output = session.into_output();

        let fhir = &output.fhir_mappings["Blutdruck"];
        assert_eq!(fhir.term_code_search_parameter.as_deref(), Some("code"));
        assert_eq!(fhir.time_restriction_parameter.as_deref(), Some("date"));
        let attribute = &fhir.attribute_search_parameters[0];
        assert_eq!(attribute.attribute_type, "composite-quantity");
        assert_eq!(attribute.attribute_search_parameter, "component-code-value-quantity");
        assert_eq!(attribute.attribute_key.code, "8480-6");
        assert_eq!(attribute.attribute_key.display, "Systolic Blood Pressure");

        let cql = &output.cql_mappings["Blutdruck"];
        assert_eq!(cql.time_restriction_fhir_path.as_deref(), Some("effective"));
        let attribute = &cql.attribute_search_parameters[0];
        assert_eq!(attribute.attribute_type, "quantity");
        assert_eq!(
            attribute.attribute_path,
            "component.where(code.coding.exists(system = 'http://loinc.org' and code = '8480-6')).value.as(Quantity)"
        );
        assert_eq!(attribute.composite_code.as_ref().map(|c| c.code.as_str()), Some("8480-6"));
    }

    #[test]
    fn test_composite_json_shape() {
        let (_dir, config) = dataset();
        let terminology = terminology();
        let mut session = MappingSession::new(&config, &terminology).unwrap();
        session.run_module("Vitalwerte").unwrap();
        let json = serde_json::to_value(&session.output().fhir_mappings["Blutdruck"]).unwrap();
        let attribute = &json["attributeSearchParameters"][0];
        assert_eq!(attribute["attributeType"], "composite-quantity");
        assert_eq!(attribute["compositeCode"]["code"], "8480-6");
        assert_eq!(attribute["attributeKey"]["system"], "http://loinc.org");
    }
}

#[test]
fn test_model_info_loaded_from_config() {
    let (_dir, config) = dataset();
    let info = ModelInfo::from_path(config.model_info.as_deref().unwrap()).unwrap();
    assert_eq!(info.primary_code_path("Specimen"), Some("type"));
    assert_eq!(info.len(), 3);
}
