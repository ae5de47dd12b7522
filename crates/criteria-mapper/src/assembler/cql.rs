//! CQL mapping assembly.

use std::path::Path;
use std::sync::Arc;

use super::{
    attribute_key, is_composite, is_reference, record_value_type, value_type_of, MappingContext,
    Translated,
};
use crate::cql::{composite_path, cql_path, reference_path, time_restriction_path};
use crate::error::MappingResult;
use crate::model::{AttributeSpec, CqlAttributeSearchParameter, CqlMapping, ProfileSnapshot, QueryingMetadata};

/// Builds [`CqlMapping`]s from querying metadata.
#[derive(Debug, Clone, Copy)]
pub struct CqlAssembler<'a> {
    ctx: MappingContext<'a>,
}

impl<'a> CqlAssembler<'a> {
    /// Creates an assembler over a context.
    pub fn new(ctx: MappingContext<'a>) -> Self {
        Self { ctx }
    }

    /// Assembles the CQL mapping of one record against one profile.
    ///
    /// The term code path is left out when it is the resource type's primary
    /// code path, since a plain retrieve already filters on it.
    pub fn assemble(
        &self,
        metadata: &QueryingMetadata,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<CqlMapping> {
        let mut mapping = CqlMapping {
            name: metadata.mapping_name().to_string(),
            resource_type: metadata.resource_type.clone(),
            ..Default::default()
        };

        if let Some(id) = &metadata.term_code_defining_id {
            let translated = self.ctx.translate(id, profile, package_dir)?;
            let path = chain_path(&translated);
            if !self
                .ctx
                .model_info
                .is_primary_path(&metadata.resource_type, &path)
            {
                mapping.term_code_fhir_path = Some(path);
            }
        }

        let value = metadata
            .value_defining_id
            .as_deref()
            .map(|id| self.ctx.translate(id, profile, package_dir))
            .transpose()?;
        if let Some(translated) = &value {
            mapping.value_fhir_path = Some(chain_path(translated));
        }
        mapping.value_type = record_value_type(metadata, value.as_ref())?;

        if let Some(id) = &metadata.time_restriction_defining_id {
            let translated = self.ctx.translate(id, profile, package_dir)?;
            mapping.time_restriction_fhir_path = Some(time_restriction_path(&translated.segments));
        }

        for (id, spec) in &metadata.attribute_defining_id_type_map {
            let attribute = self.attribute(id, spec, profile, package_dir)?;
            mapping.attribute_search_parameters.push(attribute);
        }
        Ok(mapping)
    }

    fn attribute(
        &self,
        id: &str,
        spec: &AttributeSpec,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<CqlAttributeSearchParameter> {
        if is_composite(id, spec)? {
            let composite = self.ctx.composite(id, profile, package_dir)?;
            let code = self.ctx.composite_code(&composite)?;
            let path = composite_path(
                &composite.value_expression,
                &composite.qualifier_expression,
                &code,
            )?;
            return Ok(CqlAttributeSearchParameter {
                attribute_type: value_type_of(&composite.value)?,
                attribute_key: code.clone(),
                attribute_path: path,
                reference_target_type: None,
                composite_code: Some(code),
            });
        }

        let translated = self.ctx.translate(id, profile, package_dir)?;
        let attribute_type = if is_reference(spec, &translated)? {
            "reference".to_string()
        } else {
            match &spec.attribute_type {
                Some(explicit) => explicit.clone(),
                None => value_type_of(translated.terminal()?)?,
            }
        };
        let crosses = attribute_type == "reference" || translated.crosses_reference();
        Ok(CqlAttributeSearchParameter {
            attribute_type,
            attribute_key: attribute_key(id),
            attribute_path: if crosses {
                reference_path(&translated.chain, &translated.segments)
            } else {
                cql_path(&translated.segments)
            },
            reference_target_type: crosses
                .then(|| self.reference_target_type(&translated))
                .flatten(),
            composite_code: None,
        })
    }

    /// Resource type behind the first reference of a chain: the profile the
    /// chain continued into, else the declared target profile.
    fn reference_target_type(&self, translated: &Translated) -> Option<String> {
        let hops = translated.chain.hops();
        let position = hops
            .iter()
            .position(|hop| hop.element.has_type("Reference"))?;
        match hops.get(position + 1) {
            Some(next) => Some(next.profile.resource_type.clone()),
            None => self
                .ctx
                .resolver()
                .reference_target_type(&hops[position].element),
        }
    }
}

/// CQL path of a translated chain, ending in `.reference` when the chain
/// passes through a Reference.
fn chain_path(translated: &Translated) -> String {
    if translated.crosses_reference() {
        reference_path(&translated.chain, &translated.segments)
    } else {
        cql_path(&translated.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;
    use crate::cql::ModelInfo;
    use crate::error::MappingError;
    use crate::model::{SearchParameterCatalog, TermCode};
    use crate::traits::{InMemoryTerminology, NullTerminology, TerminologyService};
    use serde_json::json;
    use std::path::PathBuf;

    fn condition() -> Arc<ProfileSnapshot> {
        Arc::new(
            serde_json::from_value(json!({
                "name": "ProfileConditionDiagnose", "url": "https://example.org/Condition", "type": "Condition",
                "snapshot": {"element": [
                    {"id": "Condition.code.coding:icd10-gm", "path": "Condition.code.coding",
                     "type": [{"code": "Coding"}],
                     "binding": {"valueSet": "http://fhir.de/ValueSet/bfarm/icd-10-gm"}},
                    {"id": "Condition.onset[x]", "path": "Condition.onset[x]",
                     "type": [{"code": "dateTime"}, {"code": "Period"}]},
                    {"id": "Condition.bodySite", "path": "Condition.bodySite", "type": [{"code": "CodeableConcept"}]},
                    {"id": "Condition.subject", "path": "Condition.subject",
                     "type": [{"code": "Reference", "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Patient"]}]},
                    {"id": "Condition.stage.summary", "path": "Condition.stage.summary", "type": [{"code": "CodeableConcept"}]},
                    {"id": "Condition.stage.type", "path": "Condition.stage.type", "type": [{"code": "CodeableConcept"}],
                     "patternCodeableConcept": {"coding": [{"system": "http://snomed.info/sct", "code": "254292007"}]}}
                ]}
            }))
            .unwrap(),
        )
    }

    fn record(json: serde_json::Value) -> QueryingMetadata {
        let mut record: QueryingMetadata = serde_json::from_value(json).unwrap();
        record.fill_defaults();
        record
    }

    fn assemble_with(
        model_info: &ModelInfo,
        terminology: &dyn TerminologyService,
        metadata: &QueryingMetadata,
    ) -> MappingResult<CqlMapping> {
        let dir = tempfile::TempDir::new().unwrap();
        let config = MapperConfig::builder().with_dataset_dir(dir.path()).build();
        let catalog = SearchParameterCatalog::new();
        let ctx = MappingContext::new(&config, &catalog, model_info, terminology);
        CqlAssembler::new(ctx).assemble(metadata, &condition(), &PathBuf::from("."))
    }

    fn assemble(metadata: &QueryingMetadata) -> MappingResult<CqlMapping> {
        let model_info = ModelInfo::new().with_primary_code_path("Condition", "code");
        assemble_with(&model_info, &NullTerminology, metadata)
    }

    mod paths {
        use super::*;

        #[test]
        fn test_primary_term_code_path_is_elided() {
            let metadata = record(json!({
                "name": "Diagnose",
                "context": {"system": "fdpg.mii.cds", "code": "Diagnose"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "time_restriction_defining_id": "Condition.onset[x]"
            }));
            let mapping = assemble(&metadata).unwrap();
            assert_eq!(mapping.resource_type, "Condition");
            assert!(mapping.term_code_fhir_path.is_none());
            assert_eq!(mapping.time_restriction_fhir_path.as_deref(), Some("onset"));
        }

        #[test]
        fn test_term_code_path_kept_without_model_info() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm"
            }));
            let mapping = assemble_with(&ModelInfo::new(), &NullTerminology, &metadata).unwrap();
            assert_eq!(mapping.term_code_fhir_path.as_deref(), Some("code"));
        }

        #[test]
        fn test_term_code_path_through_reference() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.subject"
            }));
            let mapping = assemble(&metadata).unwrap();
            assert_eq!(mapping.term_code_fhir_path.as_deref(), Some("subject.reference"));
        }

        #[test]
        fn test_value_and_attribute_paths() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "value_defining_id": "Condition.onset[x]",
                "attribute_defining_id_type_map": {"Condition.bodySite": {}}
            }));
            let mapping = assemble(&metadata).unwrap();
            assert_eq!(mapping.value_fhir_path.as_deref(), Some("onset.as(dateTime)"));
            assert_eq!(mapping.value_type.as_deref(), Some("dateTime"));
            let attribute = &mapping.attribute_search_parameters[0];
            assert_eq!(attribute.attribute_path, "bodySite");
            assert_eq!(attribute.attribute_type, "concept");
            assert_eq!(attribute.attribute_key.code, "bodySite");
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn test_reference_without_dataset_target_uses_declared_type() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "attribute_defining_id_type_map": {"Condition.subject": {}}
            }));
            let mapping = assemble(&metadata).unwrap();
            let attribute = &mapping.attribute_search_parameters[0];
            assert_eq!(attribute.attribute_type, "reference");
            assert_eq!(attribute.attribute_path, "subject.reference");
            assert_eq!(attribute.reference_target_type.as_deref(), Some("Patient"));
        }

        #[test]
        fn test_composite_where_form() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "attribute_defining_id_type_map": {
                    "Condition.stage.where(Condition.stage.type).summary": {}
                }
            }));
            let terminology = InMemoryTerminology::new().with_display(
                "http://snomed.info/sct",
                "254292007",
                "Tumor staging",
            );
            let model_info = ModelInfo::new().with_primary_code_path("Condition", "code");
            let mapping = assemble_with(&model_info, &terminology, &metadata).unwrap();
            let attribute = &mapping.attribute_search_parameters[0];
            assert_eq!(
                attribute.attribute_path,
                "stage.where(type.coding.exists(system = 'http://snomed.info/sct' and code = '254292007')).summary"
            );
            assert_eq!(attribute.attribute_type, "concept");
            assert_eq!(attribute.attribute_key, TermCode::new("http://snomed.info/sct", "254292007", ""));
            assert_eq!(attribute.attribute_key.display, "Tumor staging");
            assert!(attribute.composite_code.is_some());
        }

        #[test]
        fn test_composite_qualifier_without_fixed_code() {
            let metadata = record(json!({
                "context": {"system": "s", "code": "c"},
                "resource_type": "Condition",
                "term_code_defining_id": "Condition.code.coding:icd10-gm",
                "attribute_defining_id_type_map": {
                    "Condition.stage.where(Condition.bodySite).summary": {}
                }
            }));
            let err = assemble(&metadata).unwrap_err();
            assert!(matches!(err, MappingError::TermCodeNotFound(id) if id == "Condition.bodySite"));
        }
    }
}
