//! FHIR Search mapping assembly.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{
    attribute_key, is_composite, is_reference, record_value_type, value_type_of, MappingContext,
    Translated,
};
use crate::error::{MappingError, MappingResult};
use crate::matcher::SearchParameterMatcher;
use crate::model::{
    AttributeSpec, FhirAttributeSearchParameter, FhirMapping, MappingKind, ProfileSnapshot,
    QueryingMetadata,
};

/// Builds [`FhirMapping`]s from querying metadata.
#[derive(Debug, Clone, Copy)]
pub struct FhirSearchAssembler<'a> {
    ctx: MappingContext<'a>,
}

impl<'a> FhirSearchAssembler<'a> {
    /// Creates an assembler over a context.
    pub fn new(ctx: MappingContext<'a>) -> Self {
        Self { ctx }
    }

    fn matcher(&self) -> SearchParameterMatcher<'a> {
        SearchParameterMatcher::new(self.ctx.catalog)
    }

    /// Assembles the FHIR Search mapping of one record against one profile.
    pub fn assemble(
        &self,
        metadata: &QueryingMetadata,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<FhirMapping> {
        let mut mapping = FhirMapping {
            name: metadata.mapping_name().to_string(),
            fhir_resource_type: metadata.resource_type.clone(),
            ..Default::default()
        };

        if let Some(id) = &metadata.term_code_defining_id {
            let translated = self.ctx.translate(id, profile, package_dir)?;
            mapping.term_code_search_parameter = Some(self.search_parameter(&translated)?);
        } else {
            mapping.term_code_search_parameter =
                MappingKind::term_code_parameter_for(&metadata.resource_type).map(str::to_string);
        }

        let value = metadata
            .value_defining_id
            .as_deref()
            .map(|id| self.ctx.translate(id, profile, package_dir))
            .transpose()?;
        if let Some(translated) = &value {
            mapping.value_search_parameter = Some(self.search_parameter(translated)?);
        }
        mapping.value_type = record_value_type(metadata, value.as_ref())?;

        if let Some(id) = &metadata.time_restriction_defining_id {
            let translated = self.ctx.translate(id, profile, package_dir)?;
            mapping.time_restriction_parameter = Some(self.search_parameter(&translated)?);
        }

        for (id, spec) in &metadata.attribute_defining_id_type_map {
            let attribute = self.attribute(id, spec, profile, package_dir)?;
            mapping.attribute_search_parameters.push(attribute);
        }

        if self.ctx.config.apply_kind_defaults {
            if let Some(kind) =
                MappingKind::resolve(&mapping.fhir_resource_type, mapping.value_type.as_deref())
            {
                debug!(mapping = %mapping.name, kind = %kind, "Applying kind defaults");
                kind.apply(&mut mapping);
            }
        }
        Ok(mapping)
    }

    /// Search parameter string of a translated chain, chained with `.` when
    /// the chain crosses references.
    fn search_parameter(&self, translated: &Translated) -> MappingResult<String> {
        let matcher = self.matcher();
        let matched = matcher.find(&translated.expressions())?;
        matcher.chain(&matched)
    }

    fn attribute(
        &self,
        id: &str,
        spec: &AttributeSpec,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<FhirAttributeSearchParameter> {
        if is_composite(id, spec)? {
            return self.composite_attribute(id, profile, package_dir);
        }

        let translated = self.ctx.translate(id, profile, package_dir)?;
        if is_reference(spec, &translated)? {
            let matched = self.matcher().find(&translated.expressions())?;
            let (_, first) = matched
                .first()
                .ok_or_else(|| MappingError::SearchParameterNotFound {
                    expressions: translated.expressions(),
                })?;
            return Ok(FhirAttributeSearchParameter {
                attribute_type: "reference".to_string(),
                attribute_key: attribute_key(id),
                attribute_search_parameter: first.search_code().to_string(),
                composite_code: None,
            });
        }

        let attribute_type = match &spec.attribute_type {
            Some(explicit) => explicit.clone(),
            None => value_type_of(translated.terminal()?)?,
        };
        Ok(FhirAttributeSearchParameter {
            attribute_type,
            attribute_key: attribute_key(id),
            attribute_search_parameter: self.search_parameter(&translated)?,
            composite_code: None,
        })
    }

    fn composite_attribute(
        &self,
        id: &str,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<FhirAttributeSearchParameter> {
        let composite = self.ctx.composite(id, profile, package_dir)?;
        let matcher = self.matcher();
        let matched = matcher.find(&[
            composite.value_expression.clone(),
            composite.qualifier_expression.clone(),
        ])?;
        let value_parameter_type = matched
            .first()
            .map(|(_, entry)| entry.param_type.clone())
            .unwrap_or_default();
        let (key, parameter) = matcher.find_composite(&matched)?;
        let attribute_type = match value_parameter_type.as_str() {
            "quantity" => "composite-quantity",
            "token" => "composite-concept",
            other => return Err(MappingError::UnsupportedCompositeType(other.to_string())),
        };
        let code = self.ctx.composite_code(&composite)?;
        debug!(attribute = %id, key = %key, parameter = %parameter.search_code(), "Matched composite search parameter");

        Ok(FhirAttributeSearchParameter {
            attribute_type: attribute_type.to_string(),
            attribute_key: code.clone(),
            attribute_search_parameter: parameter.search_code().to_string(),
            composite_code: Some(code),
        })
    }
}
