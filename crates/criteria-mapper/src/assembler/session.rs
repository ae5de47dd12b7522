//! Module runs: every querying metadata record against every matching profile.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{CqlAssembler, FhirSearchAssembler, MappingContext};
use crate::config::MapperConfig;
use crate::cql::ModelInfo;
use crate::error::{MappingError, MappingResult};
use crate::model::search_parameter::sorted_files;
use crate::model::{
    CqlMapping, FhirMapping, MappingIndex, ProfileSnapshot, QueryingMetadata,
    SearchParameterCatalog, TermCode,
};
use crate::traits::TerminologyService;

/// Everything produced by a session, in production order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOutput {
    /// FHIR Search mappings by name.
    pub fhir_mappings: IndexMap<String, FhirMapping>,
    /// CQL mappings by name.
    pub cql_mappings: IndexMap<String, CqlMapping>,
    /// (context, term code) to FHIR Search mapping name.
    pub fhir_index: MappingIndex,
    /// (context, term code) to CQL mapping name.
    pub cql_index: MappingIndex,
}

impl MappingOutput {
    /// Returns true if a mapping of this name was already produced.
    pub fn contains(&self, name: &str) -> bool {
        self.fhir_mappings.contains_key(name)
    }
}

/// A criterion that could not be assembled.
#[derive(Debug)]
pub struct CriterionFailure {
    /// Mapping name of the record.
    pub criterion: String,
    /// Profile the record was assembled against.
    pub profile: String,
    /// What went wrong.
    pub error: MappingError,
}

/// Summary of one module run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// The module.
    pub module: String,
    /// Profiles scanned.
    pub profiles: usize,
    /// Records read.
    pub records: usize,
    /// Mappings produced in this run.
    pub produced: usize,
    /// Records whose mapping name was already produced.
    pub reused: usize,
    /// Index entries recorded.
    pub index_entries: usize,
    /// Criteria that failed.
    pub failures: Vec<CriterionFailure>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl RunReport {
    /// Returns true if every criterion was assembled.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One record paired with one profile.
struct Job<'j> {
    metadata: &'j QueryingMetadata,
    profile: &'j Arc<ProfileSnapshot>,
}

/// Outcome of a job before it is merged into the session output.
struct Prepared {
    criterion: String,
    profile: String,
    context: TermCode,
    term_codes: MappingResult<Vec<TermCode>>,
    /// None when the name was already produced and generation was skipped.
    mappings: Option<MappingResult<(FhirMapping, CqlMapping)>>,
}

/// Drives the assemblers over datasets and owns the per-run output.
///
/// Mapping names are unique within a session: the first record producing a
/// name wins and later records with the same name only add index entries.
/// Create a new session for every independent run.
///
/// # Example
///
/// ```rust,no_run
/// use criteria_mapper::{MapperConfig, MappingSession, NullTerminology};
///
/// let config = MapperConfig::builder().with_dataset_dir("resources/fdpg").build();
/// let terminology = NullTerminology;
/// let mut session = MappingSession::new(&config, &terminology).unwrap();
/// let report = session.run_module("Diagnose").unwrap();
/// for failure in &report.failures {
///     eprintln!("{}: {}", failure.criterion, failure.error);
/// }
/// let output = session.into_output();
/// println!("{}", serde_json::to_string_pretty(&output.fhir_mappings).unwrap());
/// ```
pub struct MappingSession<'a> {
    config: &'a MapperConfig,
    model_info: ModelInfo,
    terminology: &'a dyn TerminologyService,
    output: MappingOutput,
}

impl std::fmt::Debug for MappingSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingSession")
            .field("config", self.config)
            .field("fhir_mappings", &self.output.fhir_mappings.len())
            .field("cql_mappings", &self.output.cql_mappings.len())
            .finish_non_exhaustive()
    }
}

impl<'a> MappingSession<'a> {
    /// Creates a session, loading the configured model info document.
    pub fn new(config: &'a MapperConfig, terminology: &'a dyn TerminologyService) -> MappingResult<Self> {
        let model_info = match &config.model_info {
            Some(path) => ModelInfo::from_path(path)?,
            None => ModelInfo::new(),
        };
        Ok(Self::with_model_info(config, terminology, model_info))
    }

    /// Creates a session with an already loaded model info.
    pub fn with_model_info(
        config: &'a MapperConfig,
        terminology: &'a dyn TerminologyService,
        model_info: ModelInfo,
    ) -> Self {
        Self {
            config,
            model_info,
            terminology,
            output: MappingOutput::default(),
        }
    }

    /// The output produced so far.
    pub fn output(&self) -> &MappingOutput {
        &self.output
    }

    /// Ends the session and hands out its output.
    pub fn into_output(self) -> MappingOutput {
        self.output
    }

    fn context<'s>(&'s self, catalog: &'s SearchParameterCatalog) -> MappingContext<'s> {
        MappingContext::new(self.config, catalog, &self.model_info, self.terminology)
    }

    /// Assembles one record against one profile and records the result.
    ///
    /// Returns `true` if new mappings were produced and `false` if the name
    /// was already known. Index entries are recorded in both cases.
    pub fn assemble(
        &mut self,
        catalog: &SearchParameterCatalog,
        metadata: &QueryingMetadata,
        profile: &Arc<ProfileSnapshot>,
        package_dir: &Path,
    ) -> MappingResult<bool> {
        let generate = !self.output.contains(metadata.mapping_name());
        let prepared = prepare(self.context(catalog), metadata, profile, package_dir, generate);
        self.merge(prepared)
    }

    /// Assembles every record of a module against the module's profiles.
    ///
    /// Malformed profile and record files are skipped with a warning.
    /// Failures of single criteria are collected in the report; only
    /// failures to read the module's directories abort the run.
    pub fn run_module(&mut self, module: &str) -> MappingResult<RunReport> {
        let start = Instant::now();
        let package_dir = self.config.package_dir(module);
        let search_parameter_dir = self.config.search_parameter_dir(module);
        let catalog = SearchParameterCatalog::load(
            self.config.default_search_parameters.as_deref(),
            Some(&search_parameter_dir),
        )?;

        let snapshot_suffix = self.config.snapshot_suffix.clone();
        let profiles: Vec<Arc<ProfileSnapshot>> =
            load_all(&package_dir, |name| name.ends_with(&snapshot_suffix), ProfileSnapshot::from_path)?
                .into_iter()
                .map(Arc::new)
                .collect();
        let records = load_all(
            &self.config.querying_metadata_dir(module),
            |name| name.ends_with(".json"),
            QueryingMetadata::from_path,
        )?;

        let jobs: Vec<Job<'_>> = profiles
            .iter()
            .flat_map(|profile| {
                records
                    .iter()
                    .filter(move |record| record.resource_type == profile.resource_type)
                    .map(move |metadata| Job { metadata, profile })
            })
            .collect();
        debug!(module = %module, profiles = profiles.len(), records = records.len(), jobs = jobs.len(), "Prepared module run");

        let mut report = RunReport {
            module: module.to_string(),
            profiles: profiles.len(),
            records: records.len(),
            ..Default::default()
        };
        let index_before = self.output.fhir_index.len();

        match self.prepare_parallel(&catalog, &jobs, &package_dir) {
            Some(prepared) => {
                for prepared in prepared {
                    self.record(prepared, &mut report);
                }
            }
            None => self.run_sequential(&catalog, &jobs, &package_dir, &mut report),
        }

        report.index_entries = self.output.fhir_index.len().saturating_sub(index_before);
        report.duration = start.elapsed();
        info!(
            module = %module,
            profiles = report.profiles,
            produced = report.produced,
            reused = report.reused,
            index_entries = report.index_entries,
            failures = report.failures.len(),
            "Assembled module"
        );
        Ok(report)
    }

    /// Prepares and merges jobs one after the other. Generation is skipped
    /// for names that are already known.
    fn run_sequential(
        &mut self,
        catalog: &SearchParameterCatalog,
        jobs: &[Job<'_>],
        package_dir: &Path,
        report: &mut RunReport,
    ) {
        for job in jobs {
            let generate = !self.output.contains(job.metadata.mapping_name());
            let prepared = prepare(
                self.context(catalog),
                job.metadata,
                job.profile,
                package_dir,
                generate,
            );
            self.record(prepared, report);
        }
    }

    /// Prepares every job on the rayon pool when enabled. Results keep job
    /// order, so merging them applies the same first-wins rule as the
    /// sequential path.
    #[cfg(feature = "parallel")]
    fn prepare_parallel(
        &self,
        catalog: &SearchParameterCatalog,
        jobs: &[Job<'_>],
        package_dir: &Path,
    ) -> Option<Vec<Prepared>> {
        use rayon::prelude::*;

        if !self.config.parallel {
            return None;
        }
        let ctx = self.context(catalog);
        debug!(jobs = jobs.len(), threads = rayon::current_num_threads(), "Assembling in parallel");
        Some(
            jobs.par_iter()
                .map(|job| prepare(ctx, job.metadata, job.profile, package_dir, true))
                .collect(),
        )
    }

    #[cfg(not(feature = "parallel"))]
    fn prepare_parallel(
        &self,
        _catalog: &SearchParameterCatalog,
        _jobs: &[Job<'_>],
        _package_dir: &Path,
    ) -> Option<Vec<Prepared>> {
        if self.config.parallel {
            warn!("Parallel assembly requested but the `parallel` feature is disabled");
        }
        None
    }

    fn record(&mut self, prepared: Prepared, report: &mut RunReport) {
        let criterion = prepared.criterion.clone();
        let profile = prepared.profile.clone();
        match self.merge(prepared) {
            Ok(true) => report.produced += 1,
            Ok(false) => report.reused += 1,
            Err(error) => {
                warn!(criterion = %criterion, profile = %profile, error = %error, "Criterion failed");
                report.failures.push(CriterionFailure {
                    criterion,
                    profile,
                    error,
                });
            }
        }
    }

    /// Records a prepared job: first name wins, index entries for every term code.
    fn merge(&mut self, prepared: Prepared) -> MappingResult<bool> {
        let term_codes = prepared.term_codes?;
        let name = prepared.criterion;
        let produced = if self.output.contains(&name) {
            debug!(mapping = %name, "Reusing mapping");
            false
        } else {
            let Some(result) = prepared.mappings else {
                return Err(MappingError::InvalidMetadata {
                    name,
                    reason: "mapping generation was skipped".to_string(),
                });
            };
            let (fhir, cql) = result?;
            self.output.fhir_mappings.insert(name.clone(), fhir);
            self.output.cql_mappings.insert(name.clone(), cql);
            debug!(mapping = %name, profile = %prepared.profile, "Produced mapping");
            true
        };

        for code in term_codes {
            self.output
                .fhir_index
                .insert(prepared.context.clone(), code.clone(), name.clone());
            self.output
                .cql_index
                .insert(prepared.context.clone(), code, name.clone());
        }
        Ok(produced)
    }
}

/// Validates a record, derives its term codes and, if asked, both mappings.
fn prepare(
    ctx: MappingContext<'_>,
    metadata: &QueryingMetadata,
    profile: &Arc<ProfileSnapshot>,
    package_dir: &Path,
    generate: bool,
) -> Prepared {
    let term_codes = metadata
        .validate()
        .and_then(|()| ctx.term_codes(metadata, profile, package_dir));
    let mappings = generate.then(|| {
        let fhir = FhirSearchAssembler::new(ctx).assemble(metadata, profile, package_dir)?;
        let cql = CqlAssembler::new(ctx).assemble(metadata, profile, package_dir)?;
        Ok((fhir, cql))
    });
    Prepared {
        criterion: metadata.mapping_name().to_string(),
        profile: profile.name.clone(),
        context: metadata.context.clone(),
        term_codes,
        mappings,
    }
}

/// Loads every accepted file of a directory in file-name order, skipping
/// files that fail to parse. A missing directory yields nothing.
fn load_all<T>(
    dir: &Path,
    filter: impl Fn(&str) -> bool,
    load: impl Fn(&Path) -> MappingResult<T>,
) -> MappingResult<Vec<T>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Directory does not exist");
        return Ok(Vec::new());
    }
    let paths: Vec<PathBuf> = sorted_files(dir, filter)?;
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        match load(&path) {
            Ok(item) => loaded.push(item),
            Err(error) => warn!(file = %path.display(), error = %error, "Skipping malformed file"),
        }
    }
    Ok(loaded)
}
