//! Generation task orchestration
//!
//! A [`GenerationTask`] runs through fixed stages:
//!
//! ```text
//! Init -> [ProvisionDatabase -> Migrate] -> Clean -> Write -> Invoke -> Done
//! ```
//!
//! The bracketed stages only run in container mode, when the configured
//! connection URL is blank. The first failing stage ends the task with a
//! [`TaskError`]; nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{defaults, Configuration};
use crate::database::{BuildServices, DatabaseHandle};
use crate::document::{self, SchemaSource};
use crate::error::{CodegenError, Result};
use crate::fingerprint::Fingerprint;
use crate::generator::{self, GenerationResult, GeneratorCommand, ProcessSpec, ProcessSpecHook};
use crate::migration::{MigrationRecord, MigrationRunner};
use crate::normalize::{normalize, trim_defaults, NormalizationHook, NormalizedConfiguration};
use crate::output;

/// Stage a task was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    ProvisionDatabase,
    Migrate,
    Clean,
    Write,
    Invoke,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::ProvisionDatabase => "database provisioning",
            Self::Migrate => "migration",
            Self::Clean => "output cleaning",
            Self::Write => "document writing",
            Self::Invoke => "generator invocation",
        })
    }
}

/// A task that ended in its failed state
#[derive(Error, Debug)]
#[error("task `{task}` failed during {stage}: {source}")]
pub struct TaskError {
    pub task: String,
    pub stage: Stage,
    #[source]
    pub source: CodegenError,
}

/// What a result hook decided about a finished generator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

/// Caller hook deciding whether a finished run counts as success
pub type ResultHook = dyn Fn(&GenerationResult) -> Verdict + Send + Sync;

/// Caller extension points
#[derive(Clone, Default)]
pub struct TaskHooks {
    /// Adjusts the copy being fingerprinted
    pub normalization: Option<Arc<NormalizationHook>>,
    /// Adjusts the generator launch
    pub process_spec: Option<Arc<ProcessSpecHook>>,
    /// Decides whether a finished run counts as success
    pub result: Option<Arc<ResultHook>>,
}

impl fmt::Debug for TaskHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHooks")
            .field("normalization", &self.normalization.is_some())
            .field("process_spec", &self.process_spec.is_some())
            .field("result", &self.result.is_some())
            .finish()
    }
}

/// Terminal value of a successful task
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub task: String,
    pub fingerprint: Fingerprint,
    pub migrations: Vec<MigrationRecord>,
    pub result: GenerationResult,
    /// Present when a result hook was consulted
    pub verdict: Option<Verdict>,
}

/// One schema-to-sources generation
#[derive(Debug, Clone)]
pub struct GenerationTask {
    name: String,
    configuration: Configuration,
    project_dir: PathBuf,
    output_dir: PathBuf,
    work_dir: PathBuf,
    migrations_dir: PathBuf,
    use_container: bool,
    all_inputs_declared: bool,
    generator: GeneratorCommand,
    schema: SchemaSource,
    hooks: TaskHooks,
}

impl GenerationTask {
    pub fn builder(name: impl Into<String>, configuration: Configuration) -> GenerationTaskBuilder {
        GenerationTaskBuilder::new(name.into(), configuration)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration as declared; `generate` never modifies it
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The single directory this task writes
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn use_container(&self) -> bool {
        self.use_container
    }

    pub fn generator_command(&self) -> &GeneratorCommand {
        &self.generator
    }

    /// Whether the fingerprint captures every input of this task
    pub fn all_inputs_declared(&self) -> bool {
        self.all_inputs_declared
    }

    /// Whether `generate` will provision and migrate a database
    pub fn engages_container(&self) -> bool {
        self.use_container && self.configuration.connection_url().is_none()
    }

    /// Path of the document written for the generator
    pub fn document_path(&self) -> PathBuf {
        self.work_dir.join(defaults::CONFIG_DOCUMENT)
    }

    pub fn normalized(&self) -> NormalizedConfiguration {
        normalize(&self.configuration, self.hooks.normalization.as_deref())
    }

    /// Cache key over the declared configuration, recomputed on every call
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::of(&self.normalized())
    }

    /// Up-to-date gate for the surrounding build: a task whose inputs are not
    /// all declared is never up to date.
    pub fn is_up_to_date(&self, previous: Option<&Fingerprint>) -> Result<bool> {
        if !self.all_inputs_declared {
            return Ok(false);
        }
        match previous {
            Some(previous) => Ok(*previous == self.fingerprint()?),
            None => Ok(false),
        }
    }

    /// Run every stage of the task.
    pub async fn generate(
        &self,
        services: &BuildServices,
    ) -> std::result::Result<GenerationOutcome, TaskError> {
        let fail = |stage: Stage| {
            let task = self.name.clone();
            move |source: CodegenError| TaskError {
                task,
                stage,
                source,
            }
        };

        info!("Generating `{}` into {}", self.name, self.output_dir.display());

        // Init: every check that needs no side effect
        output::ensure_clean_target(&self.configuration).map_err(fail(Stage::Init))?;
        output::ensure_safe_output_dir(&self.output_dir, &self.project_dir)
            .map_err(fail(Stage::Init))?;
        let fingerprint = self.fingerprint().map_err(fail(Stage::Init))?;
        debug!("Task `{}` fingerprint {}", self.name, fingerprint);

        let mut effective = self.configuration.clone();
        let mut migrations = Vec::new();

        if self.engages_container() {
            let schema = effective
                .generator
                .database
                .input_schema
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    CodegenError::ConfigError(
                        "generator.database.input_schema is required to migrate an ephemeral database"
                            .into(),
                    )
                })
                .map_err(fail(Stage::Init))?;

            let handle = services
                .database(defaults::DATABASE_SERVICE)
                .acquire()
                .await
                .map_err(fail(Stage::ProvisionDatabase))?;
            effective.use_database(&handle);

            migrations = self
                .migrate(services, &handle, &schema)
                .await
                .map_err(fail(Stage::Migrate))?;
            effective.generator.database.exclude_migration_history();
        }

        trim_defaults(&mut effective);
        effective.generator.target.directory = Some(self.output_dir.clone());

        output::clean_output_dir(&self.output_dir).map_err(fail(Stage::Clean))?;

        let document = self.document_path();
        document::write(&effective, &self.schema, &document).map_err(fail(Stage::Write))?;

        let result = generator::run(
            &self.generator,
            &document,
            &self.project_dir,
            self.hooks.process_spec.as_deref(),
        )
        .await
        .map_err(fail(Stage::Invoke))?;

        let verdict = self.judge(&result).map_err(fail(Stage::Invoke))?;
        info!("Task `{}` done", self.name);

        Ok(GenerationOutcome {
            task: self.name.clone(),
            fingerprint,
            migrations,
            result,
            verdict,
        })
    }

    async fn migrate(
        &self,
        services: &BuildServices,
        handle: &DatabaseHandle,
        schema: &str,
    ) -> Result<Vec<MigrationRecord>> {
        let lock = services.migration_lock(defaults::DATABASE_SERVICE, schema);
        let _guard = lock.lock().await;

        let runner = MigrationRunner::new(&self.migrations_dir);
        let mut target = services.connector().connect(handle).await?;
        let applied = runner.apply(target.as_mut(), schema).await;
        let closed = target.close().await;
        let applied = applied?;
        closed?;
        Ok(applied)
    }

    /// Non-zero exits fail the task unless a result hook accepts them
    fn judge(&self, result: &GenerationResult) -> Result<Option<Verdict>> {
        let Some(hook) = &self.hooks.result else {
            if result.succeeded() {
                return Ok(None);
            }
            return Err(CodegenError::GeneratorFailed {
                exit_code: result.exit_code,
                detail: failure_detail(result),
            });
        };

        match hook(result) {
            Verdict::Accept => Ok(Some(Verdict::Accept)),
            Verdict::Reject(reason) => Err(CodegenError::GeneratorFailed {
                exit_code: result.exit_code,
                detail: reason,
            }),
        }
    }
}

/// Last stderr line, or a pointer to the log when there is none
fn failure_detail(result: &GenerationResult) -> String {
    result
        .stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "see generator output".to_string())
}

/// Run `tasks` concurrently, then release the build's shared services once.
pub async fn generate_all(
    tasks: &[GenerationTask],
    services: &BuildServices,
) -> Vec<std::result::Result<GenerationOutcome, TaskError>> {
    let outcomes =
        futures::future::join_all(tasks.iter().map(|task| task.generate(services))).await;
    if let Err(e) = services.shutdown().await {
        tracing::warn!("Failed to shut down build services: {}", e);
    }
    outcomes
}

/// Builder for [`GenerationTask`], for programmatic configuration
pub struct GenerationTaskBuilder {
    name: String,
    configuration: Configuration,
    project_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    migrations_dir: Option<PathBuf>,
    use_container: bool,
    all_inputs_declared: bool,
    generator: Option<GeneratorCommand>,
    schema: SchemaSource,
    hooks: TaskHooks,
}

impl GenerationTaskBuilder {
    fn new(name: String, configuration: Configuration) -> Self {
        Self {
            name,
            configuration,
            project_dir: None,
            output_dir: None,
            work_dir: None,
            migrations_dir: None,
            use_container: defaults::USE_CONTAINER,
            all_inputs_declared: false,
            generator: None,
            schema: SchemaSource::default(),
            hooks: TaskHooks::default(),
        }
    }

    /// Working directory of the generator; relative paths resolve against it
    pub fn project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Directory holding this task's configuration document
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn migrations_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.migrations_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn use_container(mut self, enabled: bool) -> Self {
        self.use_container = enabled;
        self
    }

    pub fn all_inputs_declared(mut self, declared: bool) -> Self {
        self.all_inputs_declared = declared;
        self
    }

    pub fn generator(mut self, command: GeneratorCommand) -> Self {
        self.generator = Some(command);
        self
    }

    pub fn schema(mut self, schema: SchemaSource) -> Self {
        self.schema = schema;
        self
    }

    pub fn normalization(
        mut self,
        hook: impl Fn(&mut Configuration) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.normalization = Some(Arc::new(hook));
        self
    }

    pub fn process_spec(mut self, hook: impl Fn(&mut ProcessSpec) + Send + Sync + 'static) -> Self {
        self.hooks.process_spec = Some(Arc::new(hook));
        self
    }

    pub fn result_handler(
        mut self,
        hook: impl Fn(&GenerationResult) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        self.hooks.result = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<GenerationTask> {
        if self.name.trim().is_empty() {
            return Err(CodegenError::ConfigError("task name must not be blank".into()));
        }
        let generator = self
            .generator
            .filter(|command| !command.program.trim().is_empty())
            .ok_or_else(|| {
                CodegenError::ConfigError(format!(
                    "task `{}` has no generator program configured",
                    self.name
                ))
            })?;

        let project_dir = match self.project_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let resolve = |dir: Option<PathBuf>, default: PathBuf| project_dir.join(dir.unwrap_or(default));

        let output_dir = resolve(
            self.output_dir.or_else(|| self.configuration.generator.target.directory.clone()),
            Path::new(defaults::OUTPUT_ROOT).join(&self.name),
        );
        let work_dir = resolve(self.work_dir, Path::new(defaults::WORK_DIR).join(&self.name));
        let migrations_dir = resolve(self.migrations_dir, PathBuf::from(defaults::MIGRATIONS_DIR));

        Ok(GenerationTask {
            name: self.name,
            configuration: self.configuration,
            project_dir,
            output_dir,
            work_dir,
            migrations_dir,
            use_container: self.use_container,
            all_inputs_declared: self.all_inputs_declared,
            generator,
            schema: self.schema,
            hooks: self.hooks,
        })
    }
}
