//! Project configuration for schemagen (`schemagen.toml`)

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::defaults;
use super::model::{Configuration, ForcedTypePreset};
use crate::document::SchemaSource;
use crate::error::{CodegenError, Result};
use crate::generator::GeneratorCommand;
use crate::task::GenerationTask;

/// Top-level project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Provision a database container for tasks without a connection URL
    #[serde(default = "default_use_container")]
    pub use_container: bool,

    /// Migration scripts location, relative to the project directory
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Scratch directory for configuration documents
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Parent of per-task output directories when a task names none
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    #[serde(default)]
    pub container: ContainerSettings,

    #[serde(default)]
    pub generator: GeneratorSettings,

    /// Generation tasks by name
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSettings>,

    /// Log level (trace, debug, info, warn, error)
    /// Can be overridden by RUST_LOG env var
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Ephemeral database container options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// MySQL image tag; the module default when unset
    #[serde(default)]
    pub image_tag: Option<String>,
}

/// How the external generator is launched.
///
/// The program receives the path of a JSON document conforming to `schema`
/// as its last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    #[serde(default)]
    pub program: String,

    /// Arguments placed before the document path
    #[serde(default)]
    pub args: Vec<String>,

    /// Classpath entries, relative to the project directory
    #[serde(default)]
    pub classpath: Vec<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Identifier of a bundled document schema
    #[serde(default = "default_document_schema")]
    pub schema: String,

    /// Schema file on disk; takes precedence over `schema`
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

/// One generation task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Overrides the project-wide `use_container`
    #[serde(default)]
    pub use_container: Option<bool>,

    /// Whether every input of this task is captured by its fingerprint
    #[serde(default)]
    pub all_inputs_declared: bool,

    /// Appended after the configured forced types, in order
    #[serde(default)]
    pub forced_type_presets: Vec<ForcedTypePreset>,

    #[serde(default)]
    pub configuration: Configuration,
}

// Default value functions for serde
fn default_use_container() -> bool {
    defaults::USE_CONTAINER
}
fn default_migrations_dir() -> PathBuf {
    PathBuf::from(defaults::MIGRATIONS_DIR)
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(defaults::WORK_DIR)
}
fn default_output_root() -> PathBuf {
    PathBuf::from(defaults::OUTPUT_ROOT)
}
fn default_document_schema() -> String {
    defaults::DOCUMENT_SCHEMA.to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            use_container: default_use_container(),
            migrations_dir: default_migrations_dir(),
            work_dir: default_work_dir(),
            output_root: default_output_root(),
            container: ContainerSettings::default(),
            generator: GeneratorSettings::default(),
            tasks: BTreeMap::new(),
            log_level: None,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            classpath: Vec::new(),
            env: BTreeMap::new(),
            schema: default_document_schema(),
            schema_file: None,
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(CodegenError::file(path))?;
        let config: ProjectConfig = toml::from_str(&content).map_err(|e| {
            CodegenError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(config)
    }

    /// Load configuration using config-rs (file + environment variables)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from config file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        } else {
            // Try default locations
            builder = builder.add_source(File::with_name("schemagen").required(false));
        }

        // Override with environment variables (SCHEMAGEN_*, nested keys split on "__")
        builder = builder.add_source(
            Environment::with_prefix("SCHEMAGEN")
                .separator("__")
                .try_parsing(true),
        );

        let config: ProjectConfig = builder.build()?.try_deserialize()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(CodegenError::ConfigError(
                "at least one [tasks.<name>] section is required".into(),
            ));
        }

        if let Some(name) = self.tasks.keys().find(|name| name.trim().is_empty()) {
            return Err(CodegenError::ConfigError(format!(
                "task name must not be blank: {:?}",
                name
            )));
        }

        if self.generator.program.trim().is_empty() {
            return Err(CodegenError::ConfigError(
                "generator.program is required: a command that accepts the path of a \
                 configuration document as its last argument"
                    .into(),
            ));
        }

        if self.generator.schema_file.is_none() && self.generator.schema.trim().is_empty() {
            return Err(CodegenError::ConfigError(
                "generator.schema or generator.schema_file is required".into(),
            ));
        }

        Ok(())
    }

    /// Resolve every task against `project_dir`
    pub fn tasks(&self, project_dir: &Path) -> Result<Vec<GenerationTask>> {
        self.tasks
            .iter()
            .map(|(name, settings)| self.task(project_dir, name, settings))
            .collect()
    }

    fn task(
        &self,
        project_dir: &Path,
        name: &str,
        settings: &TaskSettings,
    ) -> Result<GenerationTask> {
        let mut configuration = settings.configuration.clone();
        configuration.generator.database.forced_types.extend(
            settings
                .forced_type_presets
                .iter()
                .map(|preset| preset.forced_type()),
        );

        let output_dir = match &configuration.generator.target.directory {
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(&self.output_root).join(name),
        };

        let command = GeneratorCommand {
            program: self.generator.program.clone(),
            args: self.generator.args.clone(),
            classpath: self
                .generator
                .classpath
                .iter()
                .map(|entry| project_dir.join(entry))
                .collect(),
            env: self.generator.env.clone(),
        };

        let schema = match &self.generator.schema_file {
            Some(file) => SchemaSource::File(project_dir.join(file)),
            None => SchemaSource::Bundled(self.generator.schema.clone()),
        };

        GenerationTask::builder(name, configuration)
            .project_dir(project_dir)
            .output_dir(output_dir)
            .work_dir(project_dir.join(&self.work_dir).join(name))
            .migrations_dir(project_dir.join(&self.migrations_dir))
            .use_container(settings.use_container.unwrap_or(self.use_container))
            .all_inputs_declared(settings.all_inputs_declared)
            .generator(command)
            .schema(schema)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
        log_level = "debug"

        [generator]
        program = "java"
        args = ["-jar", "lib/codegen-runner.jar"]
        classpath = ["lib/mysql-connector-j.jar"]

        [tasks.main]
        forced_type_presets = ["timestamp_to_instant"]

        [tasks.main.configuration.generator.database]
        input_schema = "app"

        [tasks.main.configuration.generator.target]
        package_name = "com.example.db"

        [tasks.reporting]
        use_container = false
        all_inputs_declared = true

        [tasks.reporting.configuration.jdbc]
        url = "jdbc:mysql://reporting:3306/reporting"

        [tasks.reporting.configuration.generator.target]
        directory = "src/generated/reporting"
    "#;

    #[test]
    fn test_default_config() {
        let config = ProjectConfig::default();
        assert!(config.use_container);
        assert_eq!(config.migrations_dir, PathBuf::from("db/migration"));
        assert!(config.generator.program.is_empty());
        assert!(config.generator.args.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_validation_requires_tasks() {
        let config = ProjectConfig::default();
        assert!(matches!(
            config.validate(),
            Err(CodegenError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_empty_program() {
        let mut config: ProjectConfig = toml::from_str(PROJECT).unwrap();
        assert!(config.validate().is_ok());
        config.generator.program = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_with_log_level() {
        let config: ProjectConfig = toml::from_str(PROJECT).unwrap();
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert_eq!(config.tasks.len(), 2);
    }

    #[test]
    fn test_resolve_tasks() {
        let config: ProjectConfig = toml::from_str(PROJECT).unwrap();
        let project_dir = Path::new("/work/app");
        let tasks = config.tasks(project_dir).unwrap();

        let main = tasks.iter().find(|t| t.name() == "main").unwrap();
        assert!(main.use_container());
        assert!(!main.all_inputs_declared());
        assert_eq!(
            main.output_dir(),
            Path::new("/work/app/target/generated/schemagen/main")
        );
        assert_eq!(
            main.migrations_dir(),
            Path::new("/work/app/db/migration")
        );
        assert_eq!(main.configuration().generator.database.forced_types.len(), 1);
        assert_eq!(
            main.generator_command().classpath[0],
            PathBuf::from("/work/app/lib/mysql-connector-j.jar")
        );

        let reporting = tasks.iter().find(|t| t.name() == "reporting").unwrap();
        assert!(!reporting.use_container());
        assert!(reporting.all_inputs_declared());
        assert_eq!(
            reporting.output_dir(),
            Path::new("/work/app/src/generated/reporting")
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemagen.toml");
        std::fs::write(&path, PROJECT).unwrap();
        let config = ProjectConfig::from_file(&path).unwrap();
        assert_eq!(config.tasks.len(), 2);

        std::fs::write(&path, "tasks = 3").unwrap();
        let err = ProjectConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
