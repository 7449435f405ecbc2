//! schemagen: provision, migrate and fingerprint a database schema, then hand it
//! to an external source code generator
//!
//! Each generation task:
//!
//! - computes a fingerprint of its declared configuration so the surrounding
//!   build can skip it when nothing changed
//! - starts an ephemeral MySQL container shared by every task of the build (only
//!   when no connection URL is configured) and applies versioned SQL migrations
//! - wipes its output directory and writes a schema-validated configuration document
//! - runs the configured generator with that document's path as its last argument
//!
//! The document is JSON conforming to the bundled `schemagen-codegen-1.0`
//! schema (see [`document`]). There is no default generator: `generator.program`
//! must name a command that reads that format.
//!
//! # Configuration
//!
//! Tasks are declared in `schemagen.toml`:
//!
//! ```toml
//! migrations_dir = "db/migration"
//!
//! [generator]
//! program = "java"
//! args = ["-jar", "lib/codegen-runner.jar"]
//! classpath = ["lib/mysql-connector-j.jar"]
//!
//! [tasks.main]
//! forced_type_presets = ["timestamp_to_instant"]
//!
//! [tasks.main.configuration.generator.database]
//! input_schema = "app"
//!
//! [tasks.main.configuration.generator.target]
//! package_name = "com.example.db"
//! ```
//!
//! # Programmatic Usage
//!
//! ```rust,ignore
//! use schemagen::{BuildServices, Configuration, GenerationTask, GeneratorCommand};
//!
//! let mut configuration = Configuration::default();
//! configuration.generator.database.input_schema = Some("app".into());
//!
//! let task = GenerationTask::builder("main", configuration)
//!     .project_dir(".")
//!     .generator(GeneratorCommand {
//!         program: "./bin/codegen".into(),
//!         args: Vec::new(),
//!         classpath: Vec::new(),
//!         env: Default::default(),
//!     })
//!     .build()?;
//!
//! let services = BuildServices::mysql(None);
//! let outcome = task.generate(&services).await?;
//! services.shutdown().await?;
//! println!("{} {}", outcome.task, outcome.fingerprint);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! schemagen --config schemagen.toml generate
//! schemagen --task main fingerprint
//! ```

pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod migration;
pub mod normalize;
pub mod output;
pub mod task;

use std::path::Path;

use tracing::info;

pub use config::{Configuration, ProjectConfig};
pub use database::{BuildServices, DatabaseHandle, EphemeralDatabaseService};
pub use error::{CodegenError, Result};
pub use fingerprint::Fingerprint;
pub use generator::{GenerationResult, GeneratorCommand, ProcessSpec};
pub use task::{generate_all, GenerationOutcome, GenerationTask, Stage, TaskError, Verdict};

/// Resolve the tasks of `project` against `project_dir`, keeping only `only`
/// when it is not empty.
pub fn select_tasks(
    project: &ProjectConfig,
    project_dir: &Path,
    only: &[String],
) -> Result<Vec<GenerationTask>> {
    if let Some(unknown) = only.iter().find(|name| !project.tasks.contains_key(*name)) {
        return Err(CodegenError::ConfigError(format!(
            "unknown task `{}` (declared: {})",
            unknown,
            project.tasks.keys().cloned().collect::<Vec<_>>().join(", ")
        )));
    }

    let tasks = project.tasks(project_dir)?;
    Ok(tasks
        .into_iter()
        .filter(|task| only.is_empty() || only.iter().any(|name| name == task.name()))
        .collect())
}

/// Generate every selected task of `project` against MySQL containers.
///
/// Returns the number of tasks that failed; each failure has already been logged.
pub async fn generate_project(
    project: &ProjectConfig,
    project_dir: &Path,
    only: &[String],
) -> Result<usize> {
    let tasks = select_tasks(project, project_dir, only)?;
    info!("Generating {} task(s)", tasks.len());

    let services = BuildServices::mysql(project.container.image_tag.clone());
    let mut failed = 0;
    for outcome in generate_all(&tasks, &services).await {
        match outcome {
            Ok(outcome) => info!(
                "Task `{}` generated ({} migration(s) applied, fingerprint {})",
                outcome.task,
                outcome.migrations.len(),
                outcome.fingerprint
            ),
            Err(e) => {
                tracing::error!("{}", e);
                failed += 1;
            }
        }
    }
    Ok(failed)
}
