//! Applies pending migration scripts in version order

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::script::{discover_scripts, MigrationScript};
use super::{AppliedMigration, MigrationRecord, MigrationTarget};
use crate::error::{CodegenError, Result};

/// Migration runner bound to one scripts location
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    location: PathBuf,
}

impl MigrationRunner {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Apply every pending script to `schema`, returning only what this call
    /// applied.
    ///
    /// Validation happens before anything runs: a failed entry in the
    /// history, a changed checksum, or a pending script older than the newest
    /// applied one all abort the run. A script that fails is recorded as
    /// failed and nothing after it runs; nothing is rolled back.
    pub async fn apply(
        &self,
        target: &mut dyn MigrationTarget,
        schema: &str,
    ) -> Result<Vec<MigrationRecord>> {
        let scripts = discover_scripts(&self.location)?;

        target.prepare(schema).await?;
        let history = target.applied(schema).await?;

        let pending = pending_scripts(&scripts, &history)?;
        if pending.is_empty() {
            info!(
                "Schema `{}` is up to date ({} migrations applied)",
                schema,
                history.len()
            );
            return Ok(Vec::new());
        }

        let mut next_rank = history.iter().map(|h| h.installed_rank).max().unwrap_or(0) + 1;
        let mut records = Vec::with_capacity(pending.len());
        for script in pending {
            debug!("Migrating schema `{}` to version {}", schema, script.version);
            let started = Instant::now();
            let outcome = target.execute(schema, script).await;

            let entry = AppliedMigration {
                installed_rank: next_rank,
                version: script.version.clone(),
                description: script.description.clone(),
                script: script.script.clone(),
                checksum: script.checksum.clone(),
                execution_time_ms: started.elapsed().as_millis() as u64,
                success: outcome.is_ok(),
            };
            next_rank += 1;

            if let Err(e) = outcome {
                if let Err(record_err) = target.record(schema, &entry).await {
                    warn!(
                        "Could not record failed migration {}: {}",
                        script.script, record_err
                    );
                }
                return Err(match e {
                    CodegenError::MigrationError { message, .. } => {
                        CodegenError::migration(Some(script.path.clone()), message)
                    }
                    other => CodegenError::migration(Some(script.path.clone()), other),
                });
            }

            target.record(schema, &entry).await?;
            info!("Executed migration: {}", script.path.display());
            records.push(MigrationRecord {
                script_path: script.path.clone(),
                applied_version: script.version.clone(),
            });
        }

        Ok(records)
    }
}

/// Scripts not yet applied, after checking the history against them
fn pending_scripts<'a>(
    scripts: &'a [MigrationScript],
    history: &[AppliedMigration],
) -> Result<Vec<&'a MigrationScript>> {
    if let Some(failed) = history.iter().find(|h| !h.success) {
        return Err(CodegenError::migration(
            None,
            format!(
                "history contains failed migration {} ({}); repair the schema before migrating again",
                failed.version, failed.script
            ),
        ));
    }

    for applied in history {
        if let Some(script) = scripts.iter().find(|s| s.version == applied.version) {
            if script.checksum != applied.checksum {
                return Err(CodegenError::migration(
                    Some(script.path.clone()),
                    format!(
                        "checksum mismatch for version {}: applied {}, resolved locally {}",
                        applied.version, applied.checksum, script.checksum
                    ),
                ));
            }
        }
    }

    let latest = history.iter().map(|h| &h.version).max();
    let pending: Vec<&MigrationScript> = scripts
        .iter()
        .filter(|s| !history.iter().any(|h| h.version == s.version))
        .collect();

    if let (Some(latest), Some(first)) = (latest, pending.first()) {
        if first.version < *latest {
            return Err(CodegenError::migration(
                Some(first.path.clone()),
                format!(
                    "version {} is older than the latest applied version {}",
                    first.version, latest
                ),
            ));
        }
    }

    Ok(pending)
}
