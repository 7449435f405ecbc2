//! Versioned schema migrations
//!
//! Scripts named `V<version>__<description>.sql` are applied in ascending
//! version order. Applied state lives in the target schema's history table,
//! which makes re-running against a migrated schema a no-op.

mod mysql;
mod runner;
mod script;

pub use mysql::*;
pub use runner::*;
pub use script::*;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::database::DatabaseHandle;
use crate::error::Result;

/// A script applied by one run of the migration runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub script_path: PathBuf,
    pub applied_version: MigrationVersion,
}

/// One row of the migration history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub installed_rank: u32,
    pub version: MigrationVersion,
    pub description: String,
    pub script: String,
    pub checksum: String,
    pub execution_time_ms: u64,
    pub success: bool,
}

/// Storage the runner applies scripts to.
#[async_trait]
pub trait MigrationTarget: Send {
    /// Create the schema and its history table if missing.
    async fn prepare(&mut self, schema: &str) -> Result<()>;

    /// History rows, ordered by installed rank.
    async fn applied(&mut self, schema: &str) -> Result<Vec<AppliedMigration>>;

    /// Run the statements of `script` against `schema`.
    async fn execute(&mut self, schema: &str, script: &MigrationScript) -> Result<()>;

    /// Append a history row.
    async fn record(&mut self, schema: &str, entry: &AppliedMigration) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Opens a [`MigrationTarget`] on a provisioned database.
#[async_trait]
pub trait MigrationConnector: Send + Sync {
    async fn connect(&self, handle: &DatabaseHandle) -> Result<Box<dyn MigrationTarget>>;
}
