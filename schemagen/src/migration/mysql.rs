//! MySQL migration target built on mysql_async

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool};

use super::{
    AppliedMigration, MigrationConnector, MigrationScript, MigrationTarget, MigrationVersion,
};
use crate::config::defaults::MIGRATION_HISTORY_TABLE;
use crate::database::DatabaseHandle;
use crate::error::{CodegenError, Result};

/// Connects to MySQL using the handle's JDBC-style URL and credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

/// Migration target on a single MySQL connection
pub struct MySqlMigrationTarget {
    pool: Pool,
    conn: Conn,
}

fn migration_error(e: impl std::fmt::Display) -> CodegenError {
    CodegenError::migration(None, e)
}

/// Build mysql_async options from a handle, accepting `jdbc:mysql://` URLs.
pub fn connection_opts(handle: &DatabaseHandle) -> Result<Opts> {
    let url = handle.url.strip_prefix("jdbc:").unwrap_or(&handle.url);
    let opts = Opts::from_url(url).map_err(|e| {
        CodegenError::ConfigError(format!("invalid connection URL {:?}: {}", handle.url, e))
    })?;
    let password = (!handle.password.is_empty()).then(|| handle.password.clone());
    let builder = OptsBuilder::from_opts(opts)
        .user(Some(handle.user.clone()))
        .pass(password);
    Ok(builder.into())
}

/// Backtick-quote a MySQL identifier
fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn history_table(schema: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(MIGRATION_HISTORY_TABLE))
}

#[async_trait]
impl MigrationConnector for MySqlConnector {
    async fn connect(&self, handle: &DatabaseHandle) -> Result<Box<dyn MigrationTarget>> {
        let pool = Pool::new(connection_opts(handle)?);
        let conn = pool.get_conn().await.map_err(migration_error)?;
        Ok(Box::new(MySqlMigrationTarget { pool, conn }))
    }
}

#[async_trait]
impl MigrationTarget for MySqlMigrationTarget {
    async fn prepare(&mut self, schema: &str) -> Result<()> {
        self.conn
            .query_drop(format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(schema)))
            .await
            .map_err(migration_error)?;
        self.conn
            .query_drop(format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    installed_rank INT NOT NULL PRIMARY KEY,
                    version VARCHAR(50),
                    description VARCHAR(200) NOT NULL,
                    script VARCHAR(1000) NOT NULL,
                    checksum VARCHAR(64),
                    installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    execution_time INT NOT NULL,
                    success TINYINT(1) NOT NULL
                )",
                history_table(schema)
            ))
            .await
            .map_err(migration_error)
    }

    async fn applied(&mut self, schema: &str) -> Result<Vec<AppliedMigration>> {
        let rows: Vec<(u32, Option<String>, String, String, Option<String>, u64, i64)> = self
            .conn
            .query(format!(
                "SELECT installed_rank, version, description, script, checksum, execution_time, success \
                 FROM {} ORDER BY installed_rank",
                history_table(schema)
            ))
            .await
            .map_err(migration_error)?;

        rows.into_iter()
            .filter_map(|(rank, version, description, script, checksum, time, success)| {
                // repeatable entries written by other tools carry no version
                let version = version?;
                Some(
                    version
                        .parse::<MigrationVersion>()
                        .map_err(|e: String| {
                            CodegenError::migration(None, format!("history row {}: {}", rank, e))
                        })
                        .map(|version| AppliedMigration {
                            installed_rank: rank,
                            version,
                            description,
                            script,
                            checksum: checksum.unwrap_or_default(),
                            execution_time_ms: time,
                            success: success != 0,
                        }),
                )
            })
            .collect()
    }

    async fn execute(&mut self, schema: &str, script: &MigrationScript) -> Result<()> {
        self.conn
            .query_drop(format!("USE {}", quote_ident(schema)))
            .await
            .map_err(migration_error)?;
        // multi-statement text protocol: every result set is drained
        self.conn
            .query_drop(script.sql.as_str())
            .await
            .map_err(migration_error)
    }

    async fn record(&mut self, schema: &str, entry: &AppliedMigration) -> Result<()> {
        self.conn
            .exec_drop(
                format!(
                    "INSERT INTO {} (installed_rank, version, description, script, checksum, execution_time, success) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    history_table(schema)
                ),
                (
                    entry.installed_rank,
                    entry.version.to_string(),
                    entry.description.as_str(),
                    entry.script.as_str(),
                    entry.checksum.as_str(),
                    entry.execution_time_ms,
                    entry.success,
                ),
            )
            .await
            .map_err(migration_error)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { pool, conn } = *self;
        drop(conn);
        pool.disconnect().await.map_err(migration_error)
    }
}
