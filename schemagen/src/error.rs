//! Error types for schemagen

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for schemagen operations
pub type Result<T> = std::result::Result<T, CodegenError>;

/// Errors that can occur while preparing or running a generation task
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The configuration asks for something the engine refuses to do.
    /// Raised before any side effect takes place.
    #[error("Configuration invariant violated: {0}")]
    InvariantViolation(String),

    /// The ephemeral database could not be started. Shared by every waiter.
    #[error("Failed to provision ephemeral database: {0}")]
    ProvisioningError(String),

    #[error("Migration failed{}: {message}", .script.as_ref().map(|p| format!(" ({})", p.display())).unwrap_or_default())]
    MigrationError {
        script: Option<PathBuf>,
        message: String,
    },

    #[error(
        "Configuration document violates schema {schema}:\n  - {}\nDocument:\n{document}",
        .violations.join("\n  - ")
    )]
    ValidationError {
        schema: String,
        violations: Vec<String>,
        document: String,
    },

    #[error("Failed to locate code generation schema: {0}")]
    SchemaResourceMissing(String),

    #[error("Failed to load code generation schema {resource}: {reason}")]
    SchemaResourceError { resource: String, reason: String },

    #[error("Failed to launch generator `{program}`: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Generator process failed ({}): {detail}", .exit_code.map(|c| format!("exit code {c}")).unwrap_or_else(|| "terminated by signal".into()))]
    GeneratorFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CodegenError {
    /// Attach a path to an I/O error.
    pub(crate) fn file(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CodegenError::FileError { path, source }
    }

    /// Migration failure, optionally attributed to a script.
    pub fn migration(script: Option<PathBuf>, message: impl ToString) -> Self {
        CodegenError::MigrationError {
            script,
            message: message.to_string(),
        }
    }
}

impl From<config::ConfigError> for CodegenError {
    fn from(err: config::ConfigError) -> Self {
        CodegenError::ConfigError(err.to_string())
    }
}
