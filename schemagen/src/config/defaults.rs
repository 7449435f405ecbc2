//! Default configuration values - single source of truth

/// Whether tasks without an explicit connection provision a database container
pub const USE_CONTAINER: bool = true;

/// Migration scripts location, relative to the project directory
pub const MIGRATIONS_DIR: &str = "db/migration";

/// Scratch directory for per-task configuration documents
pub const WORK_DIR: &str = "target/schemagen";

/// Parent of the default per-task output directories
pub const OUTPUT_ROOT: &str = "target/generated/schemagen";

/// Name of the configuration document written for the generator
pub const CONFIG_DOCUMENT: &str = "codegen-config.json";

/// Identifier of the bundled document schema
pub const DOCUMENT_SCHEMA: &str = "schemagen-codegen-1.0";

/// Naming strategy applied when none is configured
pub const STRATEGY_NAME: &str = "io.github.alexritian.codegen.NameGeneratorStrategy";

/// Package of generated sources
pub const PACKAGE_NAME: &str = "schemagen.generated";

/// Whether the output directory is cleaned before generation
pub const TARGET_CLEAN: bool = true;

/// Registry name of the shared ephemeral database
pub const DATABASE_SERVICE: &str = "mysql";

/// Pattern prepended to `excludes` once migrations have created their history table
pub const MIGRATION_HISTORY_EXCLUDE: &str = "flyway_.*";

/// History table maintained by the migration runner
pub const MIGRATION_HISTORY_TABLE: &str = "flyway_schema_history";
