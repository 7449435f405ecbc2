//! Configuration document handed to the external generator
//!
//! The document is the effective [`Configuration`] serialized as JSON. It is
//! validated against a versioned schema before it is written, so the
//! generator never sees a document its interface contract does not allow.
//!
//! # Generator contract
//!
//! The generator receives the document path as its last argument. Under
//! `schemagen-codegen-1.0` the document is a UTF-8 JSON object with snake_case
//! keys:
//!
//! ```json
//! {
//!   "jdbc": { "driver": "...", "url": "jdbc:mysql://...", "user": "...", "password": "..." },
//!   "generator": {
//!     "strategy": { "name": "..." },
//!     "database": { "input_schema": "app", "excludes": "flyway_.*", "forced_types": [] },
//!     "generate": { "pojos": true, "records": true },
//!     "target": { "package_name": "com.example.db", "directory": "/abs/out", "clean": true }
//!   }
//! }
//! ```
//!
//! `jdbc` is present whenever a connection is known, `target.directory` is
//! always absolute and always set, and unset optional values are omitted
//! rather than written as `null`. Generators that only read another format
//! (jOOQ's `GenerationTool` reads XML) need a thin adapter that translates
//! this document.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{defaults, Configuration};
use crate::error::{CodegenError, Result};

/// Bundled schemas by identifier
const BUNDLED_SCHEMAS: &[(&str, &str)] = &[(
    defaults::DOCUMENT_SCHEMA,
    include_str!("schemas/schemagen-codegen-1.0.json"),
)];

/// Look up a bundled schema by its versioned identifier
pub fn bundled_schema(id: &str) -> Option<&'static str> {
    BUNDLED_SCHEMAS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, schema)| *schema)
}

/// Where the document schema comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// One of the schemas shipped with this crate
    Bundled(String),
    /// A schema file shipped with the generator
    File(PathBuf),
}

impl Default for SchemaSource {
    fn default() -> Self {
        Self::Bundled(defaults::DOCUMENT_SCHEMA.to_string())
    }
}

impl SchemaSource {
    /// Identifier used in messages
    pub fn resource(&self) -> String {
        match self {
            Self::Bundled(id) => id.clone(),
            Self::File(path) => path.display().to_string(),
        }
    }

    fn load(&self) -> Result<Value> {
        let text = match self {
            Self::Bundled(id) => bundled_schema(id)
                .ok_or_else(|| CodegenError::SchemaResourceMissing(id.clone()))?
                .to_string(),
            Self::File(path) => fs::read_to_string(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CodegenError::SchemaResourceMissing(path.display().to_string())
                }
                _ => CodegenError::SchemaResourceError {
                    resource: path.display().to_string(),
                    reason: e.to_string(),
                },
            })?,
        };
        serde_json::from_str(&text).map_err(|e| CodegenError::SchemaResourceError {
            resource: self.resource(),
            reason: e.to_string(),
        })
    }
}

/// Validate `config` against `schema` and write it to `path`.
///
/// Nothing is written when validation fails.
pub fn write(config: &Configuration, schema: &SchemaSource, path: &Path) -> Result<()> {
    let schema_value = schema.load()?;
    let validator =
        jsonschema::validator_for(&schema_value).map_err(|e| CodegenError::SchemaResourceError {
            resource: schema.resource(),
            reason: e.to_string(),
        })?;

    let document = serde_json::to_value(config)?;
    let violations: Vec<String> = validator
        .iter_errors(&document)
        .map(|e| e.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(CodegenError::ValidationError {
            schema: schema.resource(),
            violations,
            document: serde_json::to_string_pretty(&redacted(&document))?,
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CodegenError::file(parent))?;
    }
    fs::write(path, serde_json::to_string_pretty(&document)?).map_err(CodegenError::file(path))?;
    debug!("Wrote configuration document {}", path.display());
    Ok(())
}

/// Copy of `document` with the connection password masked
fn redacted(document: &Value) -> Value {
    let mut copy = document.clone();
    if let Some(password) = copy.pointer_mut("/jdbc/password") {
        *password = Value::String("******".into());
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForcedType, Jdbc};

    fn valid_config() -> Configuration {
        let mut config = Configuration::default();
        config.jdbc = Some(Jdbc {
            driver: Some("com.mysql.cj.jdbc.Driver".into()),
            url: Some("jdbc:mysql://127.0.0.1:3306/test".into()),
            user: Some("root".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        });
        config.generator.database.input_schema = Some("app".into());
        config.generator.database.forced_types = vec![ForcedType::timestamp_to_instant()];
        config.generator.target.directory = Some(PathBuf::from("/work/app/target/generated"));
        config
    }

    #[test]
    fn test_bundled_schema_is_valid_json_schema() {
        let text = bundled_schema(defaults::DOCUMENT_SCHEMA).unwrap();
        let value: Value = serde_json::from_str(text).unwrap();
        assert!(jsonschema::validator_for(&value).is_ok());
        assert!(bundled_schema("schemagen-codegen-0.1").is_none());
    }

    #[test]
    fn test_write_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main/codegen-config.json");
        let config = valid_config();

        write(&config, &SchemaSource::default(), &path).unwrap();

        let written: Configuration =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, config);
    }

    #[test]
    fn test_written_document_follows_generator_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegen-config.json");
        write(&valid_config(), &SchemaSource::default(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('{'));
        assert!(!text.contains("null"));

        let written: Value = serde_json::from_str(&text).unwrap();
        let schema: Value =
            serde_json::from_str(bundled_schema(defaults::DOCUMENT_SCHEMA).unwrap()).unwrap();
        assert!(jsonschema::validator_for(&schema).unwrap().is_valid(&written));

        assert_eq!(written["jdbc"]["url"], "jdbc:mysql://127.0.0.1:3306/test");
        assert_eq!(written["generator"]["database"]["input_schema"], "app");
        let forced = &written["generator"]["database"]["forced_types"][0];
        assert_eq!(forced["user_type"], "java.time.Instant");
        assert!(forced["include_types"].is_string());
        let target = &written["generator"]["target"];
        assert_eq!(target["package_name"], "schemagen.generated");
        assert_eq!(target["directory"], "/work/app/target/generated");
        assert_eq!(target["clean"], true);
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegen-config.json");
        let mut config = valid_config();
        config.generator.target.package_name = "not a package!".into();

        let err = write(&config, &SchemaSource::default(), &path).unwrap_err();
        match &err {
            CodegenError::ValidationError {
                schema,
                violations,
                document,
            } => {
                assert_eq!(schema, defaults::DOCUMENT_SCHEMA);
                assert_eq!(violations.len(), 1);
                assert!(document.contains("not a package!"));
                assert!(!document.contains("hunter2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_target_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config();
        config.generator.target.directory = None;
        let err = write(&config, &SchemaSource::default(), &dir.path().join("c.json")).unwrap_err();
        assert!(matches!(err, CodegenError::ValidationError { .. }));
    }

    #[test]
    fn test_unknown_bundled_schema() {
        let dir = tempfile::tempdir().unwrap();
        let source = SchemaSource::Bundled("schemagen-codegen-9.9".into());
        let err = write(&valid_config(), &source, &dir.path().join("c.json")).unwrap_err();
        assert!(matches!(err, CodegenError::SchemaResourceMissing(ref id) if id == "schemagen-codegen-9.9"));
    }

    #[test]
    fn test_missing_schema_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = SchemaSource::File(dir.path().join("missing.json"));
        let err = write(&valid_config(), &source, &dir.path().join("c.json")).unwrap_err();
        assert!(matches!(err, CodegenError::SchemaResourceMissing(_)));
    }

    #[test]
    fn test_schema_file_not_json() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        fs::write(&schema_path, "<xs:schema/>").unwrap();
        let err = write(
            &valid_config(),
            &SchemaSource::File(schema_path),
            &dir.path().join("c.json"),
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::SchemaResourceError { .. }));
    }
}
