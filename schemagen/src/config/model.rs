//! Generator-facing configuration model
//!
//! These types are what the external generator consumes (serialized by
//! [`crate::document`]) and what the fingerprint is computed over (after
//! [`crate::normalize`]). Field declaration order is part of the canonical
//! serialization, so reordering fields changes every fingerprint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::defaults;
use crate::database::DatabaseHandle;

/// Complete code generation configuration for one task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Connection used by the generator; `None` when nothing is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdbc: Option<Jdbc>,

    pub generator: Generator,
}

/// Connection parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Jdbc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Jdbc {
    /// True when no field carries a value
    pub fn is_unset(&self) -> bool {
        is_blank(&self.driver)
            && is_blank(&self.url)
            && is_blank(&self.user)
            && is_blank(&self.password)
            && self.auto_commit.is_none()
            && self.properties.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Generator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub database: Database,
    pub generate: Generate,
    pub target: Target,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            strategy: Some(Strategy {
                name: Some(defaults::STRATEGY_NAME.to_string()),
                matchers: None,
            }),
            database: Database::default(),
            generate: Generate::default(),
            target: Target::default(),
        }
    }
}

/// Naming strategy: either a named implementation or matcher rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Strategy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Matchers>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Matchers {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<MatcherRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<MatcherRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<MatcherRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatcherRule {
    /// Regular expression matched against the object name
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<MatcherTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherTransform {
    AsIs,
    Lower,
    Upper,
    Camel,
    Pascal,
}

/// Which part of the schema is read, and how its types are mapped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Database {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<String>,
    /// Applied in order; the first matching rule wins
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forced_types: Vec<ForcedType>,
}

impl Database {
    /// Hide the migration history table from the generator.
    pub fn exclude_migration_history(&mut self) {
        let pattern = defaults::MIGRATION_HISTORY_EXCLUDE;
        self.excludes = Some(match self.excludes.as_deref().map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{pattern} | {existing}"),
            _ => pattern.to_string(),
        });
    }
}

/// Rule mapping matched columns or types onto a target-language type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForcedType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_types: Option<String>,
}

const TIMESTAMP_INSTANT_CONVERTER: &str =
    "io.github.alexritian.codegen.converter.TimestampInstantConverter";
const TIMESTAMP_TYPES: &str = r"(?i)TIMESTAMP(_WITH(_TIME)?_ZONE|_TZ|TZ)?(\(.*\))?";

impl ForcedType {
    /// Map every timestamp column onto `java.time.Instant`.
    pub fn timestamp_to_instant() -> Self {
        let mut forced = Self {
            name: None,
            user_type: Some("java.time.Instant".to_string()),
            converter: Some(TIMESTAMP_INSTANT_CONVERTER.to_string()),
            include_expression: Some(r".*\.*".to_string()),
            include_types: Some(TIMESTAMP_TYPES.to_string()),
        };
        forced.name = Some(forced.derived_name());
        forced
    }

    /// Name built from the rule's own fields, so equal rules get equal names
    fn derived_name(&self) -> String {
        [
            &self.converter,
            &self.include_expression,
            &self.user_type,
            &self.include_types,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .collect()
    }
}

/// Named forced-type rules that can be enabled from the project file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedTypePreset {
    TimestampToInstant,
}

impl ForcedTypePreset {
    pub fn forced_type(self) -> ForcedType {
        match self {
            Self::TimestampToInstant => ForcedType::timestamp_to_instant(),
        }
    }
}

/// Generation flags passed through to the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Generate {
    pub pojos: bool,
    pub records: bool,
    pub relations: bool,
    pub deprecated: bool,
    pub immutable_pojos: bool,
    pub fluent_setters: bool,
    pub pojos_equals_and_hash_code: bool,
    pub spring_annotations: bool,
}

impl Default for Generate {
    fn default() -> Self {
        Self {
            pojos: true,
            records: true,
            relations: true,
            deprecated: false,
            immutable_pojos: false,
            fluent_setters: true,
            pojos_equals_and_hash_code: true,
            spring_annotations: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Target {
    pub package_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub clean: bool,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            package_name: defaults::PACKAGE_NAME.to_string(),
            directory: None,
            clean: defaults::TARGET_CLEAN,
        }
    }
}

impl Configuration {
    /// Connection URL as configured, if it carries anything but whitespace
    pub fn connection_url(&self) -> Option<&str> {
        self.jdbc
            .as_ref()
            .and_then(|jdbc| jdbc.url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    /// Point the connection at `handle`, keeping any other jdbc settings.
    pub fn use_database(&mut self, handle: &DatabaseHandle) {
        let jdbc = self.jdbc.get_or_insert_with(Jdbc::default);
        jdbc.driver = Some(handle.driver.clone());
        jdbc.url = Some(handle.url.clone());
        jdbc.user = Some(handle.user.clone());
        jdbc.password = Some(handle.password.clone());
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
