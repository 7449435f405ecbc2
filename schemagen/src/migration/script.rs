//! Migration script discovery

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{CodegenError, Result};

const VERSIONED_PREFIX: char = 'V';
const SEPARATOR: &str = "__";
const SUFFIX: &str = ".sql";

/// Dotted numeric version. Trailing zero segments are insignificant, so
/// `1.0` and `1` are the same version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationVersion(Vec<u64>);

impl MigrationVersion {
    pub fn new(mut segments: Vec<u64>) -> Self {
        while segments.len() > 1 && segments.last() == Some(&0) {
            segments.pop();
        }
        Self(segments)
    }
}

impl FromStr for MigrationVersion {
    type Err = String;

    /// Accepts `.` or `_` between segments, as in `1.2` or `1_2`.
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        if s.is_empty() {
            return Err("empty version".into());
        }
        let segments = s
            .split(['.', '_'])
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| format!("invalid version segment {:?} in {:?}", part, s))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(segments))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

/// A versioned migration script read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: MigrationVersion,
    pub description: String,
    pub path: PathBuf,
    /// File name, as stored in the history table
    pub script: String,
    pub checksum: String,
    pub sql: String,
}

/// Split `V1_2__add_users.sql` into its version and description.
/// Returns `None` for names that are not versioned migrations.
pub fn parse_script_name(file_name: &str) -> Option<std::result::Result<(MigrationVersion, String), String>> {
    let stem = file_name.strip_prefix(VERSIONED_PREFIX)?.strip_suffix(SUFFIX)?;
    let Some((version, description)) = stem.split_once(SEPARATOR) else {
        return Some(Err(format!(
            "migration {:?} has no `{}` between version and description",
            file_name, SEPARATOR
        )));
    };
    Some(
        version
            .parse::<MigrationVersion>()
            .map(|v| (v, description.replace('_', " "))),
    )
}

/// SHA-256 over the script with line endings normalized, as lowercase hex
pub fn checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    let digest = Sha256::digest(normalized.as_bytes());
    crate::fingerprint::hex(&digest)
}

/// Read every versioned script under `location`, sorted by version.
///
/// A missing directory yields no scripts. Files that do not follow the
/// `V<version>__<description>.sql` convention are skipped.
pub fn discover_scripts(location: &Path) -> Result<Vec<MigrationScript>> {
    if !location.is_dir() {
        warn!("No migrations found: {} is not a directory", location.display());
        return Ok(Vec::new());
    }

    let mut scripts = Vec::new();
    for entry in fs::read_dir(location).map_err(CodegenError::file(location))? {
        let entry = entry.map_err(CodegenError::file(location))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let (version, description) = match parse_script_name(file_name) {
            Some(Ok(parsed)) => parsed,
            Some(Err(message)) => {
                return Err(CodegenError::migration(Some(path.clone()), message))
            }
            None => {
                debug!("Skipping non-migration file {}", path.display());
                continue;
            }
        };
        let sql = fs::read_to_string(&path).map_err(CodegenError::file(&path))?;
        scripts.push(MigrationScript {
            version,
            description,
            script: file_name.to_string(),
            checksum: checksum(&sql),
            path,
            sql,
        });
    }

    scripts.sort_by(|a, b| a.version.cmp(&b.version));
    if let Some(pair) = scripts.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(CodegenError::migration(
            Some(pair[1].path.clone()),
            format!(
                "version {} is also used by {}",
                pair[1].version,
                pair[0].path.display()
            ),
        ));
    }

    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| s.parse::<MigrationVersion>().unwrap();
        assert!(v("2") < v("10"));
        assert!(v("1.1") < v("1.2"));
        assert!(v("1.2") < v("1.10"));
        assert_eq!(v("1.0"), v("1"));
        assert_eq!(v("1_2"), v("1.2"));
        assert_eq!(v("1.2.0").to_string(), "1.2");
        assert!("1.x".parse::<MigrationVersion>().is_err());
        assert!("".parse::<MigrationVersion>().is_err());
    }

    #[test]
    fn test_parse_script_name() {
        let (version, description) = parse_script_name("V1_2__add_users.sql").unwrap().unwrap();
        assert_eq!(version.to_string(), "1.2");
        assert_eq!(description, "add users");

        assert!(parse_script_name("README.md").is_none());
        assert!(parse_script_name("R__views.sql").is_none());
        assert!(parse_script_name("V1_add_users.sql").unwrap().is_err());
        assert!(parse_script_name("Vx__bad.sql").unwrap().is_err());
    }

    #[test]
    fn test_checksum_ignores_line_endings() {
        assert_eq!(checksum("a;\r\nb;\r\n"), checksum("a;\nb;\n"));
        assert_ne!(checksum("a;"), checksum("b;"));
        assert_eq!(
            checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_discover_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V10__late.sql"), "SELECT 10;").unwrap();
        fs::write(dir.path().join("V2__second.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("V1__init.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("V3__dir.sql")).unwrap();

        let scripts = discover_scripts(dir.path()).unwrap();
        let names: Vec<_> = scripts.iter().map(|s| s.script.as_str()).collect();
        assert_eq!(names, vec!["V1__init.sql", "V2__second.sql", "V10__late.sql"]);
        assert_eq!(scripts[0].sql, "SELECT 1;");
    }

    #[test]
    fn test_discover_duplicate_versions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V1__init.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("V1_0__again.sql"), "SELECT 1;").unwrap();
        let err = discover_scripts(dir.path()).unwrap_err();
        assert!(matches!(err, CodegenError::MigrationError { .. }));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = discover_scripts(&dir.path().join("db/migration")).unwrap();
        assert!(scripts.is_empty());
    }
}
