//! Output directory guarding and cleaning

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Configuration;
use crate::error::{CodegenError, Result};

/// Refuse configurations that do not guarantee a clean regeneration.
pub fn ensure_clean_target(config: &Configuration) -> Result<()> {
    if !config.generator.target.clean {
        return Err(CodegenError::InvariantViolation(
            "generator.target.clean must not be set to false. \
             Disabling the cleaning of the output directory can leave stale generated files behind."
                .into(),
        ));
    }
    Ok(())
}

/// Refuse output directories whose cleaning would wipe the project itself.
pub fn ensure_safe_output_dir(output_dir: &Path, project_dir: &Path) -> Result<()> {
    let output = lexical_normalize(output_dir);
    let project = lexical_normalize(project_dir);
    if output.as_os_str().is_empty() || project.starts_with(&output) {
        return Err(CodegenError::InvariantViolation(format!(
            "output directory {} contains the project directory {}",
            output_dir.display(),
            project_dir.display()
        )));
    }
    Ok(())
}

/// Leave `dir` present and empty.
pub fn clean_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(CodegenError::file(dir))?;
    for entry in fs::read_dir(dir).map_err(CodegenError::file(dir))? {
        let path = entry.map_err(CodegenError::file(dir))?.path();
        // symlinks are removed, never followed
        let is_dir = fs::symlink_metadata(&path)
            .map_err(CodegenError::file(&path))?
            .is_dir();
        if is_dir {
            fs::remove_dir_all(&path).map_err(CodegenError::file(&path))?;
        } else {
            fs::remove_file(&path).map_err(CodegenError::file(&path))?;
        }
        debug!("Removed {}", path.display());
    }
    Ok(())
}

/// Resolve `.` and `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_required() {
        let mut config = Configuration::default();
        assert!(ensure_clean_target(&config).is_ok());
        config.generator.target.clean = false;
        let err = ensure_clean_target(&config).unwrap_err();
        assert!(matches!(err, CodegenError::InvariantViolation(_)));
        assert!(err.to_string().contains("generator.target.clean"));
    }

    #[test]
    fn test_clean_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("generated");
        fs::create_dir_all(out.join("com/example/old")).unwrap();
        fs::write(out.join("com/example/old/Users.java"), "class Users {}").unwrap();
        fs::write(out.join("unrelated.txt"), "left over").unwrap();

        clean_output_dir(&out).unwrap();

        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/b/generated");
        clean_output_dir(&out).unwrap();
        assert!(out.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep");
        fs::create_dir(&keep).unwrap();
        fs::write(keep.join("important.txt"), "data").unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        std::os::unix::fs::symlink(&keep, out.join("link")).unwrap();

        clean_output_dir(&out).unwrap();

        assert!(keep.join("important.txt").exists());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_output_dir_must_not_contain_project() {
        let project = Path::new("/work/app");
        assert!(ensure_safe_output_dir(Path::new("/work/app/target/gen"), project).is_ok());
        assert!(ensure_safe_output_dir(Path::new("/work/app"), project).is_err());
        assert!(ensure_safe_output_dir(Path::new("/work"), project).is_err());
        assert!(ensure_safe_output_dir(Path::new("/work/app/gen/.."), project).is_err());
        assert!(ensure_safe_output_dir(Path::new("/work/other"), project).is_ok());
    }
}
