//! External generator process invocation

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{CodegenError, Result};

/// Generator launch settings shared by the tasks of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCommand {
    pub program: String,
    /// Arguments placed before the document path
    pub args: Vec<String>,
    /// Exported to the process as `CLASSPATH`
    pub classpath: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
}

/// Fully resolved launch parameters; what a process-spec hook may change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: BTreeMap<OsString, OsString>,
    pub working_dir: PathBuf,
    /// Capture stdout/stderr into the result (and the log) instead of inheriting them
    pub capture_output: bool,
}

/// Caller hook run on the launch parameters before the process starts
pub type ProcessSpecHook = dyn Fn(&mut ProcessSpec) + Send + Sync;

/// Terminal state of one generator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GenerationResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl ProcessSpec {
    /// Launch parameters for running `command` on `document` from `working_dir`
    pub fn new(command: &GeneratorCommand, document: &Path, working_dir: &Path) -> Result<Self> {
        let mut env: BTreeMap<OsString, OsString> = command
            .env
            .iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if !command.classpath.is_empty() {
            let classpath = std::env::join_paths(&command.classpath).map_err(|e| {
                CodegenError::ConfigError(format!("invalid generator classpath: {}", e))
            })?;
            env.insert("CLASSPATH".into(), classpath);
        }

        let mut args: Vec<OsString> = command.args.iter().map(OsString::from).collect();
        args.push(document.as_os_str().to_owned());

        Ok(Self {
            program: command.program.clone().into(),
            args,
            env,
            working_dir: working_dir.to_path_buf(),
            capture_output: true,
        })
    }
}

/// Run the generator on `document` and wait for it to exit.
///
/// A non-zero exit code is returned as an ordinary result; deciding whether
/// it fails the task is up to the caller.
pub async fn run(
    command: &GeneratorCommand,
    document: &Path,
    working_dir: &Path,
    hook: Option<&ProcessSpecHook>,
) -> Result<GenerationResult> {
    let mut spec = ProcessSpec::new(command, document, working_dir)?;
    if let Some(hook) = hook {
        hook(&mut spec);
    }
    run_spec(&spec).await
}

/// Spawn the process described by `spec`
pub async fn run_spec(spec: &ProcessSpec) -> Result<GenerationResult> {
    let program = spec.program.to_string_lossy().into_owned();
    info!(
        "Running generator: {} {}",
        program,
        spec.args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let result = if spec.capture_output {
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CodegenError::SpawnError {
                program: program.clone(),
                source,
            })?;
        GenerationResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    } else {
        let status = cmd
            .status()
            .await
            .map_err(|source| CodegenError::SpawnError {
                program: program.clone(),
                source,
            })?;
        GenerationResult {
            exit_code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        }
    };

    for line in result.stdout.lines() {
        info!("[{}] {}", program, line);
    }
    for line in result.stderr.lines() {
        warn!("[{}] {}", program, line);
    }
    debug!("Generator exited with {:?}", result.exit_code);

    Ok(result)
}
