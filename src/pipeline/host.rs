use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait HostCommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone)]
pub struct StdHostCommandRunner;

impl HostCommandRunner for StdHostCommandRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let output = Command::new(spec.program.as_str())
            .args(spec.args.iter().map(String::as_str))
            .output()?;

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).to_string(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ScriptExecutionError {
    #[error("failed to write script file '{}': {source}", .path.display())]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with code {status_code}: {}", failure_text(.stdout, .stderr))]
    HostFailed {
        program: String,
        status_code: i32,
        stdout: String,
        stderr: String,
    },
}

fn failure_text<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim()
    } else {
        stderr
    }
}

/// Runs one rendered script in the image host and returns its text output.
/// Ordinary failures (host missing, non-zero exit) come back as `Err` with a
/// descriptive message, never as a panic.
pub trait ScriptExecutor: Send + Sync + 'static {
    fn execute(&self, script: &str) -> Result<String, ScriptExecutionError>;
}

pub type SharedScriptExecutor = Arc<dyn ScriptExecutor>;

#[derive(Debug, Clone)]
pub struct PhotoshopScriptExecutor<R> {
    runner: R,
    program: String,
    script_dir: PathBuf,
    keep_scripts: bool,
}

impl<R> PhotoshopScriptExecutor<R>
where
    R: HostCommandRunner,
{
    pub fn new(program: impl Into<String>, script_dir: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            runner,
            program: program.into(),
            script_dir: script_dir.into(),
            keep_scripts: false,
        }
    }

    pub fn with_keep_scripts(mut self, keep_scripts: bool) -> Self {
        self.keep_scripts = keep_scripts;
        self
    }

    pub fn build_command(&self, script_path: &Path) -> CommandSpec {
        CommandSpec {
            program: self.program.clone(),
            args: vec![String::from("-r"), script_path.to_string_lossy().to_string()],
        }
    }

    fn write_script(&self, script: &str) -> Result<PathBuf, ScriptExecutionError> {
        let path = self
            .script_dir
            .join(format!("script_{}.jsx", Uuid::new_v4().simple()));
        let write_error = |source| ScriptExecutionError::ScriptWrite {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(self.script_dir.as_path()).map_err(write_error)?;
        fs::write(path.as_path(), script).map_err(write_error)?;
        Ok(path)
    }
}

impl<R> ScriptExecutor for PhotoshopScriptExecutor<R>
where
    R: HostCommandRunner,
{
    fn execute(&self, script: &str) -> Result<String, ScriptExecutionError> {
        let script_path = self.write_script(script)?;
        let spec = self.build_command(script_path.as_path());
        debug!(
            program = %spec.program,
            script = %script_path.display(),
            bytes = script.len(),
            "running host script"
        );

        let result = self.runner.run(&spec);

        if !self.keep_scripts {
            if let Err(error) = fs::remove_file(script_path.as_path()) {
                warn!(script = %script_path.display(), error = %error, "failed to remove script file");
            }
        }

        let output = result.map_err(|source| ScriptExecutionError::Launch {
            program: spec.program.clone(),
            source,
        })?;
        if output.status_code != 0 {
            return Err(ScriptExecutionError::HostFailed {
                program: spec.program,
                status_code: output.status_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        })
    }
}
