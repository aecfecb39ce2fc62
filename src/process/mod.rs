//! External command execution.
//!
//! Every interaction with Terraform, the AWS CLI, SSH and the Solana CLI goes
//! through the [`CommandRunner`] trait so that the orchestration logic can be
//! exercised without any of those tools installed. A non-zero exit status is
//! not an error at this layer: callers decide what a failure means for them.

mod prerequisites;

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::ToolError;

pub use prerequisites::{Prerequisites, check_prerequisites};

/// Boxed future returned by [`CommandRunner::run`].
pub type RunCommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ToolError>> + Send + 'a>>;

/// Boxed future returned by [`CommandRunner::run_inherited`].
pub type RunInheritedFuture<'a> = Pin<Box<dyn Future<Output = Result<i32, ToolError>> + Send + 'a>>;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the child only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Return the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Return the argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Return the working directory, if any.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.current_dir.as_deref()
    }

    /// Return the first argument, used to label failures.
    #[must_use]
    pub fn subcommand(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }

    fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir.as_std_path());
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit status; `-1` when the process was killed by a signal.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Build a successful output with the given stdout, mainly for tests.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Build a failed output with the given status and stderr, mainly for tests.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Convert a non-zero exit into `ToolError::CommandFailed`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` when the exit status is non-zero.
    pub fn into_success(self, spec: &CommandSpec) -> Result<Self, ToolError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ToolError::CommandFailed {
            program: spec.program().to_owned(),
            subcommand: spec.subcommand().to_owned(),
            code: self.code,
            stderr: self.stderr.trim().to_owned(),
        })
    }
}

/// Behaviour required to run external programs.
///
/// This abstraction exists to keep orchestration testable without the real
/// tools on the machine.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr.
    fn run(&self, spec: CommandSpec) -> RunCommandFuture<'_>;

    /// Run a command attached to the caller's terminal and return its exit status.
    fn run_inherited(&self, spec: CommandSpec) -> RunInheritedFuture<'_>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: CommandSpec) -> RunCommandFuture<'_> {
        (**self).run(spec)
    }

    fn run_inherited(&self, spec: CommandSpec) -> RunInheritedFuture<'_> {
        (**self).run_inherited(spec)
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: CommandSpec) -> RunCommandFuture<'_> {
        Box::pin(async move {
            debug!(program = spec.program(), args = ?spec.arguments(), "running command");
            let output = spec
                .to_tokio()
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|error| spawn_error(&spec, &error))?;

            Ok(CommandOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }

    fn run_inherited(&self, spec: CommandSpec) -> RunInheritedFuture<'_> {
        Box::pin(async move {
            debug!(program = spec.program(), args = ?spec.arguments(), "running attached command");
            let status = spec
                .to_tokio()
                .status()
                .await
                .map_err(|error| spawn_error(&spec, &error))?;
            Ok(status.code().unwrap_or(-1))
        })
    }
}

fn spawn_error(spec: &CommandSpec, error: &std::io::Error) -> ToolError {
    if error.kind() == std::io::ErrorKind::NotFound {
        return ToolError::MissingTool {
            program: spec.program().to_owned(),
        };
    }
    ToolError::SpawnFailed {
        program: spec.program().to_owned(),
        message: error.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Shared runner mock for modules that drive external tools.

    use mockall::mock;

    use super::{CommandRunner, CommandSpec, RunCommandFuture, RunInheritedFuture};

    mock! {
        #[derive(Debug)]
        pub Runner {}

        impl CommandRunner for Runner {
            fn run<'a>(&'a self, spec: CommandSpec) -> RunCommandFuture<'a>;
            fn run_inherited<'a>(&'a self, spec: CommandSpec) -> RunInheritedFuture<'a>;
        }
    }
}
