//! Remote execution on the deployed instance.
//!
//! [`SshExecutor`] runs one command on the recorded host with a bounded
//! connect timeout. [`Supervisor`] builds the `systemctl` and `journalctl`
//! invocations that manage the validator service on top of it.

use camino::Utf8PathBuf;
use tracing::{debug, info};

use crate::config::SshConfig;
use crate::error::{ConfigError, DeployError, ReconcileError, ToolError};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::state::DeploymentRecord;

/// Exit status `ssh` reserves for its own connection failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// `systemctl status` exits 3 for a unit that exists but is not running.
const SYSTEMCTL_INACTIVE: i32 = 3;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Host name or address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Private key passed with `-i`.
    pub key_file: Utf8PathBuf,
}

impl RemoteTarget {
    /// Resolve the target from the deployment record.
    ///
    /// A configured `ssh.key_file` overrides the key recorded at provisioning.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::NotDeployed` when nothing is recorded,
    /// `ReconcileError::NoAddress` when the instance has no public address,
    /// and `ConfigError::MissingRequired` when no key file is known.
    pub fn resolve(record: &DeploymentRecord, ssh: &SshConfig) -> Result<Self, DeployError> {
        let resource = record.resource().ok_or(ReconcileError::NotDeployed)?;
        let host = resource
            .public_address
            .clone()
            .ok_or_else(|| ReconcileError::NoAddress {
                resource_id: resource.resource_id.clone(),
            })?;
        let key_file = ssh
            .key_file
            .clone()
            .or_else(|| resource.credential_file.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: String::from("ssh.key_file"),
            })?;
        Ok(Self {
            host,
            user: ssh.user.clone(),
            key_file,
        })
    }

    /// `user@host` as passed to `ssh`.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Runs commands on a [`RemoteTarget`] through the `ssh` client.
#[derive(Debug, Clone)]
pub struct SshExecutor<R> {
    runner: R,
    binary: String,
    connect_timeout_secs: u64,
}

impl<R: CommandRunner> SshExecutor<R> {
    /// Create an executor using `binary` with the given connect timeout.
    #[must_use]
    pub fn new(runner: R, binary: impl Into<String>, connect_timeout_secs: u64) -> Self {
        Self {
            runner,
            binary: binary.into(),
            connect_timeout_secs,
        }
    }

    /// Build an executor from the `[ssh]` settings.
    #[must_use]
    pub fn from_config(runner: R, ssh: &SshConfig) -> Self {
        Self::new(runner, ssh.binary.as_str(), ssh.connect_timeout_secs)
    }

    fn command(&self, target: &RemoteTarget, remote: &str, batch: bool) -> CommandSpec {
        let options = CommandSpec::new(self.binary.as_str())
            .args(["-i", target.key_file.as_str()])
            .args([
                String::from("-o"),
                format!("ConnectTimeout={}", self.connect_timeout_secs),
            ])
            .args(["-o", "StrictHostKeyChecking=accept-new"]);
        let connection = if batch {
            options.args(["-o", "BatchMode=yes"])
        } else {
            options
        };
        connection.arg(target.destination()).arg("--").arg(remote)
    }

    /// Run `remote` and return its output whatever the remote exit status.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` when `ssh` itself could not connect,
    /// and propagates spawn failures.
    pub async fn run(&self, target: &RemoteTarget, remote: &str) -> Result<CommandOutput, DeployError> {
        let spec = self.command(target, remote, true);
        debug!(host = %target.host, command = remote, "running remote command");
        let output = self.runner.run(spec).await?;
        if output.code == SSH_CONNECTION_FAILURE {
            return Err(connection_failed(target, output.stderr.trim()));
        }
        Ok(output)
    }

    /// Run `remote`, requiring exit status zero, and return its stdout.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` for connection failures and for any
    /// non-zero remote exit status.
    pub async fn execute(&self, target: &RemoteTarget, remote: &str) -> Result<String, DeployError> {
        let output = self.run(target, remote).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(ToolError::CommandFailed {
            program: self.binary.clone(),
            subcommand: remote.to_owned(),
            code: output.code,
            stderr: output.stderr.trim().to_owned(),
        }
        .into())
    }

    /// Run `remote` attached to the local terminal and return its exit status.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` when `ssh` could not connect.
    pub async fn attach(&self, target: &RemoteTarget, remote: &str) -> Result<i32, DeployError> {
        let spec = self.command(target, remote, false);
        let code = self.runner.run_inherited(spec).await?;
        if code == SSH_CONNECTION_FAILURE {
            return Err(connection_failed(
                target,
                "connection failed; see ssh output above",
            ));
        }
        Ok(code)
    }
}

fn connection_failed(target: &RemoteTarget, stderr: &str) -> DeployError {
    ToolError::CommandFailed {
        program: String::from("ssh"),
        subcommand: target.destination(),
        code: SSH_CONNECTION_FAILURE,
        stderr: stderr.to_owned(),
    }
    .into()
}

fn unit_file(service: &str, user: &str, exec_start: &str) -> String {
    format!(
        "[Unit]\nDescription={service} (Solana validator)\nAfter=network-online.target\n\
         Wants=network-online.target\n\n\
         [Service]\nUser={user}\nExecStart={exec_start}\nRestart=on-failure\n\
         LimitNOFILE=1000000\n\n\
         [Install]\nWantedBy=multi-user.target\n"
    )
}

/// Single-quote `text` for a POSIX shell.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// What `validator logs` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// The requested lines.
    Captured(String),
    /// Lines were streamed to the terminal until the remote side exited.
    Streamed,
}

/// Manages the validator's systemd unit on the instance.
#[derive(Debug, Clone)]
pub struct Supervisor<R> {
    ssh: SshExecutor<R>,
    service: String,
}

impl<R: CommandRunner> Supervisor<R> {
    /// Supervise `service` through `ssh`.
    #[must_use]
    pub fn new(ssh: SshExecutor<R>, service: impl Into<String>) -> Self {
        Self {
            ssh,
            service: service.into(),
        }
    }

    /// Name of the supervised unit.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Build or install the validator with `install_command`, then write,
    /// reload and enable a unit whose `ExecStart=` is `exec_start`.
    ///
    /// # Errors
    ///
    /// Propagates connection and remote command failures. The unit is not
    /// written when the install step fails.
    pub async fn install(
        &self,
        target: &RemoteTarget,
        install_command: &str,
        exec_start: &str,
    ) -> Result<(), DeployError> {
        info!(host = %target.host, "installing validator binary");
        self.ssh.execute(target, install_command).await?;

        let unit = unit_file(&self.service, &target.user, exec_start);
        let remote = format!(
            "printf '%s' {unit} | sudo tee /etc/systemd/system/{service}.service >/dev/null \
             && sudo systemctl daemon-reload && sudo systemctl enable {service}",
            unit = shell_quote(&unit),
            service = self.service,
        );
        self.ssh.execute(target, &remote).await?;
        info!(host = %target.host, service = %self.service, "validator installed");
        Ok(())
    }

    /// Start the service.
    ///
    /// # Errors
    ///
    /// Propagates connection and remote command failures.
    pub async fn start(&self, target: &RemoteTarget) -> Result<(), DeployError> {
        self.ssh
            .execute(target, &format!("sudo systemctl start {}", self.service))
            .await?;
        info!(host = %target.host, service = %self.service, "validator started");
        Ok(())
    }

    /// Stop the service.
    ///
    /// # Errors
    ///
    /// Propagates connection and remote command failures.
    pub async fn stop(&self, target: &RemoteTarget) -> Result<(), DeployError> {
        self.ssh
            .execute(target, &format!("sudo systemctl stop {}", self.service))
            .await?;
        info!(host = %target.host, service = %self.service, "validator stopped");
        Ok(())
    }

    /// Full `systemctl status` text. An inactive unit is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` for connection failures or when
    /// the unit cannot be queried at all.
    pub async fn status(&self, target: &RemoteTarget) -> Result<String, DeployError> {
        let remote = format!("systemctl status {} --no-pager", self.service);
        let output = self.ssh.run(target, &remote).await?;
        if output.is_success() || output.code == SYSTEMCTL_INACTIVE {
            return Ok(output.stdout);
        }
        Err(ToolError::CommandFailed {
            program: String::from("ssh"),
            subcommand: remote,
            code: output.code,
            stderr: output.stderr.trim().to_owned(),
        }
        .into())
    }

    /// The last `lines` journal entries, or a live stream when `follow` is set.
    ///
    /// # Errors
    ///
    /// Propagates connection and remote command failures.
    pub async fn logs(
        &self,
        target: &RemoteTarget,
        lines: u32,
        follow: bool,
    ) -> Result<LogOutput, DeployError> {
        let remote = format!("sudo journalctl -u {} -n {lines} --no-pager", self.service);
        if !follow {
            return self.ssh.execute(target, &remote).await.map(LogOutput::Captured);
        }
        // Interrupting a follow ends ssh with the signal's status; only a
        // connection failure is worth reporting.
        self.ssh.attach(target, &format!("{remote} -f")).await?;
        Ok(LogOutput::Streamed)
    }

    /// One-word unit state such as `active` or `inactive`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` when the host is unreachable.
    pub async fn health(&self, target: &RemoteTarget) -> Result<String, DeployError> {
        let output = self
            .ssh
            .run(target, &format!("systemctl is-active {}", self.service))
            .await?;
        let state = output.stdout.trim();
        if state.is_empty() {
            return Ok(String::from("unknown"));
        }
        Ok(state.to_owned())
    }
}
