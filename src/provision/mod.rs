//! Infrastructure provisioning through Terraform.
//!
//! [`Provisioner`] exposes the five operations the reconciler needs: `init`,
//! `plan`, `apply`, `destroy` and `output`. [`TerraformCli`] runs the real
//! tool. Plan, apply and destroy stream to the operator's terminal because
//! they can take minutes.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{DeployError, ToolError};
use crate::process::{CommandRunner, CommandSpec};

/// Boxed future returned by the state-changing [`Provisioner`] operations.
pub type ProvisionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeployError>> + Send + 'a>>;

/// Boxed future returned by [`Provisioner::output`].
pub type OutputFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<String>, DeployError>> + Send + 'a>>;

/// Behaviour required from the infrastructure tool.
pub trait Provisioner: Send + Sync {
    /// Prepare the working directory.
    fn init(&self) -> ProvisionFuture<'_>;

    /// Compute and save a plan.
    fn plan(&self) -> ProvisionFuture<'_>;

    /// Apply the saved plan.
    fn apply(&self) -> ProvisionFuture<'_>;

    /// Tear down everything the tool manages.
    fn destroy(&self) -> ProvisionFuture<'_>;

    /// Read an output value.
    ///
    /// A missing or empty output means "not provisioned yet" and is reported
    /// as `Ok(None)`.
    fn output<'a>(&'a self, key: &str) -> OutputFuture<'a>;
}

/// [`Provisioner`] that shells out to `terraform`.
#[derive(Debug, Clone)]
pub struct TerraformCli<R> {
    runner: R,
    binary: String,
    dir: Utf8PathBuf,
    plan_file: String,
    variables: Vec<(String, String)>,
}

impl<R: CommandRunner> TerraformCli<R> {
    /// Create a provisioner running `binary` inside `dir`.
    #[must_use]
    pub fn new(runner: R, binary: impl Into<String>, dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            dir: dir.into(),
            plan_file: String::from("tfplan"),
            variables: Vec::new(),
        }
    }

    /// Build a provisioner from the `[terraform]` and `[aws]` settings.
    #[must_use]
    pub fn from_config(runner: R, config: &AppConfig) -> Self {
        Self::new(runner, config.terraform.binary.as_str(), config.terraform.dir.clone())
            .with_plan_file(config.terraform.plan_file.as_str())
            .with_variable("region", config.effective_region())
            .with_variable("instance_type", config.aws.instance_type.as_str())
    }

    /// Name of the saved plan, relative to the working directory.
    #[must_use]
    pub fn with_plan_file(mut self, plan_file: impl Into<String>) -> Self {
        self.plan_file = plan_file.into();
        self
    }

    /// Pass `-var name=value` to `plan` and `destroy`.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    fn command(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::new(self.binary.as_str())
            .current_dir(self.dir.clone())
            .args([subcommand, "-input=false"])
    }

    fn with_variables(&self, spec: CommandSpec) -> CommandSpec {
        self.variables.iter().fold(spec, |acc, (name, value)| {
            acc.args([String::from("-var"), format!("{name}={value}")])
        })
    }

    /// Run attached to the terminal and fail on a non-zero status.
    async fn run_streamed(&self, spec: CommandSpec) -> Result<(), DeployError> {
        info!(dir = %self.dir, subcommand = spec.subcommand(), "running terraform");
        let code = self.runner.run_inherited(spec.clone()).await?;
        if code == 0 {
            return Ok(());
        }
        Err(ToolError::CommandFailed {
            program: spec.program().to_owned(),
            subcommand: spec.subcommand().to_owned(),
            code,
            stderr: String::from("see Terraform output above"),
        }
        .into())
    }
}

impl<R: CommandRunner> Provisioner for TerraformCli<R> {
    fn init(&self) -> ProvisionFuture<'_> {
        Box::pin(async move {
            let spec = self.command("init");
            self.runner.run(spec.clone()).await?.into_success(&spec)?;
            debug!(dir = %self.dir, "terraform initialised");
            Ok(())
        })
    }

    fn plan(&self) -> ProvisionFuture<'_> {
        let spec = self.with_variables(
            self.command("plan")
                .arg(format!("-out={}", self.plan_file)),
        );
        Box::pin(async move { self.run_streamed(spec).await })
    }

    fn apply(&self) -> ProvisionFuture<'_> {
        let spec = self
            .command("apply")
            .args(["-auto-approve", self.plan_file.as_str()]);
        Box::pin(async move { self.run_streamed(spec).await })
    }

    fn destroy(&self) -> ProvisionFuture<'_> {
        let spec = self.with_variables(self.command("destroy").arg("-auto-approve"));
        Box::pin(async move { self.run_streamed(spec).await })
    }

    fn output<'a>(&'a self, key: &str) -> OutputFuture<'a> {
        let spec = CommandSpec::new(self.binary.as_str())
            .current_dir(self.dir.clone())
            .args(["output", "-raw", key]);
        let name = key.to_owned();
        Box::pin(async move {
            let output = self.runner.run(spec).await?;
            if !output.is_success() {
                debug!(output = %name, stderr = output.stderr.trim(), "terraform output unavailable");
                return Ok(None);
            }
            let value = output.stdout.trim();
            Ok((!value.is_empty()).then(|| value.to_owned()))
        })
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Provisioner mock shared with the reconciler tests.

    use mockall::mock;

    use super::{OutputFuture, ProvisionFuture, Provisioner};

    mock! {
        #[derive(Debug)]
        pub Provisioner {}

        impl Provisioner for Provisioner {
            fn init<'a>(&'a self) -> ProvisionFuture<'a>;
            fn plan<'a>(&'a self) -> ProvisionFuture<'a>;
            fn apply<'a>(&'a self) -> ProvisionFuture<'a>;
            fn destroy<'a>(&'a self) -> ProvisionFuture<'a>;
            fn output<'a>(&'a self, key: &str) -> OutputFuture<'a>;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::*;
    use crate::process::CommandOutput;
    use crate::process::mocks::MockRunner;

    fn terraform(runner: MockRunner) -> TerraformCli<MockRunner> {
        TerraformCli::new(runner, "terraform", "infra")
            .with_variable("region", "us-east-1")
            .with_variable("instance_type", "r6a.8xlarge")
    }

    fn recording_inherited(code: i32) -> (MockRunner, Arc<Mutex<Vec<CommandSpec>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let mut runner = MockRunner::new();
        runner.expect_run_inherited().returning(move |spec| {
            captured.lock().expect("capture lock").push(spec);
            Box::pin(async move { Ok(code) })
        });
        (runner, seen)
    }

    #[tokio::test]
    async fn plan_passes_variables_and_plan_file() {
        let (runner, seen) = recording_inherited(0);
        terraform(runner).plan().await.expect("plan succeeds");
        let specs = seen.lock().expect("capture lock");
        let spec = specs.first().expect("one command");
        assert_eq!(
            spec.arguments(),
            [
                "plan",
                "-input=false",
                "-out=tfplan",
                "-var",
                "region=us-east-1",
                "-var",
                "instance_type=r6a.8xlarge"
            ]
        );
        assert_eq!(spec.working_dir().map(camino::Utf8Path::as_str), Some("infra"));
    }

    #[tokio::test]
    async fn apply_uses_saved_plan() {
        let (runner, seen) = recording_inherited(0);
        terraform(runner).apply().await.expect("apply succeeds");
        let specs = seen.lock().expect("capture lock");
        let expected = ["apply", "-input=false", "-auto-approve", "tfplan"].map(String::from);
        assert_eq!(
            specs.first().map(CommandSpec::arguments),
            Some(expected.as_slice())
        );
    }

    #[tokio::test]
    async fn failed_destroy_is_an_error() {
        let (runner, _) = recording_inherited(1);
        let error = terraform(runner).destroy().await.expect_err("destroy fails");
        assert!(error.to_string().starts_with("'terraform destroy' exited with status 1"));
    }

    #[tokio::test]
    async fn init_failure_reports_stderr() {
        let mut runner = MockRunner::new();
        runner.expect_run().times(1).returning(|_| {
            Box::pin(async { Ok(CommandOutput::failure(1, "Error: Failed to query available provider packages")) })
        });
        let error = terraform(runner).init().await.expect_err("init fails");
        assert!(error.to_string().contains("Failed to query available provider packages"));
    }

    #[rstest]
    #[case(CommandOutput::success("i-abc123\n"), Some("i-abc123"))]
    #[case(CommandOutput::success("   "), None)]
    #[case(CommandOutput::failure(1, "Warning: No outputs found"), None)]
    #[tokio::test]
    async fn output_treats_missing_and_empty_as_not_provisioned(
        #[case] reply: CommandOutput,
        #[case] expected: Option<&'static str>,
    ) {
        let mut runner = MockRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.arguments() == ["output", "-raw", "instance_id"])
            .times(1)
            .returning(move |_| {
                let output = reply.clone();
                Box::pin(async move { Ok(output) })
            });
        let value = terraform(runner).output("instance_id").await.expect("output");
        assert_eq!(value.as_deref(), expected);
    }

    #[tokio::test]
    async fn output_propagates_missing_binary() {
        let mut runner = MockRunner::new();
        runner.expect_run().returning(|_| {
            Box::pin(async {
                Err(ToolError::MissingTool {
                    program: String::from("terraform"),
                })
            })
        });
        let error = terraform(runner).output("public_ip").await.expect_err("missing tool");
        assert!(matches!(error, DeployError::Tool(ToolError::MissingTool { .. })));
    }
}
