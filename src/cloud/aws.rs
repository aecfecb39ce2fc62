//! [`CloudClient`] implemented over the AWS CLI.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::classify::{FailureKind, classify_failure, provider_error};
use super::{
    CloudClient, DescribeFuture, InstanceActionFuture, InstanceAttributes, InstanceDescription,
    ResourceState,
};
use crate::error::{DeployError, ProviderError};
use crate::process::{CommandRunner, CommandSpec};

/// EC2 control through `aws ec2 ... --output json`.
#[derive(Debug, Clone)]
pub struct AwsCli<R> {
    runner: R,
    binary: String,
    region: String,
    profile: Option<String>,
}

impl<R: CommandRunner> AwsCli<R> {
    /// Create a client invoking `binary` against `region`.
    #[must_use]
    pub fn new(runner: R, binary: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            region: region.into(),
            profile: None,
        }
    }

    /// Use a named CLI profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    fn ec2(&self, operation: &str, resource_id: &str) -> CommandSpec {
        let spec = CommandSpec::new(self.binary.as_str()).args([
            "ec2",
            operation,
            "--instance-ids",
            resource_id,
            "--region",
            self.region.as_str(),
            "--output",
            "json",
        ]);
        match &self.profile {
            Some(profile) => spec.args(["--profile", profile.as_str()]),
            None => spec,
        }
    }

    async fn change_state(&self, operation: &str, resource_id: &str) -> Result<(), DeployError> {
        let output = self.runner.run(self.ec2(operation, resource_id)).await?;
        if output.is_success() {
            return Ok(());
        }
        let kind = classify_failure(&output.stderr);
        Err(provider_error(kind, operation, &output.stderr).into())
    }
}

impl<R: CommandRunner> CloudClient for AwsCli<R> {
    fn describe_instance<'a>(&'a self, resource_id: &str) -> DescribeFuture<'a> {
        let spec = self.ec2("describe-instances", resource_id);
        let wanted = resource_id.to_owned();
        Box::pin(async move {
            let output = self.runner.run(spec).await?;
            if !output.is_success() {
                return match classify_failure(&output.stderr) {
                    FailureKind::NotFound => Ok(None),
                    kind => Err(provider_error(kind, "describe-instances", &output.stderr).into()),
                };
            }
            decode_description(&output.stdout, &wanted)
        })
    }

    fn start_instance<'a>(&'a self, resource_id: &str) -> InstanceActionFuture<'a> {
        let id = resource_id.to_owned();
        Box::pin(async move { self.change_state("start-instances", &id).await })
    }

    fn stop_instance<'a>(&'a self, resource_id: &str) -> InstanceActionFuture<'a> {
        let id = resource_id.to_owned();
        Box::pin(async move { self.change_state("stop-instances", &id).await })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    state: InstanceStateField,
    public_ip_address: Option<String>,
    launch_time: Option<DateTime<Utc>>,
    instance_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStateField {
    name: String,
}

impl From<Instance> for InstanceDescription {
    fn from(instance: Instance) -> Self {
        Self {
            state: ResourceState::from_provider_name(&instance.state.name),
            attributes: InstanceAttributes {
                public_address: instance.public_ip_address.filter(|ip| !ip.is_empty()),
                launch_time: instance.launch_time,
                resource_class: instance.instance_type,
            },
        }
    }
}

/// Decode `describe-instances` JSON, picking the entry for `resource_id`.
///
/// An empty reservation list means the instance no longer exists.
fn decode_description(
    stdout: &str,
    resource_id: &str,
) -> Result<Option<InstanceDescription>, DeployError> {
    let response: DescribeInstancesResponse =
        serde_json::from_str(stdout).map_err(|error| ProviderError::InvalidResponse {
            message: error.to_string(),
        })?;
    Ok(response
        .reservations
        .into_iter()
        .flat_map(|reservation| reservation.instances)
        .find(|instance| instance.instance_id == resource_id)
        .map(InstanceDescription::from))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::process::CommandOutput;
    use crate::process::mocks::MockRunner;

    const RUNNING: &str = r#"{
        "Reservations": [{
            "Instances": [{
                "InstanceId": "i-abc123",
                "InstanceType": "r6a.8xlarge",
                "LaunchTime": "2026-10-18T08:00:00+00:00",
                "PublicIpAddress": "203.0.113.7",
                "State": {"Code": 16, "Name": "running"}
            }]
        }]
    }"#;

    const STOPPED: &str = r#"{
        "Reservations": [{
            "Instances": [{
                "InstanceId": "i-abc123",
                "InstanceType": "r6a.8xlarge",
                "LaunchTime": "2026-10-18T08:00:00.000Z",
                "PublicIpAddress": "",
                "State": {"Code": 80, "Name": "stopped"}
            }]
        }]
    }"#;

    fn runner_returning(output: CommandOutput) -> MockRunner {
        let mut runner = MockRunner::new();
        runner.expect_run().times(1).returning(move |_| {
            let reply = output.clone();
            Box::pin(async move { Ok(reply) })
        });
        runner
    }

    fn client(runner: MockRunner) -> AwsCli<MockRunner> {
        AwsCli::new(runner, "aws", "us-east-1")
    }

    #[tokio::test]
    async fn describe_decodes_running_instance() {
        let cli = client(runner_returning(CommandOutput::success(RUNNING)));
        let description = cli
            .describe_instance("i-abc123")
            .await
            .expect("describe should succeed")
            .expect("instance should exist");
        assert_eq!(description.state, ResourceState::Running);
        assert_eq!(description.attributes.public_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(description.attributes.resource_class.as_deref(), Some("r6a.8xlarge"));
        assert_eq!(
            description.attributes.launch_time,
            Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).single()
        );
    }

    #[tokio::test]
    async fn describe_treats_blank_address_as_missing() {
        let cli = client(runner_returning(CommandOutput::success(STOPPED)));
        let description = cli
            .describe_instance("i-abc123")
            .await
            .expect("describe should succeed")
            .expect("instance should exist");
        assert_eq!(description.state, ResourceState::Stopped);
        assert_eq!(description.attributes.public_address, None);
    }

    #[tokio::test]
    async fn describe_maps_not_found_to_absent() {
        let cli = client(runner_returning(CommandOutput::failure(
            254,
            "An error occurred (InvalidInstanceID.NotFound) when calling the DescribeInstances operation",
        )));
        let description = cli.describe_instance("i-gone").await.expect("not found is not an error");
        assert_eq!(description, None);
    }

    #[tokio::test]
    async fn describe_with_no_reservations_is_absent() {
        let cli = client(runner_returning(CommandOutput::success(r#"{"Reservations": []}"#)));
        let description = cli.describe_instance("i-abc123").await.expect("describe should succeed");
        assert_eq!(description, None);
    }

    #[tokio::test]
    async fn describe_reports_transient_failures_as_retryable() {
        let cli = client(runner_returning(CommandOutput::failure(
            255,
            "An error occurred (RequestLimitExceeded) when calling the DescribeInstances operation",
        )));
        let error = cli.describe_instance("i-abc123").await.expect_err("throttled");
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn describe_rejects_malformed_json() {
        let cli = client(runner_returning(CommandOutput::success("not json")));
        let error = cli.describe_instance("i-abc123").await.expect_err("bad json");
        assert!(matches!(
            error,
            DeployError::Provider(ProviderError::InvalidResponse { .. })
        ));
    }

    #[rstest]
    #[case(None, vec!["ec2", "stop-instances", "--instance-ids", "i-abc123", "--region", "eu-west-1", "--output", "json"])]
    #[case(
        Some(String::from("ops")),
        vec!["ec2", "stop-instances", "--instance-ids", "i-abc123", "--region", "eu-west-1", "--output", "json", "--profile", "ops"]
    )]
    #[tokio::test]
    async fn stop_builds_expected_command(
        #[case] profile: Option<String>,
        #[case] expected: Vec<&'static str>,
    ) {
        let mut runner = MockRunner::new();
        runner
            .expect_run()
            .withf(move |spec| spec.program() == "aws" && spec.arguments() == expected.as_slice())
            .times(1)
            .returning(|_| Box::pin(async { Ok(CommandOutput::success("{}")) }));
        let cli = AwsCli::new(runner, "aws", "eu-west-1").with_profile(profile);
        cli.stop_instance("i-abc123").await.expect("stop should succeed");
    }

    #[tokio::test]
    async fn start_rejects_bad_credentials_as_fatal() {
        let cli = client(runner_returning(CommandOutput::failure(
            255,
            "An error occurred (AuthFailure) when calling the StartInstances operation",
        )));
        let error = cli.start_instance("i-abc123").await.expect_err("auth failure");
        assert!(matches!(
            error,
            DeployError::Provider(ProviderError::AuthenticationFailed { .. })
        ));
        assert!(!error.is_transient());
    }
}
