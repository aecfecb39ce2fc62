//! Cloud resource probe and instance control.
//!
//! The [`CloudClient`] trait is the EC2-equivalent seam: describe, start and
//! stop one instance. [`InstanceProbe`] layers the failure policy on top of
//! it. Absence is a state rather than an error, transient failures are
//! retried with backoff and then reported as [`ResourceState::Unknown`], and
//! rejected credentials fail immediately.

mod aws;
mod classify;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{DeployError, ProviderError};
use crate::retry::{
    CancellationToken, PollOutcome, PollSchedule, RetryOutcome, RetryPolicy, poll_until, retry,
};

pub use aws::AwsCli;
pub use classify::{FailureKind, classify_failure};

/// Boxed future returned by [`CloudClient::describe_instance`].
pub type DescribeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<InstanceDescription>, DeployError>> + Send + 'a>>;

/// Boxed future returned by [`CloudClient::start_instance`] and
/// [`CloudClient::stop_instance`].
pub type InstanceActionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeployError>> + Send + 'a>>;

/// Live provider state of the instance. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// The provider has no record of the instance.
    Absent,
    /// Launching or starting.
    Pending,
    /// Running.
    Running,
    /// Stopping.
    Stopping,
    /// Stopped and restartable.
    Stopped,
    /// Terminated or shutting down; cannot be restarted.
    Terminated,
    /// The provider could not be asked.
    Unknown,
}

impl ResourceState {
    /// Decode an EC2 state name such as `"running"`.
    #[must_use]
    pub fn from_provider_name(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "shutting-down" | "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the instance is gone for good.
    #[must_use]
    pub const fn is_gone(self) -> bool {
        matches!(self, Self::Absent | Self::Terminated)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes reported alongside the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceAttributes {
    /// Public IPv4 address, if one is assigned.
    pub public_address: Option<String>,
    /// When the instance last started.
    pub launch_time: Option<DateTime<Utc>>,
    /// Instance type.
    pub resource_class: Option<String>,
}

/// One instance as described by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    /// Live state.
    pub state: ResourceState,
    /// Reported attributes.
    pub attributes: InstanceAttributes,
}

/// Result of probing one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Live state.
    pub state: ResourceState,
    /// Attributes; empty when absent or unknown.
    pub attributes: InstanceAttributes,
    /// Why the state is `Unknown`, when it is.
    pub reason: Option<String>,
}

impl ProbeReport {
    /// The instance does not exist.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            state: ResourceState::Absent,
            attributes: InstanceAttributes::default(),
            reason: None,
        }
    }

    /// The provider could not be asked.
    #[must_use]
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            state: ResourceState::Unknown,
            attributes: InstanceAttributes::default(),
            reason: Some(reason.into()),
        }
    }
}

impl From<InstanceDescription> for ProbeReport {
    fn from(description: InstanceDescription) -> Self {
        Self {
            state: description.state,
            attributes: description.attributes,
            reason: None,
        }
    }
}

/// Control-plane operations on a single instance.
///
/// A missing instance is reported by `describe_instance` as `Ok(None)`.
/// Implementations signal retryable failures with
/// `ProviderError::Transient`.
pub trait CloudClient: Send + Sync {
    /// Describe the instance, or `None` when it does not exist.
    fn describe_instance<'a>(&'a self, resource_id: &str) -> DescribeFuture<'a>;

    /// Ask the provider to start the instance.
    fn start_instance<'a>(&'a self, resource_id: &str) -> InstanceActionFuture<'a>;

    /// Ask the provider to stop the instance.
    fn stop_instance<'a>(&'a self, resource_id: &str) -> InstanceActionFuture<'a>;
}

/// A [`CloudClient`] wrapped in the retry and polling policy.
#[derive(Debug)]
pub struct InstanceProbe<C> {
    client: C,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<C: CloudClient> InstanceProbe<C> {
    /// Wrap `client` with `policy`; `cancel` interrupts backoff and polling.
    #[must_use]
    pub const fn new(client: C, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            client,
            policy,
            cancel,
        }
    }

    /// The token that interrupts this probe's waits.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Report the live state of `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthenticationFailed` immediately when the
    /// credentials are rejected, and other non-transient failures as-is.
    /// Transient failures that outlast the retry policy are reported as
    /// [`ResourceState::Unknown`] rather than as an error.
    pub async fn probe(&self, resource_id: &str) -> Result<ProbeReport, DeployError> {
        let outcome = retry(&self.policy, &self.cancel, DeployError::is_transient, |_| {
            self.client.describe_instance(resource_id)
        })
        .await;

        let report = match outcome {
            RetryOutcome::Succeeded(Some(description)) => ProbeReport::from(description),
            RetryOutcome::Succeeded(None) => ProbeReport::absent(),
            RetryOutcome::Fatal(error) => return Err(error),
            RetryOutcome::Exhausted { attempts, last } => {
                warn!(resource_id, attempts, error = %last, "instance probe gave up");
                ProbeReport::unknown(format!("tried {attempts} times: {last}"))
            }
            RetryOutcome::Cancelled => ProbeReport::unknown("probe cancelled"),
        };
        debug!(resource_id, state = %report.state, "probed instance");
        Ok(report)
    }

    /// Start `resource_id`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::RetriesExhausted` when every attempt failed
    /// transiently, or the first non-transient failure.
    pub async fn start(&self, resource_id: &str) -> Result<(), DeployError> {
        info!(resource_id, "starting instance");
        self.with_retries("start-instances", |_| self.client.start_instance(resource_id))
            .await
    }

    /// Stop `resource_id`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::RetriesExhausted` when every attempt failed
    /// transiently, or the first non-transient failure.
    pub async fn stop(&self, resource_id: &str) -> Result<(), DeployError> {
        info!(resource_id, "stopping instance");
        self.with_retries("stop-instances", |_| self.client.stop_instance(resource_id))
            .await
    }

    /// Poll until `resource_id` reaches `target`.
    ///
    /// `Unknown` and intermediate states keep the poll going; an instance
    /// that disappears while waiting ends it with an error.
    ///
    /// # Errors
    ///
    /// Returns probe errors, or `ProviderError::RequestFailed` when the
    /// instance is absent or terminated before reaching `target`.
    pub async fn wait_for(
        &self,
        resource_id: &str,
        target: ResourceState,
        schedule: &PollSchedule,
    ) -> Result<PollOutcome<ProbeReport>, DeployError> {
        poll_until(schedule, &self.cancel, |attempt| async move {
            let report = self.probe(resource_id).await?;
            debug!(resource_id, attempt, state = %report.state, %target, "waiting for instance");
            if report.state == target {
                return Ok(Some(report));
            }
            if report.state.is_gone() && !target.is_gone() {
                return Err(DeployError::from(ProviderError::RequestFailed {
                    operation: format!("wait for {target}"),
                    message: format!("instance '{resource_id}' is {}", report.state),
                }));
            }
            Ok(None)
        })
        .await
    }

    async fn with_retries<F, Fut>(&self, operation: &str, call: F) -> Result<(), DeployError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), DeployError>>,
    {
        match retry(&self.policy, &self.cancel, DeployError::is_transient, call).await {
            RetryOutcome::Succeeded(()) => Ok(()),
            RetryOutcome::Fatal(error) => Err(error),
            RetryOutcome::Exhausted { attempts, last } => Err(ProviderError::RetriesExhausted {
                operation: operation.to_owned(),
                attempts,
                message: last.to_string(),
            }
            .into()),
            RetryOutcome::Cancelled => Err(ProviderError::RequestFailed {
                operation: operation.to_owned(),
                message: String::from("cancelled while backing off"),
            }
            .into()),
        }
    }
}
