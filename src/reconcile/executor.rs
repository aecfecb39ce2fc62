//! Carry out a planned transition.

use camino::Utf8PathBuf;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::plan::{Action, ActionRequest, NoOpReason, Transition, plan};
use super::report::StatusReport;
use super::ReconcileSettings;
use crate::cloud::{CloudClient, InstanceProbe, ProbeReport, ResourceState};
use crate::cost::{CostEstimate, HourlyRate, elapsed_hours};
use crate::error::{DeployError, ReconcileError};
use crate::gate::{CostDisclosure, Disclosure, Prompter, confirm};
use crate::provision::Provisioner;
use crate::retry::PollOutcome;
use crate::state::{DeploymentRecord, StateStore, keys, remove_local_artifacts};

/// A state change that finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A new instance was provisioned and recorded.
    Deployed {
        /// New instance id.
        resource_id: String,
        /// Its public address, if the tool reported one.
        public_address: Option<String>,
    },
    /// The instance is running again.
    Started {
        /// Instance id.
        resource_id: String,
        /// Refreshed public address.
        public_address: Option<String>,
    },
    /// The instance is stopped.
    Stopped {
        /// Instance id.
        resource_id: String,
    },
    /// Everything was torn down and local state removed.
    Destroyed {
        /// The former instance id.
        resource_id: String,
        /// Local paths that were deleted.
        removed: Vec<Utf8PathBuf>,
    },
}

/// Why a wait ended before the target state was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEnd {
    /// The polling budget ran out.
    TimedOut {
        /// Polls made.
        attempts: u32,
    },
    /// The operator interrupted the wait.
    Interrupted,
}

/// Result of [`Reconciler::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The requested change happened.
    Completed(Completion),
    /// Nothing needed doing.
    NoOp(NoOpReason),
    /// The operator declined the confirmation.
    Declined,
    /// The provider accepted the request but the target state was not
    /// observed in time; the change may still be in progress.
    StillInProgress {
        /// Instance id.
        resource_id: String,
        /// State being waited for.
        target: ResourceState,
        /// How the wait ended.
        ended: WaitEnd,
    },
    /// A status report.
    Reported(Box<StatusReport>),
}

/// Applies transitions through injected collaborators.
#[derive(Debug)]
pub struct Reconciler<'a, C, V, P: ?Sized> {
    store: &'a StateStore,
    probe: &'a InstanceProbe<C>,
    provisioner: &'a V,
    prompter: &'a P,
    settings: &'a ReconcileSettings,
}

impl<'a, C, V, P> Reconciler<'a, C, V, P>
where
    C: CloudClient,
    V: Provisioner,
    P: Prompter + ?Sized,
{
    /// Assemble a reconciler.
    #[must_use]
    pub const fn new(
        store: &'a StateStore,
        probe: &'a InstanceProbe<C>,
        provisioner: &'a V,
        prompter: &'a P,
        settings: &'a ReconcileSettings,
    ) -> Self {
        Self {
            store,
            probe,
            provisioner,
            prompter,
            settings,
        }
    }

    /// Load the record, probe the live state, plan, confirm and act.
    ///
    /// # Errors
    ///
    /// Returns fatal lifecycle conflicts, probe failures, tool failures and
    /// store failures. When the external tool fails the store is left as it
    /// was, so re-running the same command is the recovery path.
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionOutcome, DeployError> {
        let record = self.store.load()?;
        let live = match record.resource_id() {
            Some(resource_id) => self.probe.probe(resource_id).await?,
            None => ProbeReport::absent(),
        };
        let transition = plan(request.action, &record, live.state).map_err(|error| {
            attach_probe_reason(error, &live)
        })?;
        debug!(action = %request.action, live = %live.state, ?transition, "planned transition");

        match transition {
            Transition::NoOp(reason) => {
                if reason.is_warning() {
                    warn!(action = %request.action, %reason, "nothing to do");
                } else {
                    info!(action = %request.action, %reason, "nothing to do");
                }
                Ok(ActionOutcome::NoOp(reason))
            }
            Transition::Report => Ok(ActionOutcome::Reported(Box::new(
                self.status_report(&record, live),
            ))),
            Transition::Provision { stale } => self.provision(request, stale).await,
            Transition::StartInstance { resource_id } => {
                self.start(request, &record, &live, resource_id).await
            }
            Transition::StopInstance { resource_id } => {
                self.stop(request, &record, &live, resource_id).await
            }
            Transition::Teardown { resource_id } => {
                self.teardown(request, &record, &live, resource_id).await
            }
        }
    }

    /// Build a status report from a record and probe.
    #[must_use]
    pub fn status_report(&self, record: &DeploymentRecord, live: ProbeReport) -> StatusReport {
        let rate = record
            .resource()
            .map(|_| self.settings.prices.rate_for(&self.resource_class(record, &live)));
        let accrued = rate.and_then(|hourly| accrued_cost(hourly, &live));
        StatusReport {
            resource: record.resource().cloned(),
            live,
            rate,
            accrued,
            validator_deployed: record.validator_deployed(),
            validator_health: None,
            vote_account: None,
        }
    }

    async fn provision(
        &self,
        request: ActionRequest,
        stale: Option<String>,
    ) -> Result<ActionOutcome, DeployError> {
        let class = self.settings.resource_class.as_str();
        let mut disclosure = Disclosure::new(request.action)
            .with_cost(CostDisclosure::Projected(self.settings.prices.rate_for(class)))
            .affecting(format!("new {class} instance in {}", self.settings.region));
        if let Some(old) = &stale {
            warn!(resource_id = %old, "recorded instance no longer exists; re-provisioning");
            disclosure = disclosure.affecting(format!("stale record of instance {old} (will be replaced)"));
        }
        if !self.confirmed(&disclosure, request.force)? {
            return Ok(ActionOutcome::Declined);
        }

        self.provisioner.init().await?;
        self.provisioner.plan().await?;
        self.provisioner.apply().await?;

        let outputs = &self.settings.outputs;
        let resource_id = self
            .provisioner
            .output(&outputs.resource_id)
            .await?
            .ok_or_else(|| ReconcileError::ProvisioningIncomplete {
                output: outputs.resource_id.clone(),
            })?;
        let public_address = self.provisioner.output(&outputs.public_address).await?;
        let credential_file = self.provisioner.output(&outputs.credential_file).await?;

        self.store.set_fields([
            (keys::RESOURCE_ID, Value::from(resource_id.as_str())),
            (keys::REGION, Value::from(self.settings.region.as_str())),
            (keys::RESOURCE_CLASS, Value::from(class)),
            (keys::PUBLIC_ADDRESS, optional(public_address.as_deref())),
            (keys::CREDENTIAL_FILE, optional(credential_file.as_deref())),
            (keys::CREATED_AT, Value::from(Utc::now().to_rfc3339())),
            (keys::VALIDATOR_DEPLOYED, Value::Bool(false)),
        ])?;
        info!(%resource_id, address = ?public_address, "instance provisioned");

        Ok(ActionOutcome::Completed(Completion::Deployed {
            resource_id,
            public_address,
        }))
    }

    async fn start(
        &self,
        request: ActionRequest,
        record: &DeploymentRecord,
        live: &ProbeReport,
        resource_id: String,
    ) -> Result<ActionOutcome, DeployError> {
        let rate = self
            .settings
            .prices
            .rate_for(&self.resource_class(record, live));
        let disclosure = Disclosure::new(request.action)
            .with_cost(CostDisclosure::Projected(rate))
            .affecting(format!("instance {resource_id}"));
        if !self.confirmed(&disclosure, request.force)? {
            return Ok(ActionOutcome::Declined);
        }

        self.probe.start(&resource_id).await?;
        match self
            .probe
            .wait_for(&resource_id, ResourceState::Running, &self.settings.poll)
            .await?
        {
            PollOutcome::Reached(report) => {
                let public_address = self.refresh_address(&report)?;
                info!(%resource_id, address = ?public_address, "instance running");
                Ok(ActionOutcome::Completed(Completion::Started {
                    resource_id,
                    public_address,
                }))
            }
            outcome => Ok(still_in_progress(resource_id, ResourceState::Running, &outcome)),
        }
    }

    async fn stop(
        &self,
        request: ActionRequest,
        record: &DeploymentRecord,
        live: &ProbeReport,
        resource_id: String,
    ) -> Result<ActionOutcome, DeployError> {
        let disclosure = Disclosure::new(request.action)
            .with_cost(self.accrued_disclosure(record, live))
            .affecting(describe_instance(&resource_id, live));
        if !self.confirmed(&disclosure, request.force)? {
            return Ok(ActionOutcome::Declined);
        }

        self.probe.stop(&resource_id).await?;
        match self
            .probe
            .wait_for(&resource_id, ResourceState::Stopped, &self.settings.poll)
            .await?
        {
            PollOutcome::Reached(report) => {
                self.refresh_address(&report)?;
                info!(%resource_id, "instance stopped");
                Ok(ActionOutcome::Completed(Completion::Stopped { resource_id }))
            }
            outcome => Ok(still_in_progress(resource_id, ResourceState::Stopped, &outcome)),
        }
    }

    async fn teardown(
        &self,
        request: ActionRequest,
        record: &DeploymentRecord,
        live: &ProbeReport,
        resource_id: String,
    ) -> Result<ActionOutcome, DeployError> {
        let mut artifacts = self.settings.artifacts.clone();
        if matches!(request.action, Action::Destroy { full: true }) {
            artifacts.push(self.settings.keys_dir.clone());
        }

        let disclosure = artifacts.iter().fold(
            Disclosure::new(request.action)
                .with_cost(self.accrued_disclosure(record, live))
                .affecting(describe_instance(&resource_id, live))
                .affecting(format!("state file {}", self.store.path())),
            |acc, path| acc.affecting(format!("local path {path}")),
        );
        if !self.confirmed(&disclosure, request.force)? {
            return Ok(ActionOutcome::Declined);
        }

        self.provisioner.destroy().await?;
        self.store.clear()?;
        let removed = remove_local_artifacts(&artifacts)?;
        info!(%resource_id, removed = removed.len(), "infrastructure destroyed");

        Ok(ActionOutcome::Completed(Completion::Destroyed {
            resource_id,
            removed,
        }))
    }

    /// An interrupt that arrives while the operator is being asked overrides
    /// a "yes", so no tool starts after Ctrl-C.
    fn confirmed(&self, disclosure: &Disclosure, force: bool) -> Result<bool, DeployError> {
        let proceed = confirm(disclosure, force, self.prompter)?;
        if proceed && self.probe.cancellation().is_cancelled() {
            warn!(action = %disclosure.action(), "interrupted at confirmation; nothing was changed");
            return Ok(false);
        }
        Ok(proceed)
    }

    fn resource_class(&self, record: &DeploymentRecord, live: &ProbeReport) -> String {
        live.attributes
            .resource_class
            .clone()
            .or_else(|| record.resource().and_then(|resource| resource.resource_class.clone()))
            .unwrap_or_else(|| self.settings.resource_class.clone())
    }

    fn accrued_disclosure(&self, record: &DeploymentRecord, live: &ProbeReport) -> CostDisclosure {
        let rate = self
            .settings
            .prices
            .rate_for(&self.resource_class(record, live));
        accrued_cost(rate, live).map_or(CostDisclosure::None, CostDisclosure::Accrued)
    }

    fn refresh_address(&self, report: &ProbeReport) -> Result<Option<String>, DeployError> {
        let address = report.attributes.public_address.clone();
        self.store
            .set_field(keys::PUBLIC_ADDRESS, optional(address.as_deref()))?;
        Ok(address)
    }
}

/// Cost accrued since the last launch, when the instance is running.
fn accrued_cost(rate: HourlyRate, live: &ProbeReport) -> Option<CostEstimate> {
    if live.state != ResourceState::Running {
        return None;
    }
    live.attributes
        .launch_time
        .map(|launched| CostEstimate::new(rate, elapsed_hours(launched, Utc::now())))
}

fn describe_instance(resource_id: &str, live: &ProbeReport) -> String {
    match &live.attributes.public_address {
        Some(address) => format!("instance {resource_id} ({}, {address})", live.state),
        None => format!("instance {resource_id} ({})", live.state),
    }
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn still_in_progress(
    resource_id: String,
    target: ResourceState,
    outcome: &PollOutcome<ProbeReport>,
) -> ActionOutcome {
    let ended = match outcome {
        PollOutcome::TimedOut { attempts } => WaitEnd::TimedOut {
            attempts: *attempts,
        },
        PollOutcome::Reached(_) | PollOutcome::Cancelled => WaitEnd::Interrupted,
    };
    warn!(%resource_id, %target, ?ended, "instance did not reach target state in time");
    ActionOutcome::StillInProgress {
        resource_id,
        target,
        ended,
    }
}

fn attach_probe_reason(error: ReconcileError, live: &ProbeReport) -> ReconcileError {
    match (error, &live.reason) {
        (ReconcileError::LiveStateUnknown { resource_id, .. }, Some(reason)) => {
            ReconcileError::LiveStateUnknown {
                resource_id,
                reason: reason.clone(),
            }
        }
        (other, _) => other,
    }
}
