//! Transition table from (requested action, declared state, live state).
//!
//! This module performs no I/O. Every combination where the system is
//! already in, or moving toward, the requested state yields
//! [`Transition::NoOp`], so re-running any command after a partial failure is
//! safe.

use std::fmt;

use crate::cloud::ResourceState;
use crate::error::ReconcileError;
use crate::state::DeploymentRecord;

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Provision the instance.
    Deploy,
    /// Start a stopped instance.
    Start,
    /// Stop a running instance.
    Stop,
    /// Tear everything down; `full` also deletes key material.
    Destroy {
        /// Remove the keys directory too.
        full: bool,
    },
    /// Report without changing anything.
    Status,
}

impl Action {
    /// Verb used in prompts and logs.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Destroy { .. } => "destroy",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// An action plus the force flag that suppresses confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRequest {
    /// Requested action.
    pub action: Action,
    /// Skip the confirmation prompt.
    pub force: bool,
}

impl ActionRequest {
    /// Build an interactive request.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            force: false,
        }
    }

    /// Set the force flag.
    #[must_use]
    pub const fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Why nothing needs doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// Deploy requested but the instance exists.
    AlreadyDeployed {
        /// Recorded instance id.
        resource_id: String,
        /// Its live state.
        state: ResourceState,
    },
    /// Start requested but the instance runs.
    AlreadyRunning {
        /// Recorded instance id.
        resource_id: String,
    },
    /// The instance is mid-transition; wait and retry.
    InTransition {
        /// Recorded instance id.
        resource_id: String,
        /// Its live state.
        state: ResourceState,
    },
    /// Stop requested but the instance is stopped or stopping.
    AlreadyStopped {
        /// Recorded instance id.
        resource_id: String,
        /// Its live state.
        state: ResourceState,
    },
    /// Stop requested but the instance no longer exists.
    AlreadyGone {
        /// Recorded instance id.
        resource_id: String,
        /// Its live state.
        state: ResourceState,
    },
    /// Nothing is recorded, so there is nothing to act on.
    NothingDeployed,
}

impl NoOpReason {
    /// Whether the no-op deserves a warning rather than an informational note.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::AlreadyGone { .. })
    }
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDeployed { resource_id, state } => match state {
                ResourceState::Stopped => write!(
                    f,
                    "instance {resource_id} is already deployed (stopped); run `valdeploy start` to resume it"
                ),
                _ => write!(f, "instance {resource_id} is already deployed ({state})"),
            },
            Self::AlreadyRunning { resource_id } => {
                write!(f, "instance {resource_id} is already running")
            }
            Self::InTransition { resource_id, state } => write!(
                f,
                "instance {resource_id} is {state}; wait for it to settle and retry"
            ),
            Self::AlreadyStopped { resource_id, state } => {
                write!(f, "instance {resource_id} is already {state}")
            }
            Self::AlreadyGone { resource_id, state } => write!(
                f,
                "instance {resource_id} is {state}; nothing to stop (run `valdeploy destroy` to clean up local state)"
            ),
            Self::NothingDeployed => f.write_str("nothing is deployed"),
        }
    }
}

/// The decided transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Run the infrastructure tool to create the instance.
    Provision {
        /// Set when a stale record is being replaced.
        stale: Option<String>,
    },
    /// Start the instance and wait for it to run.
    StartInstance {
        /// Instance to start.
        resource_id: String,
    },
    /// Stop the instance and wait for it to stop.
    StopInstance {
        /// Instance to stop.
        resource_id: String,
    },
    /// Destroy all infrastructure and local state.
    Teardown {
        /// Recorded instance.
        resource_id: String,
    },
    /// Report status only.
    Report,
    /// Nothing to do.
    NoOp(NoOpReason),
}

/// Decide the transition for `action`.
///
/// `live` is the probed state of the recorded instance and is ignored when
/// nothing is recorded. Live state is authoritative: a recorded instance that
/// is absent or terminated is a stale record, not an error.
///
/// # Errors
///
/// Returns `ReconcileError::NotDeployed` when starting with nothing recorded,
/// `ReconcileError::CannotResurrect` when starting a terminated or absent
/// instance, and `ReconcileError::LiveStateUnknown` when a state-changing
/// action meets an unknown live state.
pub fn plan(
    action: Action,
    record: &DeploymentRecord,
    live: ResourceState,
) -> Result<Transition, ReconcileError> {
    let Some(resource_id) = record.resource_id().map(str::to_owned) else {
        return Ok(match action {
            Action::Deploy => Transition::Provision { stale: None },
            Action::Start => return Err(ReconcileError::NotDeployed),
            Action::Stop | Action::Destroy { .. } => Transition::NoOp(NoOpReason::NothingDeployed),
            Action::Status => Transition::Report,
        });
    };

    match action {
        Action::Status => Ok(Transition::Report),
        Action::Destroy { .. } => Ok(Transition::Teardown { resource_id }),
        Action::Deploy => plan_deploy(resource_id, live),
        Action::Start => plan_start(resource_id, live),
        Action::Stop => plan_stop(resource_id, live),
    }
}

fn unknown(resource_id: String) -> ReconcileError {
    ReconcileError::LiveStateUnknown {
        resource_id,
        reason: String::from("the provider did not report a state"),
    }
}

fn plan_deploy(resource_id: String, live: ResourceState) -> Result<Transition, ReconcileError> {
    match live {
        ResourceState::Absent | ResourceState::Terminated => Ok(Transition::Provision {
            stale: Some(resource_id),
        }),
        ResourceState::Unknown => Err(unknown(resource_id)),
        state => Ok(Transition::NoOp(NoOpReason::AlreadyDeployed { resource_id, state })),
    }
}

fn plan_start(resource_id: String, live: ResourceState) -> Result<Transition, ReconcileError> {
    match live {
        ResourceState::Running => Ok(Transition::NoOp(NoOpReason::AlreadyRunning { resource_id })),
        ResourceState::Stopped => Ok(Transition::StartInstance { resource_id }),
        state @ (ResourceState::Pending | ResourceState::Stopping) => {
            Ok(Transition::NoOp(NoOpReason::InTransition { resource_id, state }))
        }
        state @ (ResourceState::Absent | ResourceState::Terminated) => {
            Err(ReconcileError::CannotResurrect {
                resource_id,
                state: state.to_string(),
            })
        }
        ResourceState::Unknown => Err(unknown(resource_id)),
    }
}

fn plan_stop(resource_id: String, live: ResourceState) -> Result<Transition, ReconcileError> {
    match live {
        ResourceState::Running => Ok(Transition::StopInstance { resource_id }),
        state @ (ResourceState::Stopped | ResourceState::Stopping) => {
            Ok(Transition::NoOp(NoOpReason::AlreadyStopped { resource_id, state }))
        }
        state @ ResourceState::Pending => {
            Ok(Transition::NoOp(NoOpReason::InTransition { resource_id, state }))
        }
        state @ (ResourceState::Absent | ResourceState::Terminated) => {
            Ok(Transition::NoOp(NoOpReason::AlreadyGone { resource_id, state }))
        }
        ResourceState::Unknown => Err(unknown(resource_id)),
    }
}
