//! Scenario state for lifecycle behavioural tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;
use valdeploy::api::CommandOutcome;
use valdeploy::cloud::ResourceState;

/// What the cloud answers for the recorded instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloudBehaviour {
    /// Describe reports this state.
    Reports(ResourceState),
    /// The instance does not exist.
    Missing,
    /// Every call fails transiently.
    Unreachable,
}

/// High-level outcome from an orchestration call.
#[derive(Debug, Clone)]
pub(crate) enum LifecycleResult {
    /// The command returned a report.
    Ok {
        outcome: CommandOutcome,
        message: String,
    },
    /// The command returned an error.
    Err(String),
}

#[derive(Default, ScenarioState)]
pub(crate) struct LifecycleState {
    /// Keeps the scratch directory alive for the whole scenario.
    pub(crate) workspace: Slot<Arc<TempDir>>,
    pub(crate) state_file: Slot<Utf8PathBuf>,
    pub(crate) cloud: Slot<CloudBehaviour>,
    pub(crate) prompt_answer: Slot<bool>,
    /// Calls seen by the fakes, in order.
    pub(crate) calls: Slot<Vec<String>>,
    pub(crate) result: Slot<LifecycleResult>,
}

#[fixture]
pub(crate) fn lifecycle_state() -> LifecycleState {
    let state = LifecycleState::default();
    state.cloud.set(CloudBehaviour::Missing);
    state.prompt_answer.set(true);
    state
}
