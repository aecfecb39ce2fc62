//! Given/when steps for lifecycle scenarios.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest_bdd_macros::{given, when};
use serde_json::Value;
use valdeploy::api::{Collaborators, Services, run_action};
use valdeploy::cloud::ResourceState;
use valdeploy::config::AppConfig;
use valdeploy::process::SystemRunner;
use valdeploy::reconcile::{Action, ActionRequest};
use valdeploy::retry::CancellationToken;
use valdeploy::state::{StateStore, keys};

use super::StepResult;
use super::fakes::{CallLog, FakeCloud, FakeTerraform, ScriptedOperator};
use super::state::{CloudBehaviour, LifecycleResult, LifecycleState};

/// Create the scratch directory once per scenario and return the state file.
fn ensure_workspace(lifecycle_state: &LifecycleState) -> StepResult<Utf8PathBuf> {
    if let (Some(_), Some(path)) = (
        lifecycle_state.workspace.get(),
        lifecycle_state.state_file.get(),
    ) {
        return Ok(path);
    }
    let temp = tempfile::tempdir().map_err(|e| format!("failed to create temp dir: {e}"))?;
    let root = Utf8Path::from_path(temp.path())
        .ok_or_else(|| String::from("temp dir should be valid UTF-8"))?
        .to_path_buf();
    let path = root.join("deployment.json");
    lifecycle_state.workspace.set(Arc::new(temp));
    lifecycle_state.state_file.set(path.clone());
    Ok(path)
}

fn config_for(state_file: &Utf8Path) -> AppConfig {
    let mut config = AppConfig::default();
    let root = state_file
        .parent()
        .map_or_else(Utf8PathBuf::new, Utf8Path::to_path_buf);
    config.state.file = state_file.to_path_buf();
    config.state.keys_dir = root.join("keys");
    config.state.artifacts = vec![root.join("tfplan")];
    config.polling.interval_secs = 0;
    config.polling.max_attempts = 3;
    config.polling.probe_retries = 2;
    config.polling.backoff_base_ms = 1;
    config
}

fn parse_action(name: &str) -> StepResult<Action> {
    match name {
        "deploy" => Ok(Action::Deploy),
        "start" => Ok(Action::Start),
        "stop" => Ok(Action::Stop),
        "destroy" => Ok(Action::Destroy { full: false }),
        other => Err(format!("unknown action '{other}'")),
    }
}

fn parse_behaviour(name: &str) -> CloudBehaviour {
    match name {
        "unreachable" => CloudBehaviour::Unreachable,
        "absent" => CloudBehaviour::Missing,
        other => CloudBehaviour::Reports(ResourceState::from_provider_name(other)),
    }
}

#[given("a workspace with no deployment record")]
fn given_empty_workspace(lifecycle_state: &LifecycleState) -> StepResult<()> {
    ensure_workspace(lifecycle_state).map(|_| ())
}

#[given("a recorded instance {resource_id} that is {state}")]
fn given_recorded_instance(
    lifecycle_state: &LifecycleState,
    resource_id: String,
    state: String,
) -> StepResult<()> {
    let path = ensure_workspace(lifecycle_state)?;
    let store = StateStore::open(&path).map_err(|e| format!("failed to open store: {e}"))?;
    store
        .set_fields([
            (keys::RESOURCE_ID, Value::from(resource_id)),
            (keys::REGION, Value::from("us-east-1")),
            (keys::RESOURCE_CLASS, Value::from("r6a.8xlarge")),
            (keys::PUBLIC_ADDRESS, Value::from("203.0.113.7")),
        ])
        .map_err(|e| format!("failed to seed record: {e}"))?;
    lifecycle_state.cloud.set(parse_behaviour(&state));
    Ok(())
}

#[given("the operator declines every prompt")]
fn given_operator_declines(lifecycle_state: &LifecycleState) {
    lifecycle_state.prompt_answer.set(false);
}

#[when("{action} is requested with force")]
fn when_forced_action(lifecycle_state: &LifecycleState, action: String) -> StepResult<()> {
    invoke(lifecycle_state, ActionRequest::new(parse_action(&action)?).forced(true))
}

#[when("{action} is requested")]
fn when_action(lifecycle_state: &LifecycleState, action: String) -> StepResult<()> {
    invoke(lifecycle_state, ActionRequest::new(parse_action(&action)?))
}

fn invoke(lifecycle_state: &LifecycleState, request: ActionRequest) -> StepResult<()> {
    let path = ensure_workspace(lifecycle_state)?;
    let behaviour = lifecycle_state.cloud.get().unwrap_or(CloudBehaviour::Missing);
    let answer = lifecycle_state.prompt_answer.get().unwrap_or(true);
    let log = CallLog::default();

    let collaborators = Collaborators {
        client: FakeCloud::new(behaviour, log.clone()),
        provisioner: FakeTerraform::new(log.clone()),
        runner: SystemRunner,
        prompter: ScriptedOperator::new(answer, log.clone()),
    };
    let services = Services::new(config_for(&path), collaborators, CancellationToken::new())
        .map_err(|e| format!("failed to assemble services: {e}"))?;

    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    let result = match runtime.block_on(run_action(&services, request)) {
        Ok(report) => LifecycleResult::Ok {
            outcome: report.outcome,
            message: report.message,
        },
        Err(e) => LifecycleResult::Err(e.to_string()),
    };

    lifecycle_state.result.set(result);
    lifecycle_state.calls.set(log.snapshot());
    Ok(())
}
