//! Then steps for lifecycle scenarios.

use rstest_bdd_macros::then;
use valdeploy::api::CommandOutcome;
use valdeploy::state::{DeploymentRecord, StateStore};

use super::StepResult;
use super::state::{LifecycleResult, LifecycleState};

fn result(lifecycle_state: &LifecycleState) -> StepResult<LifecycleResult> {
    lifecycle_state
        .result
        .get()
        .ok_or_else(|| String::from("the command should have been invoked"))
}

fn report(lifecycle_state: &LifecycleState) -> StepResult<(CommandOutcome, String)> {
    match result(lifecycle_state)? {
        LifecycleResult::Ok { outcome, message } => Ok((outcome, message)),
        LifecycleResult::Err(error) => Err(format!("expected a report, got error: {error}")),
    }
}

fn calls(lifecycle_state: &LifecycleState) -> Vec<String> {
    lifecycle_state.calls.get().unwrap_or_default()
}

fn terraform_steps(lifecycle_state: &LifecycleState) -> Vec<String> {
    calls(lifecycle_state)
        .into_iter()
        .filter_map(|call| call.strip_prefix("terraform ").map(String::from))
        .collect()
}

fn record(lifecycle_state: &LifecycleState) -> StepResult<DeploymentRecord> {
    let path = lifecycle_state
        .state_file
        .get()
        .ok_or_else(|| String::from("workspace should exist"))?;
    StateStore::open(&path)
        .and_then(|store| store.load())
        .map_err(|e| format!("failed to load record: {e}"))
}

fn parse_outcome(name: &str) -> StepResult<CommandOutcome> {
    match name {
        "success" => Ok(CommandOutcome::Success),
        "no-op" => Ok(CommandOutcome::NoOp),
        "declined" => Ok(CommandOutcome::Declined),
        "timed out" => Ok(CommandOutcome::TimedOut),
        other => Err(format!("unknown outcome '{other}'")),
    }
}

#[then("the outcome is {expected}")]
fn outcome_is(lifecycle_state: &LifecycleState, expected: String) -> StepResult<()> {
    let (outcome, message) = report(lifecycle_state)?;
    let wanted = parse_outcome(&expected)?;
    if outcome == wanted {
        Ok(())
    } else {
        Err(format!("expected {wanted:?}, got {outcome:?}: {message}"))
    }
}

#[then("the message contains {text}")]
fn message_contains(lifecycle_state: &LifecycleState, text: String) -> StepResult<()> {
    let (_, message) = report(lifecycle_state)?;
    if message.contains(&text) {
        Ok(())
    } else {
        Err(format!("expected message to contain '{text}', got: {message}"))
    }
}

#[then("the command fails mentioning {text}")]
fn command_fails(lifecycle_state: &LifecycleState, text: String) -> StepResult<()> {
    match result(lifecycle_state)? {
        LifecycleResult::Err(error) if error.contains(&text) => Ok(()),
        LifecycleResult::Err(error) => {
            Err(format!("expected error to mention '{text}', got: {error}"))
        }
        LifecycleResult::Ok { outcome, message } => Err(format!(
            "expected an error, got {outcome:?}: {message}"
        )),
    }
}

#[then("terraform ran {expected}")]
fn terraform_ran(lifecycle_state: &LifecycleState, expected: String) -> StepResult<()> {
    let wanted: Vec<String> = expected.split(", ").map(String::from).collect();
    let seen = terraform_steps(lifecycle_state);
    if seen == wanted {
        Ok(())
    } else {
        Err(format!("expected terraform steps {wanted:?}, got {seen:?}"))
    }
}

#[then("terraform did not run")]
fn terraform_did_not_run(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let seen = terraform_steps(lifecycle_state);
    if seen.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no terraform steps, got {seen:?}"))
    }
}

#[then("the record names instance {resource_id}")]
fn record_names(lifecycle_state: &LifecycleState, resource_id: String) -> StepResult<()> {
    let loaded = record(lifecycle_state)?;
    match loaded.resource_id() {
        Some(recorded) if recorded == resource_id => Ok(()),
        other => Err(format!("expected record of {resource_id}, got {other:?}")),
    }
}

#[then("no deployment is recorded")]
fn nothing_recorded(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let loaded = record(lifecycle_state)?;
    loaded
        .resource_id()
        .map_or(Ok(()), |id| Err(format!("expected no record, found {id}")))
}

#[then("the operator was asked")]
fn operator_asked(lifecycle_state: &LifecycleState) -> StepResult<()> {
    if calls(lifecycle_state).iter().any(|call| call == "prompt") {
        Ok(())
    } else {
        Err(String::from("expected a confirmation prompt"))
    }
}

#[then("the operator was not asked")]
fn operator_not_asked(lifecycle_state: &LifecycleState) -> StepResult<()> {
    if calls(lifecycle_state).iter().any(|call| call == "prompt") {
        Err(String::from("expected no confirmation prompt"))
    } else {
        Ok(())
    }
}

#[then("the cloud received {call}")]
fn cloud_received(lifecycle_state: &LifecycleState, call: String) -> StepResult<()> {
    let seen = calls(lifecycle_state);
    if seen.contains(&call) {
        Ok(())
    } else {
        Err(format!("expected '{call}' in {seen:?}"))
    }
}

#[then("the cloud did not receive {call}")]
fn cloud_did_not_receive(lifecycle_state: &LifecycleState, call: String) -> StepResult<()> {
    let seen = calls(lifecycle_state);
    if seen.contains(&call) {
        Err(format!("did not expect '{call}' in {seen:?}"))
    } else {
        Ok(())
    }
}
