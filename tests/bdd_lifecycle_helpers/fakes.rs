//! In-memory stand-ins for the cloud, the infrastructure tool and the
//! operator.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{TimeDelta, Utc};
use valdeploy::cloud::{
    CloudClient, DescribeFuture, InstanceActionFuture, InstanceAttributes, InstanceDescription,
    ResourceState,
};
use valdeploy::error::{DeployError, ProviderError};
use valdeploy::gate::Prompter;
use valdeploy::provision::{OutputFuture, ProvisionFuture, Provisioner};

use super::state::CloudBehaviour;

pub(crate) const FRESH_INSTANCE: &str = "i-0fresh";
pub(crate) const FRESH_ADDRESS: &str = "198.51.100.4";

/// Ordered log of every call the fakes receive.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cloud whose instance moves to the requested state immediately.
#[derive(Debug)]
pub(crate) struct FakeCloud {
    behaviour: Mutex<CloudBehaviour>,
    log: CallLog,
}

impl FakeCloud {
    pub(crate) const fn new(behaviour: CloudBehaviour, log: CallLog) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            log,
        }
    }

    fn behaviour(&self) -> CloudBehaviour {
        *self.behaviour.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, operation: &str, target: ResourceState) -> Result<(), DeployError> {
        self.log.push(operation);
        if self.behaviour() == CloudBehaviour::Unreachable {
            return Err(unreachable(operation));
        }
        *self.behaviour.lock().unwrap_or_else(PoisonError::into_inner) =
            CloudBehaviour::Reports(target);
        Ok(())
    }
}

fn unreachable(operation: &str) -> DeployError {
    DeployError::from(ProviderError::Transient {
        operation: String::from(operation),
        message: String::from("connection timed out"),
    })
}

impl CloudClient for FakeCloud {
    fn describe_instance<'a>(&'a self, _resource_id: &str) -> DescribeFuture<'a> {
        self.log.push("describe");
        let answer = match self.behaviour() {
            CloudBehaviour::Missing => Ok(None),
            CloudBehaviour::Unreachable => Err(unreachable("describe-instances")),
            CloudBehaviour::Reports(state) => Ok(Some(InstanceDescription {
                state,
                attributes: InstanceAttributes {
                    public_address: (state == ResourceState::Running)
                        .then(|| String::from("203.0.113.7")),
                    launch_time: Some(Utc::now() - TimeDelta::hours(2)),
                    resource_class: Some(String::from("r6a.8xlarge")),
                },
            })),
        };
        Box::pin(async move { answer })
    }

    fn start_instance<'a>(&'a self, _resource_id: &str) -> InstanceActionFuture<'a> {
        let result = self.transition("start", ResourceState::Running);
        Box::pin(async move { result })
    }

    fn stop_instance<'a>(&'a self, _resource_id: &str) -> InstanceActionFuture<'a> {
        let result = self.transition("stop", ResourceState::Stopped);
        Box::pin(async move { result })
    }
}

/// Infrastructure tool that always succeeds and reports a fresh instance.
#[derive(Debug)]
pub(crate) struct FakeTerraform {
    log: CallLog,
}

impl FakeTerraform {
    pub(crate) const fn new(log: CallLog) -> Self {
        Self { log }
    }

    fn step(&self, name: &str) -> ProvisionFuture<'_> {
        self.log.push(format!("terraform {name}"));
        Box::pin(async { Ok(()) })
    }
}

impl Provisioner for FakeTerraform {
    fn init(&self) -> ProvisionFuture<'_> {
        self.step("init")
    }

    fn plan(&self) -> ProvisionFuture<'_> {
        self.step("plan")
    }

    fn apply(&self) -> ProvisionFuture<'_> {
        self.step("apply")
    }

    fn destroy(&self) -> ProvisionFuture<'_> {
        self.step("destroy")
    }

    fn output<'a>(&'a self, key: &str) -> OutputFuture<'a> {
        let value = match key {
            "instance_id" => Some(String::from(FRESH_INSTANCE)),
            "public_ip" => Some(String::from(FRESH_ADDRESS)),
            "ssh_private_key_path" => Some(String::from("/keys/validator.pem")),
            _ => None,
        };
        Box::pin(async move { Ok(value) })
    }
}

/// Operator who gives the same answer to every prompt.
#[derive(Debug)]
pub(crate) struct ScriptedOperator {
    answer: bool,
    log: CallLog,
}

impl ScriptedOperator {
    pub(crate) const fn new(answer: bool, log: CallLog) -> Self {
        Self { answer, log }
    }
}

impl Prompter for ScriptedOperator {
    fn ask(&self, _disclosure: &str) -> Result<bool, DeployError> {
        self.log.push("prompt");
        Ok(self.answer)
    }
}
