//! Lifecycle reconciliation.
//!
//! [`plan`] decides what a requested action means given the declared record
//! and the live probe. [`Reconciler`] carries that decision out through the
//! injected collaborators, gating it behind confirmation and updating the
//! store only after the external tool reports success.

mod executor;
mod plan;
mod report;

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::config::AppConfig;
use crate::cost::PriceTable;
use crate::error::DeployError;
use crate::retry::PollSchedule;

pub use executor::{ActionOutcome, Completion, Reconciler, WaitEnd};
pub use plan::{Action, ActionRequest, NoOpReason, Transition, plan};
pub use report::StatusReport;

/// Names of the infrastructure tool outputs read after provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputKeys {
    /// Output holding the instance id.
    pub resource_id: String,
    /// Output holding the public address.
    pub public_address: String,
    /// Output holding the SSH private key path.
    pub credential_file: String,
}

/// Everything the reconciler needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Region new instances are created in.
    pub region: String,
    /// Instance type requested when provisioning.
    pub resource_class: String,
    /// Rates used for disclosures and status.
    pub prices: PriceTable,
    /// Bound on waits after start and stop.
    pub poll: PollSchedule,
    /// Provisioning outputs.
    pub outputs: OutputKeys,
    /// Local files removed after a successful destroy.
    pub artifacts: Vec<Utf8PathBuf>,
    /// Key material removed by `destroy --full`.
    pub keys_dir: Utf8PathBuf,
}

impl ReconcileSettings {
    /// Derive settings from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a configured rate is not a
    /// decimal amount.
    pub fn from_config(config: &AppConfig) -> Result<Self, DeployError> {
        Ok(Self {
            region: config.effective_region().to_owned(),
            resource_class: config.aws.instance_type.clone(),
            prices: PriceTable::from_config(&config.pricing)?,
            poll: PollSchedule::new(
                Duration::from_secs(config.polling.interval_secs),
                config.polling.max_attempts,
            ),
            outputs: OutputKeys {
                resource_id: config.terraform.instance_id_output.clone(),
                public_address: config.terraform.public_ip_output.clone(),
                credential_file: config.terraform.key_file_output.clone(),
            },
            artifacts: config.state.artifacts.clone(),
            keys_dir: config.state.keys_dir.clone(),
        })
    }
}
