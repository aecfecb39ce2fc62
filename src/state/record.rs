//! Typed view of the deployment record.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::path::get_path;

/// Dotted keys used in the store document.
pub mod keys {
    /// Cloud instance id; present only after a successful provisioning run.
    pub const RESOURCE_ID: &str = "aws.instance_id";
    /// Region the instance lives in.
    pub const REGION: &str = "aws.region";
    /// Instance type.
    pub const RESOURCE_CLASS: &str = "aws.instance_type";
    /// Current public address; refreshed on every start.
    pub const PUBLIC_ADDRESS: &str = "aws.public_ip";
    /// SSH private key used to reach the instance.
    pub const CREDENTIAL_FILE: &str = "aws.ssh_key_file";
    /// RFC 3339 timestamp of the first successful provisioning run.
    pub const CREATED_AT: &str = "deployment.created_at";
    /// Whether the validator software has been installed.
    pub const VALIDATOR_DEPLOYED: &str = "validator.deployed";
    /// Identity public key.
    pub const IDENTITY_PUBKEY: &str = "keys.identity";
    /// Vote account public key.
    pub const VOTE_PUBKEY: &str = "keys.vote_account";
    /// Withdrawer public key.
    pub const WITHDRAWER_PUBKEY: &str = "keys.withdrawer";
}

/// What the store believes was deployed.
///
/// Dependent fields are reachable only through [`DeploymentRecord::resource`],
/// which returns `None` unless a resource id is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRecord {
    resource: Option<RecordedResource>,
    validator_deployed: bool,
}

/// Fields that only have meaning once a resource id exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedResource {
    /// Cloud instance id.
    pub resource_id: String,
    /// Region, when recorded.
    pub region: Option<String>,
    /// Instance type, when recorded.
    pub resource_class: Option<String>,
    /// Last known public address.
    pub public_address: Option<String>,
    /// SSH private key path.
    pub credential_file: Option<Utf8PathBuf>,
    /// When provisioning first succeeded.
    pub created_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// Build the typed view from a raw store document.
    ///
    /// Fields with unexpected types are treated as absent; an empty resource id
    /// counts as not deployed.
    #[must_use]
    pub fn from_document(document: &Value) -> Self {
        let text = |key: &str| {
            get_path(document, key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        let resource = text(keys::RESOURCE_ID).map(|resource_id| RecordedResource {
            resource_id,
            region: text(keys::REGION),
            resource_class: text(keys::RESOURCE_CLASS),
            public_address: text(keys::PUBLIC_ADDRESS),
            credential_file: text(keys::CREDENTIAL_FILE).map(Utf8PathBuf::from),
            created_at: text(keys::CREATED_AT)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|stamp| stamp.with_timezone(&Utc)),
        });

        Self {
            resource,
            validator_deployed: get_path(document, keys::VALIDATOR_DEPLOYED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// The recorded resource, if provisioning has succeeded.
    #[must_use]
    pub const fn resource(&self) -> Option<&RecordedResource> {
        self.resource.as_ref()
    }

    /// Shorthand for the recorded resource id.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .map(|resource| resource.resource_id.as_str())
    }

    /// Whether the validator software has been installed.
    #[must_use]
    pub const fn validator_deployed(&self) -> bool {
        self.validator_deployed
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn empty_document_is_not_deployed() {
        let record = DeploymentRecord::from_document(&json!({}));
        assert_eq!(record.resource(), None);
        assert!(!record.validator_deployed());
    }

    #[rstest]
    fn dependent_fields_without_resource_id_are_hidden() {
        let record = DeploymentRecord::from_document(&json!({
            "aws": { "public_ip": "203.0.113.7", "region": "us-east-1" }
        }));
        assert_eq!(record.resource_id(), None);
    }

    #[rstest]
    fn blank_resource_id_counts_as_absent() {
        let record = DeploymentRecord::from_document(&json!({ "aws": { "instance_id": " " } }));
        assert_eq!(record.resource_id(), None);
    }

    #[rstest]
    fn populated_document_maps_every_field() {
        let record = DeploymentRecord::from_document(&json!({
            "aws": {
                "instance_id": "i-abc123",
                "region": "us-east-1",
                "instance_type": "r6a.8xlarge",
                "public_ip": "203.0.113.7",
                "ssh_key_file": "terraform/validator.pem"
            },
            "deployment": { "created_at": "2026-10-18T09:30:00Z" },
            "validator": { "deployed": true }
        }));
        let resource = record.resource().expect("resource should be recorded");
        assert_eq!(resource.resource_id, "i-abc123");
        assert_eq!(resource.public_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(
            resource.credential_file,
            Some(Utf8PathBuf::from("terraform/validator.pem"))
        );
        assert_eq!(
            resource.created_at.map(|stamp| stamp.to_rfc3339()),
            Some(String::from("2026-10-18T09:30:00+00:00"))
        );
        assert!(record.validator_deployed());
    }
}
