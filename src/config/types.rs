//! Configuration data types for valdeploy.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Cloud provider settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region used when neither `--region` nor `VALDEPLOY_REGION` is set.
    #[default = "us-east-1"]
    pub region: String,

    /// Instance type requested from the provisioning tool and used for pricing.
    #[default = "r6a.8xlarge"]
    pub instance_type: String,

    /// AWS CLI executable.
    #[default = "aws"]
    pub binary: String,
}

/// Infrastructure tool settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct TerraformConfig {
    /// Working directory holding the Terraform configuration.
    #[default(_code = "Utf8PathBuf::from(\"terraform\")")]
    pub dir: Utf8PathBuf,

    /// Terraform executable.
    #[default = "terraform"]
    pub binary: String,

    /// Plan file written by `plan` and consumed by `apply`, relative to `dir`.
    #[default = "tfplan"]
    pub plan_file: String,

    /// Output holding the instance id.
    #[default = "instance_id"]
    pub instance_id_output: String,

    /// Output holding the public address.
    #[default = "public_ip"]
    pub public_ip_output: String,

    /// Output holding the generated SSH private key path.
    #[default = "ssh_private_key_path"]
    pub key_file_output: String,
}

/// Declarative state store settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// The JSON store file.
    #[default(_code = "Utf8PathBuf::from(\"deployment.json\")")]
    pub file: Utf8PathBuf,

    /// Directory holding generated keypairs.
    #[default(_code = "Utf8PathBuf::from(\"keys\")")]
    pub keys_dir: Utf8PathBuf,

    /// Locally derived files removed after a successful destroy.
    #[default(_code = "vec![Utf8PathBuf::from(\"terraform/tfplan\")]")]
    pub artifacts: Vec<Utf8PathBuf>,
}

/// Remote execution settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct SshConfig {
    /// Login user on the instance.
    #[default = "ubuntu"]
    pub user: String,

    /// Private key; overrides the key path recorded at provisioning time.
    pub key_file: Option<Utf8PathBuf>,

    /// Connection timeout passed as `-o ConnectTimeout`.
    #[default = 10]
    pub connect_timeout_secs: u64,

    /// SSH executable.
    #[default = "ssh"]
    pub binary: String,
}

/// Bounds for provider retries and state polling.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between state polls.
    #[default = 10]
    pub interval_secs: u64,

    /// Maximum number of state polls before reporting a timeout.
    #[default = 30]
    pub max_attempts: u32,

    /// Attempts for a single provider call that fails transiently.
    #[default = 3]
    pub probe_retries: u32,

    /// First backoff delay; doubles on each retry.
    #[default = 500]
    pub backoff_base_ms: u64,
}

/// Hourly pricing used for cost disclosure.
///
/// Amounts are decimal strings (for example `"1.224"`) so that no
/// floating-point value ever enters the estimate.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Rate applied to instance types missing from the table.
    #[default = "1.00"]
    pub fallback_rate: String,

    /// Per-instance-type overrides layered over the built-in table.
    pub rates: BTreeMap<String, String>,
}

/// Solana tooling settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct SolanaConfig {
    /// RPC endpoint used for balances and airdrops.
    #[default = "https://api.testnet.solana.com"]
    pub cluster_url: String,

    /// `solana` executable.
    #[default = "solana"]
    pub cli_binary: String,

    /// `solana-keygen` executable.
    #[default = "solana-keygen"]
    pub keygen_binary: String,

    /// Default airdrop request in SOL.
    #[default = 1]
    pub airdrop_sol: u64,

    /// Balance polls before reporting that funds may still arrive.
    #[default = 12]
    pub balance_poll_attempts: u32,
}

/// Remote validator process settings.
#[derive(Debug, Clone, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// systemd unit running the validator.
    #[default = "validator"]
    pub service: String,

    /// Default number of log lines for `validator logs`.
    #[default = 100]
    pub log_lines: u32,

    /// Remote shell command that builds or installs the validator binary.
    #[default = "curl -sSfL https://release.anza.xyz/stable/install | sh"]
    pub install_command: String,

    /// `ExecStart=` line of the generated systemd unit.
    #[default = "/home/ubuntu/.local/share/solana/install/active_release/bin/agave-validator \
        --identity /home/ubuntu/validator-keypair.json \
        --vote-account /home/ubuntu/vote-account-keypair.json \
        --ledger /home/ubuntu/ledger --log - --limit-ledger-size \
        --entrypoint entrypoint.testnet.solana.com:8001"]
    pub exec_start: String,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `VALDEPLOY_CONFIG_PATH` environment variable
/// 2. `.valdeploy.toml` in the current working directory
/// 3. `.valdeploy.toml` in the home directory
/// 4. `~/.config/valdeploy/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "VALDEPLOY",
    post_merge_hook,
    discovery(
        app_name = "valdeploy",
        env_var = "VALDEPLOY_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".valdeploy.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Region override; takes precedence over `aws.region`.
    pub region: Option<String>,

    /// Named AWS CLI profile.
    pub profile: Option<String>,

    /// Cloud provider settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub aws: AwsConfig,

    /// Infrastructure tool settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub terraform: TerraformConfig,

    /// State store settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub state: StateConfig,

    /// Remote execution settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub ssh: SshConfig,

    /// Retry and polling bounds.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub polling: PollingConfig,

    /// Pricing table.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub pricing: PricingConfig,

    /// Solana tooling settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub solana: SolanaConfig,

    /// Remote validator settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub validator: ValidatorConfig,
}

impl AppConfig {
    /// Returns the region in effect: the top-level override or `aws.region`.
    #[must_use]
    pub fn effective_region(&self) -> &str {
        self.region.as_deref().unwrap_or(&self.aws.region)
    }

    /// Validates values that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for empty instance types or regions,
    /// and for a zero polling budget.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.aws.instance_type.trim().is_empty() {
            return invalid("aws.instance_type", "cannot be empty");
        }
        if self.effective_region().trim().is_empty() {
            return invalid("region", "cannot be empty");
        }
        if self.polling.max_attempts == 0 {
            return invalid("polling.max_attempts", "must be at least 1");
        }
        if self.polling.probe_retries == 0 {
            return invalid("polling.probe_retries", "must be at least 1");
        }
        if self.validator.exec_start.trim().is_empty() {
            return invalid("validator.exec_start", "cannot be empty");
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::Result<()> {
    Err(crate::error::ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
    .into())
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank overrides behave as if they were never set.
        self.region = self.region.take().filter(|value| !value.trim().is_empty());
        self.profile = self.profile.take().filter(|value| !value.trim().is_empty());
        Ok(())
    }
}
