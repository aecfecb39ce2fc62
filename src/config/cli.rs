//! Command-line argument definitions for valdeploy.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for valdeploy.
#[derive(Debug, Parser)]
#[command(name = "valdeploy")]
#[command(
    author,
    version,
    about = "Provision, reconcile and supervise a cloud-hosted Solana validator"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Cloud region, overriding `aws.region`.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Named AWS CLI profile.
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Enable debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision the validator instance (no-op when already deployed).
    Deploy(ForceArgs),

    /// Start a stopped instance and refresh its address.
    Start(ForceArgs),

    /// Stop a running instance.
    Stop(ForceArgs),

    /// Tear down all provisioned infrastructure.
    Destroy(DestroyArgs),

    /// Report live instance state, uptime and accrued cost.
    Status(StatusArgs),

    /// Supervise the validator process on the instance.
    #[command(subcommand)]
    Validator(ValidatorCommand),

    /// Generate and fund validator key material.
    #[command(subcommand)]
    Keys(KeysCommand),
}

/// Arguments shared by state-changing subcommands.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct ForceArgs {
    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `destroy` subcommand.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,

    /// Also delete generated key material.
    #[arg(long)]
    pub full: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct StatusArgs {
    /// Skip the remote validator health probe.
    #[arg(long)]
    pub quick: bool,

    /// Re-render on the polling interval until interrupted.
    #[arg(long)]
    pub watch: bool,
}

/// Validator supervision subcommands.
#[derive(Debug, Subcommand)]
pub enum ValidatorCommand {
    /// Build or install the validator and its systemd unit.
    Deploy,

    /// Start the validator service.
    Start,

    /// Stop the validator service.
    Stop,

    /// Show the validator service status.
    Status,

    /// Show recent validator logs.
    Logs(LogsArgs),
}

/// Arguments for `validator logs`.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct LogsArgs {
    /// Number of lines to show (defaults to `validator.log_lines`).
    #[arg(long)]
    pub lines: Option<u32>,

    /// Stream new lines until interrupted.
    #[arg(long)]
    pub follow: bool,
}

/// Key-material subcommands.
#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Generate identity, vote and withdrawer keypairs (existing files are kept).
    Generate,

    /// Airdrop to the identity and wait for the balance to arrive.
    Fund(FundArgs),

    /// Show recorded public keys and the identity balance.
    Show,
}

/// Arguments for `keys fund`.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct FundArgs {
    /// Amount of SOL to request (defaults to `solana.airdrop_sol`).
    #[arg(long)]
    pub amount: Option<u64>,
}
