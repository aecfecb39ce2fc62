//! Configuration system for valdeploy.
//!
//! This module provides the configuration structures and CLI definitions for
//! valdeploy. Configuration loading and precedence merging is handled by the
//! `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/valdeploy/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! region = "eu-west-1"
//!
//! [aws]
//! instance_type = "r6a.8xlarge"
//!
//! [terraform]
//! dir = "infra"
//!
//! [state]
//! file = "deployment.json"
//! keys_dir = "keys"
//!
//! [ssh]
//! user = "ubuntu"
//! connect_timeout_secs = 10
//!
//! [polling]
//! interval_secs = 10
//! max_attempts = 30
//!
//! [pricing]
//! fallback_rate = "1.00"
//! rates = { "c6a.8xlarge" = "1.224" }
//!
//! [solana]
//! cluster_url = "https://api.testnet.solana.com"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{
    Cli, Commands, DestroyArgs, ForceArgs, FundArgs, KeysCommand, LogsArgs, StatusArgs,
    ValidatorCommand,
};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, AwsConfig, PollingConfig, PricingConfig, SolanaConfig, SshConfig, StateConfig,
    TerraformConfig, ValidatorConfig,
};
