//! `valdeploy` application entry point.
//!
//! This binary provisions and supervises a cloud-hosted Solana validator. It
//! uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/valdeploy/config.toml` or path from `VALDEPLOY_CONFIG_PATH`)
//! 3. Environment variables (`VALDEPLOY_*`)
//! 4. Command-line arguments

use std::process::ExitCode;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use valdeploy::api::{
    self, CommandReport, KeysRequest, SystemServices, ValidatorRequest,
};
use valdeploy::config::{
    AppConfig, Cli, Commands, KeysCommand, StatusArgs, ValidatorCommand, load_config,
};
use valdeploy::error::Result as DeployResult;
use valdeploy::process::{Prerequisites, check_prerequisites};
use valdeploy::reconcile::{Action, ActionRequest};
use valdeploy::retry::CancellationToken;

/// Clears the terminal and homes the cursor between `status --watch` frames.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, then
/// dispatches to the appropriate subcommand on a Tokio runtime.
///
/// Uses `eyre::Result` as the return type to provide human-readable error
/// reports. A wait that ran out exits with status 1 without an error report.
fn main() -> EyreResult<ExitCode> {
    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime
        .block_on(run(&cli.command, config))
        .map_err(Report::from)?;
    print_report(&report);
    Ok(ExitCode::from(
        u8::try_from(report.outcome.exit_code()).unwrap_or(1),
    ))
}

/// Logs go to stderr so reports on stdout stay clean.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(command: &Commands, config: AppConfig) -> DeployResult<CommandReport> {
    check_prerequisites(
        &prerequisites(command, &config),
        &mockable::DefaultEnv::new(),
        config.profile.as_deref(),
    )?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());
    let services = SystemServices::from_config(config, cancel)?;

    match command {
        Commands::Deploy(args) => {
            api::run_action(&services, ActionRequest::new(Action::Deploy).forced(args.force)).await
        }
        Commands::Start(args) => {
            api::run_action(&services, ActionRequest::new(Action::Start).forced(args.force)).await
        }
        Commands::Stop(args) => {
            api::run_action(&services, ActionRequest::new(Action::Stop).forced(args.force)).await
        }
        Commands::Destroy(args) => {
            let request = ActionRequest::new(Action::Destroy { full: args.full }).forced(args.force);
            api::run_action(&services, request).await
        }
        Commands::Status(args) => status(&services, *args).await,
        Commands::Validator(command) => api::validator(&services, validator_request(command)).await,
        Commands::Keys(command) => api::keys(&services, keys_request(command)).await,
    }
}

async fn status(services: &SystemServices, args: StatusArgs) -> DeployResult<CommandReport> {
    if !args.watch {
        return api::status(services, args.quick).await;
    }
    api::watch_status(services, args.quick, |report| {
        print_frame(&report.to_string());
        Ok(())
    })
    .await
}

/// Tools and credentials each command needs before it runs.
fn prerequisites(command: &Commands, config: &AppConfig) -> Prerequisites {
    let aws = config.aws.binary.as_str();
    match command {
        Commands::Deploy(_) | Commands::Destroy(_) => {
            Prerequisites::tools([config.terraform.binary.as_str(), aws]).with_aws_credentials()
        }
        Commands::Start(_) | Commands::Stop(_) | Commands::Status(_) => {
            Prerequisites::tools([aws]).with_aws_credentials()
        }
        Commands::Validator(_) => Prerequisites::tools([config.ssh.binary.as_str()]),
        Commands::Keys(KeysCommand::Generate) => {
            Prerequisites::tools([config.solana.keygen_binary.as_str()])
        }
        Commands::Keys(KeysCommand::Fund(_) | KeysCommand::Show) => {
            Prerequisites::tools([config.solana.cli_binary.as_str()])
        }
    }
}

const fn validator_request(command: &ValidatorCommand) -> ValidatorRequest {
    match command {
        ValidatorCommand::Deploy => ValidatorRequest::Deploy,
        ValidatorCommand::Start => ValidatorRequest::Start,
        ValidatorCommand::Stop => ValidatorRequest::Stop,
        ValidatorCommand::Status => ValidatorRequest::Status,
        ValidatorCommand::Logs(args) => ValidatorRequest::Logs {
            lines: args.lines,
            follow: args.follow,
        },
    }
}

const fn keys_request(command: &KeysCommand) -> KeysRequest {
    match command {
        KeysCommand::Generate => KeysRequest::Generate,
        KeysCommand::Fund(args) => KeysRequest::Fund {
            amount: args.amount,
        },
        KeysCommand::Show => KeysRequest::Show,
    }
}

/// Cancel waits on the first Ctrl-C so the run can report what is pending.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received; cancelling waits");
            cancel.cancel();
        }
    });
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_report(report: &CommandReport) {
    let message = report.message.trim_end();
    if !message.is_empty() {
        println!("{message}");
    }
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_frame(frame: &str) {
    print!("{CLEAR_SCREEN}{frame}");
}
