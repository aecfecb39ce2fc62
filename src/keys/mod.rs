//! Validator key material and funding.
//!
//! Keypairs are produced by `solana-keygen` and never overwritten once they
//! exist. Funding requests an airdrop and then waits for the balance with the
//! same poll loop used for instance state.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tracing::{debug, info};

use crate::config::SolanaConfig;
use crate::error::{DeployError, StateError, ToolError};
use crate::process::{CommandRunner, CommandSpec};
use crate::retry::{CancellationToken, PollOutcome, PollSchedule, poll_until};
use crate::state::keys;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// The keypairs a validator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Node identity; pays for votes.
    Identity,
    /// Vote account.
    Vote,
    /// Authorised withdrawer for the vote account.
    Withdrawer,
}

impl KeyKind {
    /// Every kind, in generation order.
    pub const ALL: [Self; 3] = [Self::Identity, Self::Vote, Self::Withdrawer];

    /// File name under the keys directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Identity => "identity.json",
            Self::Vote => "vote-account.json",
            Self::Withdrawer => "withdrawer.json",
        }
    }

    /// Store key holding the public key.
    #[must_use]
    pub const fn store_key(self) -> &'static str {
        match self {
            Self::Identity => keys::IDENTITY_PUBKEY,
            Self::Vote => keys::VOTE_PUBKEY,
            Self::Withdrawer => keys::WITHDRAWER_PUBKEY,
        }
    }

    /// Label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Vote => "vote account",
            Self::Withdrawer => "withdrawer",
        }
    }
}

/// A keypair file and its public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Which key this is.
    pub kind: KeyKind,
    /// Keypair file.
    pub path: Utf8PathBuf,
    /// Base58 public key.
    pub pubkey: String,
    /// Whether this run created the file.
    pub created: bool,
}

/// An amount of lamports, displayed in SOL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Lamports(pub u64);

impl Lamports {
    /// Whole SOL expressed in lamports, saturating.
    #[must_use]
    pub const fn from_sol(sol: u64) -> Self {
        Self(sol.saturating_mul(LAMPORTS_PER_SOL))
    }
}

impl fmt::Display for Lamports {
    #[expect(
        clippy::integer_division,
        clippy::integer_division_remainder_used,
        reason = "splitting lamports into whole and fractional SOL"
    )]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / LAMPORTS_PER_SOL;
        let fraction = self.0 % LAMPORTS_PER_SOL;
        if fraction == 0 {
            return write!(f, "{whole} SOL");
        }
        let digits = format!("{fraction:09}");
        write!(f, "{whole}.{} SOL", digits.trim_end_matches('0'))
    }
}

/// Result of [`fund`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundOutcome {
    /// The balance already covered the request; no airdrop was made.
    AlreadyFunded {
        /// Balance observed.
        balance: Lamports,
    },
    /// The airdrop landed.
    Funded {
        /// Balance observed after the airdrop.
        balance: Lamports,
    },
    /// The airdrop was accepted but the balance had not caught up.
    Pending {
        /// Balance checks made.
        attempts: u32,
    },
    /// The wait was cancelled.
    Interrupted,
}

/// The fields of `solana vote-account` shown in status reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteAccount {
    /// `Account Balance`, as printed.
    pub balance: Option<String>,
    /// `Commission`, as printed.
    pub commission: Option<String>,
    /// `Root Slot`, as printed.
    pub root_slot: Option<String>,
}

impl VoteAccount {
    fn from_cli_output(stdout: &str) -> Self {
        let field = |name: &str| {
            stdout
                .lines()
                .find_map(|line| line.trim().strip_prefix(name)?.strip_prefix(':'))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };
        Self {
            balance: field("Account Balance"),
            commission: field("Commission"),
            root_slot: field("Root Slot"),
        }
    }
}

impl fmt::Display for VoteAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("balance", &self.balance),
            ("commission", &self.commission),
            ("root slot", &self.root_slot),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|text| format!("{label} {text}")))
        .collect();
        if parts.is_empty() {
            return f.write_str("found");
        }
        f.write_str(&parts.join(", "))
    }
}

/// Wrapper around `solana-keygen` and `solana`.
#[derive(Debug, Clone)]
pub struct SolanaCli<R> {
    runner: R,
    keygen: String,
    cli: String,
    cluster_url: String,
}

impl<R: CommandRunner> SolanaCli<R> {
    /// Build from the `[solana]` settings.
    #[must_use]
    pub fn from_config(runner: R, solana: &SolanaConfig) -> Self {
        Self {
            runner,
            keygen: solana.keygen_binary.clone(),
            cli: solana.cli_binary.clone(),
            cluster_url: solana.cluster_url.clone(),
        }
    }

    /// Create every missing keypair under `dir` and read all public keys.
    ///
    /// Existing files are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Io` when `dir` cannot be created, and propagates
    /// keygen failures.
    pub async fn generate(&self, dir: &Utf8Path) -> Result<Vec<KeyPair>, DeployError> {
        let handle = open_keys_dir(dir)?;
        let mut pairs = Vec::with_capacity(KeyKind::ALL.len());
        for kind in KeyKind::ALL {
            let path = dir.join(kind.file_name());
            let created = !handle.exists(kind.file_name());
            if created {
                let spec = CommandSpec::new(self.keygen.as_str())
                    .args(["new", "--no-bip39-passphrase", "--silent", "-o"])
                    .arg(path.as_str());
                self.runner.run(spec.clone()).await?.into_success(&spec)?;
                info!(key = kind.label(), path = %path, "generated keypair");
            } else {
                debug!(key = kind.label(), path = %path, "keypair exists, keeping it");
            }
            let pubkey = self.pubkey(&path).await?;
            pairs.push(KeyPair {
                kind,
                path,
                pubkey,
                created,
            });
        }
        Ok(pairs)
    }

    /// Public key of the keypair at `path`.
    ///
    /// # Errors
    ///
    /// Propagates keygen failures; empty output is `ToolError::UnexpectedOutput`.
    pub async fn pubkey(&self, path: &Utf8Path) -> Result<String, DeployError> {
        let spec = CommandSpec::new(self.keygen.as_str()).args(["pubkey", path.as_str()]);
        let output = self.runner.run(spec.clone()).await?.into_success(&spec)?;
        let pubkey = output.stdout.trim();
        if pubkey.is_empty() {
            return Err(ToolError::UnexpectedOutput {
                program: self.keygen.clone(),
                message: format!("no public key printed for {path}"),
            }
            .into());
        }
        Ok(pubkey.to_owned())
    }

    /// Current balance of `pubkey` on the configured cluster.
    ///
    /// # Errors
    ///
    /// Propagates CLI failures; unparseable output is
    /// `ToolError::UnexpectedOutput`.
    pub async fn balance(&self, pubkey: &str) -> Result<Lamports, DeployError> {
        let spec = CommandSpec::new(self.cli.as_str())
            .args(["balance", pubkey, "--url", self.cluster_url.as_str(), "--lamports"]);
        let output = self.runner.run(spec.clone()).await?.into_success(&spec)?;
        parse_lamports(&output.stdout)
            .map(Lamports)
            .ok_or_else(|| {
                ToolError::UnexpectedOutput {
                    program: self.cli.clone(),
                    message: format!("cannot read a balance from '{}'", output.stdout.trim()),
                }
                .into()
            })
    }

    /// Look up the vote account `pubkey`; `None` when the cluster has no
    /// such account.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` for any other CLI failure.
    pub async fn vote_account(&self, pubkey: &str) -> Result<Option<VoteAccount>, DeployError> {
        let spec = CommandSpec::new(self.cli.as_str())
            .args(["vote-account", pubkey, "--url", self.cluster_url.as_str()]);
        let output = self.runner.run(spec.clone()).await?;
        if !output.is_success() && is_missing_account(&output.stderr) {
            debug!(pubkey, cluster = %self.cluster_url, "vote account not found");
            return Ok(None);
        }
        let printed = output.into_success(&spec)?;
        Ok(Some(VoteAccount::from_cli_output(&printed.stdout)))
    }

    /// Request `sol` from the cluster faucet.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` when the faucet refuses.
    pub async fn airdrop(&self, pubkey: &str, sol: u64) -> Result<(), DeployError> {
        let spec = CommandSpec::new(self.cli.as_str())
            .arg("airdrop")
            .arg(sol.to_string())
            .args([pubkey, "--url", self.cluster_url.as_str()]);
        self.runner.run(spec.clone()).await?.into_success(&spec)?;
        info!(pubkey, sol, cluster = %self.cluster_url, "airdrop requested");
        Ok(())
    }
}

/// Ensure `pubkey` holds at least `sol`, airdropping and waiting if needed.
///
/// # Errors
///
/// Propagates balance and airdrop failures.
pub async fn fund<R: CommandRunner>(
    cli: &SolanaCli<R>,
    pubkey: &str,
    sol: u64,
    schedule: &PollSchedule,
    cancel: &CancellationToken,
) -> Result<FundOutcome, DeployError> {
    let wanted = Lamports::from_sol(sol);
    let current = cli.balance(pubkey).await?;
    if current >= wanted {
        info!(pubkey, balance = %current, "already funded");
        return Ok(FundOutcome::AlreadyFunded { balance: current });
    }

    cli.airdrop(pubkey, sol).await?;
    let waited = poll_until(schedule, cancel, |attempt| async move {
        let balance = cli.balance(pubkey).await?;
        debug!(attempt, balance = %balance, "waiting for airdrop");
        Ok::<_, DeployError>((balance >= wanted).then_some(balance))
    })
    .await?;

    Ok(match waited {
        PollOutcome::Reached(balance) => FundOutcome::Funded { balance },
        PollOutcome::TimedOut { attempts } => FundOutcome::Pending { attempts },
        PollOutcome::Cancelled => FundOutcome::Interrupted,
    })
}

/// `solana balance --lamports` prints `<n> lamports`.
fn parse_lamports(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

fn is_missing_account(stderr: &str) -> bool {
    stderr.contains("AccountNotFound") || stderr.contains("account does not exist")
}

fn open_keys_dir(dir: &Utf8Path) -> Result<Dir, DeployError> {
    let io_error = |error: std::io::Error| StateError::Io {
        path: dir.as_std_path().to_path_buf(),
        message: error.to_string(),
    };
    Dir::create_ambient_dir_all(dir, ambient_authority()).map_err(io_error)?;
    Ok(Dir::open_ambient_dir(dir, ambient_authority()).map_err(io_error)?)
}
