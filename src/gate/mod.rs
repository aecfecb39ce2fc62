//! Confirmation and side-effect gate.
//!
//! Every state-changing action passes through [`confirm`] before any external
//! tool runs. The disclosure is rendered on each call from values the caller
//! has just computed, so an answer always refers to current figures. The
//! prompt is the only place the program waits on the operator.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use dialoguer::Confirm;
use dialoguer::console::Term;
use tracing::{debug, info, warn};

use crate::cost::{CostEstimate, HourlyRate};
use crate::error::{DeployError, ToolError};
use crate::reconcile::Action;
use crate::retry::CancellationToken;

/// How often an open prompt looks at the cancellation token.
const CANCEL_CHECK: Duration = Duration::from_millis(100);

type PromptResult = Result<Option<bool>, dialoguer::Error>;

/// Cost information shown before an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostDisclosure {
    /// No cost figure applies.
    None,
    /// Charges that will start accruing.
    Projected(HourlyRate),
    /// Charges accrued by the current run.
    Accrued(CostEstimate),
}

/// What an action will do and what it costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosure {
    action: Action,
    cost: CostDisclosure,
    affected: Vec<String>,
}

impl Disclosure {
    /// Start a disclosure for `action` with no cost and no resources.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            cost: CostDisclosure::None,
            affected: Vec::new(),
        }
    }

    /// Attach a cost figure.
    #[must_use]
    pub const fn with_cost(mut self, cost: CostDisclosure) -> Self {
        self.cost = cost;
        self
    }

    /// Name one affected resource.
    #[must_use]
    pub fn affecting(mut self, resource: impl Into<String>) -> Self {
        self.affected.push(resource.into());
        self
    }

    /// The action being disclosed.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// The affected resources.
    #[must_use]
    pub fn affected(&self) -> &[String] {
        &self.affected
    }
}

impl fmt::Display for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "About to {}:", self.action)?;
        for resource in &self.affected {
            writeln!(f, "  - {resource}")?;
        }
        match &self.cost {
            CostDisclosure::None => Ok(()),
            CostDisclosure::Projected(rate) => writeln!(
                f,
                "Estimated cost: {rate}, about {}/month",
                rate.per_hour.times_hours(crate::cost::HOURS_PER_MONTH)
            ),
            CostDisclosure::Accrued(estimate) => {
                writeln!(f, "Cost of current run: {estimate}")
            }
        }
    }
}

/// Source of the operator's yes/no answer.
pub trait Prompter: Send + Sync {
    /// Show `disclosure` and return whether the operator agreed.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Terminal` when the terminal cannot be used.
    fn ask(&self, disclosure: &str) -> Result<bool, DeployError>;
}

/// [`Prompter`] showing a `dialoguer` confirmation on the terminal.
///
/// Escape, Ctrl-C, a missing terminal and a cancelled token all count as
/// "no", so unattended runs without `--force` never proceed.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    cancel: CancellationToken,
}

impl TerminalPrompter {
    /// Prompt on stderr, giving up as soon as `cancel` fires.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&self, disclosure: &str) -> Result<bool, DeployError> {
        let term = Term::stderr();
        if !term.is_term() {
            warn!("no terminal to confirm on; pass --force for unattended runs");
            return Ok(false);
        }
        term.write_str(disclosure)
            .map_err(|e| ToolError::terminal(&e))?;

        // The key read cannot be interrupted from outside, so it runs on its
        // own thread while this one watches the token.
        let (sender, receiver) = mpsc::channel();
        let prompt_term = term.clone();
        let _prompt_thread = thread::Builder::new()
            .name(String::from("confirm"))
            .spawn(move || {
                let answer = Confirm::new()
                    .with_prompt("Proceed?")
                    .default(false)
                    .interact_on_opt(&prompt_term);
                if sender.send(answer).is_err() {
                    debug!("prompt answered after the run stopped waiting");
                }
            })
            .map_err(|e| ToolError::terminal(&e))?;
        let answer = wait_for_answer(&receiver, &self.cancel);
        if answer.as_ref().is_ok_and(|proceed| !proceed) {
            term.write_line("").map_err(|e| ToolError::terminal(&e))?;
        }
        answer
    }
}

/// Block until the prompt thread answers or `cancel` fires.
fn wait_for_answer(
    receiver: &Receiver<PromptResult>,
    cancel: &CancellationToken,
) -> Result<bool, DeployError> {
    loop {
        if cancel.is_cancelled() {
            info!("confirmation interrupted");
            return Ok(false);
        }
        match receiver.recv_timeout(CANCEL_CHECK) {
            Ok(result) => return answer_from(result),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ToolError::Terminal {
                    message: String::from("prompt ended without an answer"),
                }
                .into());
            }
        }
    }
}

/// Dismissed and interrupted prompts are a "no"; other failures are errors.
fn answer_from(result: PromptResult) -> Result<bool, DeployError> {
    match result {
        Ok(answer) => Ok(answer == Some(true)),
        Err(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::Interrupted => {
            info!("confirmation interrupted");
            Ok(false)
        }
        Err(e) => Err(ToolError::Terminal {
            message: e.to_string(),
        }
        .into()),
    }
}

/// Gate an action behind the operator's confirmation.
///
/// With `force`, returns `true` without prompting.
///
/// # Errors
///
/// Propagates prompter failures.
pub fn confirm<P: Prompter + ?Sized>(
    disclosure: &Disclosure,
    force: bool,
    prompter: &P,
) -> Result<bool, DeployError> {
    if force {
        info!(action = %disclosure.action(), "confirmation skipped (--force)");
        return Ok(true);
    }
    let proceed = prompter.ask(&disclosure.to_string())?;
    info!(action = %disclosure.action(), proceed, "confirmation answered");
    Ok(proceed)
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Prompter mock shared with the reconciler tests.

    use mockall::mock;

    use super::Prompter;
    use crate::error::DeployError;

    mock! {
        #[derive(Debug)]
        pub Prompter {}

        impl Prompter for Prompter {
            fn ask(&self, disclosure: &str) -> Result<bool, DeployError>;
        }
    }
}
