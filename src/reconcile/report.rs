//! Human-readable status report.

use std::fmt;

use crate::cloud::{ProbeReport, ResourceState};
use crate::cost::{CostEstimate, HourlyRate};
use crate::state::RecordedResource;

/// Declared and live state side by side, with uptime and cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// The recorded resource, if any.
    pub resource: Option<RecordedResource>,
    /// Fresh probe result.
    pub live: ProbeReport,
    /// Hourly rate for the instance type.
    pub rate: Option<HourlyRate>,
    /// Cost since the last launch, when running.
    pub accrued: Option<CostEstimate>,
    /// Whether the validator binary and unit have been installed.
    pub validator_deployed: bool,
    /// Remote service state, when the health probe ran.
    pub validator_health: Option<String>,
    /// Recorded vote account and what the cluster says about it, when looked up.
    pub vote_account: Option<String>,
}

impl StatusReport {
    /// Whether anything is recorded.
    #[must_use]
    pub const fn is_deployed(&self) -> bool {
        self.resource.is_some()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(resource) = &self.resource else {
            return writeln!(f, "Nothing is deployed. Run `valdeploy deploy` to provision an instance.");
        };

        writeln!(f, "Instance:   {}", resource.resource_id)?;
        write!(f, "State:      {}", self.live.state)?;
        match (&self.live.reason, self.live.state) {
            (Some(reason), _) => writeln!(f, " ({reason})")?,
            (None, ResourceState::Absent | ResourceState::Terminated) => {
                writeln!(f, " (record is stale; run `valdeploy deploy` to re-provision)")?;
            }
            (None, _) => writeln!(f)?,
        }

        let class = self
            .live
            .attributes
            .resource_class
            .as_deref()
            .or(resource.resource_class.as_deref());
        writeln!(f, "Type:       {}", class.unwrap_or("-"))?;
        writeln!(f, "Region:     {}", resource.region.as_deref().unwrap_or("-"))?;
        let address = self
            .live
            .attributes
            .public_address
            .as_deref()
            .or(resource.public_address.as_deref());
        writeln!(f, "Address:    {}", address.unwrap_or("-"))?;
        if let Some(created) = resource.created_at {
            writeln!(f, "Created:    {}", created.to_rfc3339())?;
        }
        if let Some(rate) = &self.rate {
            writeln!(f, "Rate:       {rate}")?;
        }
        if let Some(accrued) = &self.accrued {
            writeln!(f, "Uptime:     {} ({} h)", accrued.elapsed, accrued.elapsed.hours_display())?;
            writeln!(f, "Cost:       {} since launch", accrued.total)?;
        }
        writeln!(
            f,
            "Validator:  {}",
            if self.validator_deployed { "deployed" } else { "not deployed" }
        )?;
        if let Some(health) = &self.validator_health {
            writeln!(f, "Service:    {health}")?;
        }
        if let Some(vote) = &self.vote_account {
            writeln!(f, "Vote:       {vote}")?;
        }
        Ok(())
    }
}
