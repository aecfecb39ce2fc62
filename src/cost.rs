//! Cost and elapsed-time estimation.
//!
//! Currency is held as integer micro-dollars (1 USD = 1 000 000 micros) and
//! time as whole seconds, so no floating-point value takes part in an
//! estimate. Rounding to cents happens only when an amount is displayed.
#![expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "fixed-point currency and time arithmetic truncates toward zero"
)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::PricingConfig;
use crate::error::ConfigError;

const MICROS_PER_USD: u64 = 1_000_000;
const MICROS_PER_CENT: u64 = 10_000;
const SECONDS_PER_HOUR: u64 = 3_600;

/// Hours in an average month, used for monthly projections.
pub const HOURS_PER_MONTH: u64 = 730;

/// On-demand Linux rates (us-east-1) in micros per hour.
const BUILTIN_RATES: &[(&str, u64)] = &[
    ("t3.medium", 41_600),
    ("t3.large", 83_200),
    ("t3.xlarge", 166_400),
    ("m5.2xlarge", 384_000),
    ("m6i.4xlarge", 768_000),
    ("m6i.8xlarge", 1_536_000),
    ("c6a.8xlarge", 1_224_000),
    ("c6i.8xlarge", 1_360_000),
    ("r6a.8xlarge", 1_814_400),
    ("r6i.8xlarge", 2_016_000),
    ("m6a.16xlarge", 2_764_800),
];

/// A non-negative US dollar amount in micros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usd {
    micros: u64,
}

impl Usd {
    /// Zero dollars.
    pub const ZERO: Self = Self { micros: 0 };

    /// Build from micros.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// The amount in micros.
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.micros
    }

    /// Parse a decimal string such as `"1.224"` without floating point.
    ///
    /// At most six fractional digits are accepted; signs are rejected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming `field` when the text is not
    /// a plain non-negative decimal.
    pub fn parse(text: &str, field: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("{reason}, got '{text}'"),
        };

        let trimmed = text.trim().trim_start_matches('$');
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("expected a decimal amount"));
        }
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid("expected a non-negative decimal amount"));
        }
        if fraction.len() > 6 {
            return Err(invalid("at most six decimal places are supported"));
        }

        let whole_micros = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .ok()
                .and_then(|units| units.checked_mul(MICROS_PER_USD))
                .ok_or_else(|| invalid("amount is too large"))?
        };
        let padded = format!("{fraction:0<6}");
        let fraction_micros = padded
            .parse::<u64>()
            .map_err(|_| invalid("expected a decimal amount"))?;

        whole_micros
            .checked_add(fraction_micros)
            .map(Self::from_micros)
            .ok_or_else(|| invalid("amount is too large"))
    }

    /// Multiply by whole hours, saturating.
    #[must_use]
    pub const fn times_hours(self, hours: u64) -> Self {
        Self::from_micros(self.micros.saturating_mul(hours))
    }
}

impl fmt::Display for Usd {
    /// Formats as dollars with cents, rounding half up.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = self.micros.saturating_add(MICROS_PER_CENT / 2) / MICROS_PER_CENT;
        write!(f, "${}.{:02}", cents / 100, cents % 100)
    }
}

/// A span of wall-clock time, never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Elapsed {
    seconds: u64,
}

impl Elapsed {
    /// Build from whole seconds.
    #[must_use]
    pub const fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Build from whole hours.
    #[must_use]
    pub const fn from_hours(hours: u64) -> Self {
        Self {
            seconds: hours.saturating_mul(SECONDS_PER_HOUR),
        }
    }

    /// Whole seconds.
    #[must_use]
    pub const fn seconds(self) -> u64 {
        self.seconds
    }

    /// Hours with two decimals, truncated, for display (e.g. `"2.25"`).
    #[must_use]
    pub fn hours_display(self) -> String {
        let hundredths = self.seconds.saturating_mul(100) / SECONDS_PER_HOUR;
        format!("{}.{:02}", hundredths / 100, hundredths % 100)
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.seconds / SECONDS_PER_HOUR;
        let minutes = (self.seconds % SECONDS_PER_HOUR) / 60;
        if hours >= 24 {
            write!(f, "{}d {}h {}m", hours / 24, hours % 24, minutes)
        } else {
            write!(f, "{hours}h {minutes}m")
        }
    }
}

/// Time elapsed from `since` to `now`, floored at zero when the clocks disagree.
#[must_use]
pub fn elapsed_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> Elapsed {
    let seconds = now.signed_duration_since(since).num_seconds();
    Elapsed::from_seconds(u64::try_from(seconds).unwrap_or(0))
}

/// Where an hourly rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Built-in or configured table entry.
    Table,
    /// The class was unknown; the fallback rate was used.
    Fallback,
}

/// An hourly rate and its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyRate {
    /// Cost of one hour.
    pub per_hour: Usd,
    /// Whether the rate is a real table entry or the fallback.
    pub source: RateSource,
}

impl HourlyRate {
    /// Whether this rate is the fallback for an unknown class.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.source, RateSource::Fallback)
    }
}

impl fmt::Display for HourlyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/hour", self.per_hour)?;
        if self.is_fallback() {
            write!(f, " (fallback rate)")?;
        }
        Ok(())
    }
}

/// Rates by resource class with a fallback for unknown classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTable {
    rates: BTreeMap<String, Usd>,
    fallback: Usd,
}

impl PriceTable {
    /// The built-in table with the given fallback.
    #[must_use]
    pub fn builtin(fallback: Usd) -> Self {
        Self {
            rates: BUILTIN_RATES
                .iter()
                .map(|&(class, micros)| (class.to_owned(), Usd::from_micros(micros)))
                .collect(),
            fallback,
        }
    }

    /// The built-in table overlaid with `[pricing]` configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for any rate that is not a decimal.
    pub fn from_config(pricing: &PricingConfig) -> Result<Self, ConfigError> {
        let fallback = Usd::parse(&pricing.fallback_rate, "pricing.fallback_rate")?;
        let mut table = Self::builtin(fallback);
        for (class, rate) in &pricing.rates {
            let amount = Usd::parse(rate, &format!("pricing.rates.{class}"))?;
            table.rates.insert(class.clone(), amount);
        }
        Ok(table)
    }

    /// Look up the hourly rate for `resource_class`.
    ///
    /// Unknown classes get the fallback rate and a warning; the returned rate
    /// is tagged so callers can flag the estimate.
    #[must_use]
    pub fn rate_for(&self, resource_class: &str) -> HourlyRate {
        self.rates.get(resource_class).map_or_else(
            || {
                warn!(
                    resource_class,
                    fallback = %self.fallback,
                    "no price for instance type; using fallback rate"
                );
                HourlyRate {
                    per_hour: self.fallback,
                    source: RateSource::Fallback,
                }
            },
            |&per_hour| HourlyRate {
                per_hour,
                source: RateSource::Table,
            },
        )
    }

    /// Estimate the cost of running `resource_class` for `elapsed`.
    #[must_use]
    pub fn estimate_cost(&self, resource_class: &str, elapsed: Elapsed) -> CostEstimate {
        CostEstimate::new(self.rate_for(resource_class), elapsed)
    }
}

/// `rate × elapsed`, computed in micros and truncated to the micro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    /// The rate used.
    pub rate: HourlyRate,
    /// The duration priced.
    pub elapsed: Elapsed,
    /// The resulting amount.
    pub total: Usd,
}

impl CostEstimate {
    /// Price `elapsed` at `rate`.
    #[must_use]
    pub fn new(rate: HourlyRate, elapsed: Elapsed) -> Self {
        let product =
            u128::from(rate.per_hour.micros()) * u128::from(elapsed.seconds()) / u128::from(SECONDS_PER_HOUR);
        let total = Usd::from_micros(u64::try_from(product).unwrap_or(u64::MAX));
        Self {
            rate,
            elapsed,
            total,
        }
    }

    /// Projected cost of a month at the same rate.
    #[must_use]
    pub const fn monthly(&self) -> Usd {
        self.rate.per_hour.times_hours(HOURS_PER_MONTH)
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} over {} at {}", self.total, self.elapsed, self.rate)
    }
}
