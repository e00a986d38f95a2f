use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six recurring jobs the scheduler owns. Each kind is bound to a fixed
/// cron expression at compile time; nothing about the set changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    OpportunityScan,
    AutonomousListing,
    OrderFulfillment,
    Cleanup,
    DailyReset,
    PayoutProcessing,
}

impl JobKind {
    /// Every kind, in registration order.
    pub const fn all() -> [JobKind; 6] {
        [
            JobKind::OpportunityScan,
            JobKind::AutonomousListing,
            JobKind::OrderFulfillment,
            JobKind::Cleanup,
            JobKind::DailyReset,
            JobKind::PayoutProcessing,
        ]
    }

    /// Unique registry key, also the `:name` path segment in the management API.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::OpportunityScan => "opportunity-scan",
            JobKind::AutonomousListing => "autonomous-listing",
            JobKind::OrderFulfillment => "order-fulfillment",
            JobKind::Cleanup => "cleanup",
            JobKind::DailyReset => "daily-reset",
            JobKind::PayoutProcessing => "payout-processing",
        }
    }

    /// Five-field cron expression (minute resolution).
    pub fn schedule(&self) -> &'static str {
        match self {
            JobKind::OpportunityScan => "*/15 * * * *",
            JobKind::AutonomousListing => "0 * * * *",
            JobKind::OrderFulfillment => "*/30 * * * *",
            JobKind::Cleanup => "0 */6 * * *",
            JobKind::DailyReset => "0 0 * * *",
            JobKind::PayoutProcessing => "0 */4 * * *",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            JobKind::OpportunityScan => "Scan marketplaces for price-gap opportunities",
            JobKind::AutonomousListing => "Create marketplace listings for qualified opportunities",
            JobKind::OrderFulfillment => "Check pending orders awaiting supplier purchase",
            JobKind::Cleanup => "Expire stale opportunities and lapsed listings",
            JobKind::DailyReset => "Reset daily counters and log summary statistics",
            JobKind::PayoutProcessing => "Collect payout totals from the marketplace backend",
        }
    }

    /// Human-friendly cadence label shown in the status endpoint.
    pub fn cadence(&self) -> &'static str {
        match self {
            JobKind::OpportunityScan => "every 15 minutes",
            JobKind::AutonomousListing => "hourly",
            JobKind::OrderFulfillment => "every 30 minutes",
            JobKind::Cleanup => "every 6 hours",
            JobKind::DailyReset => "daily at midnight",
            JobKind::PayoutProcessing => "every 4 hours",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::all()
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown job name: {s}"))
    }
}

/// Per-job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the next trigger.
    Idle,
    /// A body is currently executing.
    Running,
    /// The most recent run failed; retried on the normal schedule.
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Static identity and config for one recurring job. Created once at
/// scheduler initialization; only `enabled` changes afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub kind: JobKind,
    pub name: &'static str,
    pub schedule: &'static str,
    pub description: &'static str,
    pub enabled: bool,
}

impl JobDescriptor {
    pub fn new(kind: JobKind, enabled: bool) -> Self {
        Self {
            kind,
            name: kind.name(),
            schedule: kind.schedule(),
            description: kind.description(),
            enabled,
        }
    }
}

/// Mutable execution history for one job.
///
/// `run_count` increments at the start of every invocation regardless of
/// outcome; `last_error` is cleared on success and retained across failures
/// until overwritten.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunState {
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub status: JobStatus,
    pub last_error: Option<String>,
}

impl Default for JobRunState {
    fn default() -> Self {
        Self {
            last_run: None,
            run_count: 0,
            status: JobStatus::Idle,
            last_error: None,
        }
    }
}

/// Flat threshold record handed unchanged to every scan invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParams {
    /// Minimum opportunity score (0-100).
    pub min_score: f64,
    /// Minimum return on investment, percent.
    pub min_roi: f64,
    /// Minimum absolute profit per unit.
    pub min_profit: f64,
    /// Maximum supplier price considered.
    pub max_price: f64,
    /// Daily auto-buy spend ceiling.
    pub daily_budget: f64,
    /// Markup applied when listing, percent over supplier price.
    pub markup_percent: f64,
    /// Whether the engine may commit spend against the daily budget.
    pub auto_buy: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            min_score: 70.0,
            min_roi: 20.0,
            min_profit: 10.0,
            max_price: 200.0,
            daily_budget: 500.0,
            markup_percent: 35.0,
            auto_buy: false,
        }
    }
}

/// Partial scan-parameter record accepted by the config-merge operation.
/// Absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParamsPatch {
    pub min_score: Option<f64>,
    pub min_roi: Option<f64>,
    pub min_profit: Option<f64>,
    pub max_price: Option<f64>,
    pub daily_budget: Option<f64>,
    pub markup_percent: Option<f64>,
    pub auto_buy: Option<bool>,
}

impl ScanParams {
    /// Merge a partial update into this record. No validation; the thresholds
    /// are taken wholesale, matching the config surface's contract.
    pub fn apply(&mut self, patch: &ScanParamsPatch) {
        if let Some(v) = patch.min_score {
            self.min_score = v;
        }
        if let Some(v) = patch.min_roi {
            self.min_roi = v;
        }
        if let Some(v) = patch.min_profit {
            self.min_profit = v;
        }
        if let Some(v) = patch.max_price {
            self.max_price = v;
        }
        if let Some(v) = patch.daily_budget {
            self.daily_budget = v;
        }
        if let Some(v) = patch.markup_percent {
            self.markup_percent = v;
        }
        if let Some(v) = patch.auto_buy {
            self.auto_buy = v;
        }
    }
}

/// Which jobs start enabled. Fixed at scheduler construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub scan: bool,
    pub listing: bool,
    pub fulfillment: bool,
    pub cleanup: bool,
    pub reset: bool,
    pub payout: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan: true,
            listing: true,
            fulfillment: true,
            cleanup: true,
            reset: true,
            payout: true,
        }
    }
}

impl SchedulerConfig {
    pub fn enabled_for(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::OpportunityScan => self.scan,
            JobKind::AutonomousListing => self.listing,
            JobKind::OrderFulfillment => self.fulfillment,
            JobKind::Cleanup => self.cleanup,
            JobKind::DailyReset => self.reset,
            JobKind::PayoutProcessing => self.payout,
        }
    }
}

/// Lifecycle tag on a tracked opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    /// Detected by a scan, not yet listed.
    Found,
    /// A marketplace listing was created for it.
    Listed,
    /// Past its expiry window without being listed.
    Expired,
}

/// A detected price gap between a supplier and a marketplace.
///
/// The scheduler only reads the identity/score/price fields; everything else
/// is carried through to the listing request untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub score: f64,
    /// Return on investment, percent.
    pub roi: f64,
    /// Absolute profit per unit after fees.
    pub profit: f64,
    pub supplier_price: f64,
    pub supplier_url: String,
    pub supplier_platform: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub status: OpportunityStatus,
    pub found_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_name_round_trip() {
        for kind in JobKind::all() {
            let parsed: JobKind = kind.name().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("no-such-job".parse::<JobKind>().is_err());
    }

    #[test]
    fn job_kind_names_are_unique() {
        let names: Vec<_> = JobKind::all().iter().map(|k| k.name()).collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn scan_params_patch_merges_partially() {
        let mut params = ScanParams::default();
        params.apply(&ScanParamsPatch {
            min_score: Some(85.0),
            auto_buy: Some(true),
            ..Default::default()
        });
        assert_eq!(params.min_score, 85.0);
        assert!(params.auto_buy);
        // untouched fields keep their defaults
        assert_eq!(params.min_roi, ScanParams::default().min_roi);
        assert_eq!(params.max_price, ScanParams::default().max_price);
    }

    #[test]
    fn scheduler_config_covers_every_kind() {
        let config = SchedulerConfig {
            listing: false,
            ..Default::default()
        };
        assert!(config.enabled_for(JobKind::OpportunityScan));
        assert!(!config.enabled_for(JobKind::AutonomousListing));
    }
}
