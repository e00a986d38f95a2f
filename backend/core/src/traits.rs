use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::market::{Listing, ListingReceipt, ListingRequest, Order, PayoutStats};
use crate::types::{Opportunity, OpportunityStatus, ScanParams};

/// Snapshot of the engine's internal counters, logged by the daily reset job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Opportunities currently tagged `found`.
    pub tracked: usize,
    /// Opportunities listed since they were found.
    pub listed: usize,
    /// Opportunities that lapsed without a listing.
    pub expired: usize,
    pub scans_today: u64,
    pub listings_today: u64,
    pub spend_today: f64,
}

/// The scan/analysis collaborator the scheduler drives.
///
/// The scheduler holds only a capability reference; it never reaches into
/// engine state directly.
#[async_trait]
pub trait OpportunityEngine: Send + Sync {
    /// Run one scan pass with the given thresholds, returning the newly
    /// accepted opportunities.
    async fn scan(&self, params: &ScanParams) -> Result<Vec<Opportunity>>;

    /// Tracked opportunities with the given status and a score of at least
    /// `min_score`, capped at `limit`.
    async fn opportunities(
        &self,
        status: OpportunityStatus,
        min_score: f64,
        limit: usize,
    ) -> Vec<Opportunity>;

    /// Flip a tracked opportunity to `listed`. Returns false if unknown.
    async fn mark_listed(&self, id: &str) -> bool;

    /// Expire opportunities past their expiry timestamp. Returns the count
    /// newly expired.
    async fn expire_stale(&self) -> usize;

    /// Zero the per-day counters. Called by the daily reset job.
    async fn reset_daily_counters(&self);

    async fn stats(&self) -> EngineStats;
}

/// HTTP contract with the marketplace backend. Implemented over reqwest in
/// production and by in-memory fakes in tests.
#[async_trait]
pub trait MarketApi: Send + Sync {
    async fn create_listing(&self, req: &ListingRequest) -> Result<ListingReceipt>;

    async fn orders(&self) -> Result<Vec<Order>>;

    async fn active_listings(&self) -> Result<Vec<Listing>>;

    async fn payout_history(&self) -> Result<PayoutStats>;
}

/// A place the engine discovers candidate opportunities from.
///
/// Scraper-backed sources live outside this repository; the market crate
/// ships a JSON feed source and tests register static ones.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Produce candidate opportunities for one scan pass. Candidates are
    /// filtered against the scan thresholds by the engine, not the source.
    async fn discover(&self, params: &ScanParams) -> Result<Vec<Opportunity>>;
}
