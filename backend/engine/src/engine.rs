use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use flipforge_core::{
    EngineStats, Opportunity, OpportunityEngine, OpportunitySource, OpportunityStatus, ScanParams,
};

#[derive(Default)]
struct EngineState {
    opportunities: Vec<Opportunity>,
    scans_today: u64,
    listings_today: u64,
    spend_today: f64,
}

/// In-process opportunity engine.
///
/// Holds every opportunity the sources have surfaced, filters scan candidates
/// against the current thresholds, and tracks per-day counters that the
/// daily reset job zeroes at midnight.
pub struct ArbitrageEngine {
    sources: RwLock<Vec<Arc<dyn OpportunitySource>>>,
    state: RwLock<EngineState>,
}

impl ArbitrageEngine {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Register a candidate source. Sources are queried in registration order
    /// on every scan pass.
    pub async fn register_source(&self, source: Arc<dyn OpportunitySource>) {
        info!(source = %source.name(), "Registered opportunity source");
        self.sources.write().await.push(source);
    }

    /// Whether a candidate clears the scan thresholds.
    fn accepts(params: &ScanParams, opp: &Opportunity) -> bool {
        opp.score >= params.min_score
            && opp.roi >= params.min_roi
            && opp.profit >= params.min_profit
            && opp.supplier_price <= params.max_price
    }
}

impl Default for ArbitrageEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpportunityEngine for ArbitrageEngine {
    async fn scan(&self, params: &ScanParams) -> Result<Vec<Opportunity>> {
        let sources = self.sources.read().await.clone();

        let mut candidates = Vec::new();
        for source in &sources {
            match source.discover(params).await {
                Ok(found) => {
                    debug!(
                        source = %source.name(),
                        count = found.len(),
                        "Source returned candidates"
                    );
                    candidates.extend(found);
                }
                // One misbehaving source must not abort the pass.
                Err(e) => {
                    warn!(source = %source.name(), error = %e, "Source failed during scan");
                }
            }
        }

        let mut state = self.state.write().await;
        state.scans_today += 1;

        let mut accepted = Vec::new();
        for mut opp in candidates {
            if !Self::accepts(params, &opp) {
                continue;
            }
            if state.opportunities.iter().any(|o| o.id == opp.id) {
                continue;
            }
            if params.auto_buy {
                if state.spend_today + opp.supplier_price > params.daily_budget {
                    debug!(id = %opp.id, "Daily budget reached, skipping candidate");
                    continue;
                }
                state.spend_today += opp.supplier_price;
            }
            opp.status = OpportunityStatus::Found;
            state.opportunities.push(opp.clone());
            accepted.push(opp);
        }

        Ok(accepted)
    }

    async fn opportunities(
        &self,
        status: OpportunityStatus,
        min_score: f64,
        limit: usize,
    ) -> Vec<Opportunity> {
        let state = self.state.read().await;
        state
            .opportunities
            .iter()
            .filter(|o| o.status == status && o.score >= min_score)
            .take(limit)
            .cloned()
            .collect()
    }

    async fn mark_listed(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        match state.opportunities.iter_mut().find(|o| o.id == id) {
            Some(opp) => {
                opp.status = OpportunityStatus::Listed;
                state.listings_today += 1;
                true
            }
            None => false,
        }
    }

    async fn expire_stale(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut expired = 0;
        for opp in &mut state.opportunities {
            if opp.status != OpportunityStatus::Found {
                continue;
            }
            if matches!(opp.expires_at, Some(at) if at < now) {
                opp.status = OpportunityStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            info!(count = expired, "Expired stale opportunities");
        }
        expired
    }

    async fn reset_daily_counters(&self) {
        let mut state = self.state.write().await;
        state.scans_today = 0;
        state.listings_today = 0;
        state.spend_today = 0.0;
    }

    async fn stats(&self) -> EngineStats {
        let state = self.state.read().await;
        let mut stats = EngineStats {
            scans_today: state.scans_today,
            listings_today: state.listings_today,
            spend_today: state.spend_today,
            ..Default::default()
        };
        for opp in &state.opportunities {
            match opp.status {
                OpportunityStatus::Found => stats.tracked += 1,
                OpportunityStatus::Listed => stats.listed += 1,
                OpportunityStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Source returning a fixed candidate batch.
    struct StaticSource {
        candidates: Vec<Opportunity>,
    }

    #[async_trait]
    impl OpportunitySource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn discover(&self, _params: &ScanParams) -> Result<Vec<Opportunity>> {
            Ok(self.candidates.clone())
        }
    }

    /// Source that always fails, for isolation tests.
    struct BrokenSource;

    #[async_trait]
    impl OpportunitySource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn discover(&self, _params: &ScanParams) -> Result<Vec<Opportunity>> {
            anyhow::bail!("upstream unreachable")
        }
    }

    fn opportunity(id: &str, score: f64, roi: f64, profit: f64, price: f64) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            title: format!("item {id}"),
            description: None,
            score,
            roi,
            profit,
            supplier_price: price,
            supplier_url: "https://supplier.example/x".into(),
            supplier_platform: "aliexpress".into(),
            image_urls: vec![],
            status: OpportunityStatus::Found,
            found_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn scan_filters_below_threshold_candidates() {
        let engine = ArbitrageEngine::new();
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![
                    opportunity("good", 80.0, 30.0, 15.0, 50.0),
                    opportunity("low-score", 40.0, 30.0, 15.0, 50.0),
                    opportunity("low-roi", 80.0, 5.0, 15.0, 50.0),
                    opportunity("too-expensive", 80.0, 30.0, 15.0, 900.0),
                ],
            }))
            .await;

        let accepted = engine.scan(&ScanParams::default()).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, "good");
    }

    #[tokio::test]
    async fn scan_deduplicates_across_passes() {
        let engine = ArbitrageEngine::new();
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![opportunity("dup", 90.0, 40.0, 20.0, 30.0)],
            }))
            .await;

        let first = engine.scan(&ScanParams::default()).await.unwrap();
        let second = engine.scan(&ScanParams::default()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(engine.stats().await.scans_today, 2);
    }

    #[tokio::test]
    async fn failing_source_does_not_abort_scan() {
        let engine = ArbitrageEngine::new();
        engine.register_source(Arc::new(BrokenSource)).await;
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![opportunity("ok", 90.0, 40.0, 20.0, 30.0)],
            }))
            .await;

        let accepted = engine.scan(&ScanParams::default()).await.unwrap();
        assert_eq!(accepted.len(), 1);
    }

    #[tokio::test]
    async fn auto_buy_respects_daily_budget() {
        let engine = ArbitrageEngine::new();
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![
                    opportunity("a", 90.0, 40.0, 20.0, 150.0),
                    opportunity("b", 90.0, 40.0, 20.0, 150.0),
                ],
            }))
            .await;

        let params = ScanParams {
            auto_buy: true,
            daily_budget: 200.0,
            ..Default::default()
        };
        let accepted = engine.scan(&params).await.unwrap();
        assert_eq!(accepted.len(), 1, "second candidate exceeds the budget");
        assert_eq!(engine.stats().await.spend_today, 150.0);

        engine.reset_daily_counters().await;
        assert_eq!(engine.stats().await.spend_today, 0.0);
    }

    #[tokio::test]
    async fn expire_stale_flips_only_found_past_expiry() {
        let engine = ArbitrageEngine::new();
        let mut fresh = opportunity("fresh", 90.0, 40.0, 20.0, 30.0);
        fresh.expires_at = Some(Utc::now() + Duration::hours(2));
        let mut stale = opportunity("stale", 90.0, 40.0, 20.0, 30.0);
        stale.expires_at = Some(Utc::now() - Duration::hours(2));
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![fresh, stale],
            }))
            .await;
        engine.scan(&ScanParams::default()).await.unwrap();

        assert_eq!(engine.expire_stale().await, 1);
        let stats = engine.stats().await;
        assert_eq!(stats.tracked, 1);
        assert_eq!(stats.expired, 1);
        // second sweep finds nothing new
        assert_eq!(engine.expire_stale().await, 0);
    }

    #[tokio::test]
    async fn mark_listed_moves_status_and_counts() {
        let engine = ArbitrageEngine::new();
        engine
            .register_source(Arc::new(StaticSource {
                candidates: vec![opportunity("sell-me", 90.0, 40.0, 20.0, 30.0)],
            }))
            .await;
        engine.scan(&ScanParams::default()).await.unwrap();

        assert!(engine.mark_listed("sell-me").await);
        assert!(!engine.mark_listed("missing").await);

        let listed = engine
            .opportunities(OpportunityStatus::Listed, 0.0, 10)
            .await;
        assert_eq!(listed.len(), 1);
        assert_eq!(engine.stats().await.listings_today, 1);
    }
}
