//! In-memory engine and market fakes shared by the scheduler tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use flipforge_core::{
    EngineStats, Listing, ListingReceipt, ListingRequest, MarketApi, Opportunity,
    OpportunityEngine, OpportunityStatus, Order, PayoutStats, ScanParams,
};

pub fn opportunity(id: &str, score: f64) -> Opportunity {
    Opportunity {
        id: id.to_string(),
        title: format!("item {id}"),
        description: None,
        score,
        roi: 40.0,
        profit: 20.0,
        supplier_price: 30.0,
        supplier_url: "https://supplier.example/x".into(),
        supplier_platform: "aliexpress".into(),
        image_urls: vec![],
        status: OpportunityStatus::Found,
        found_at: Utc::now(),
        expires_at: None,
    }
}

#[derive(Default)]
pub struct FakeEngine {
    pub store: Mutex<Vec<Opportunity>>,
    pub scan_result: Mutex<Vec<Opportunity>>,
    pub last_params: Mutex<Option<ScanParams>>,
    pub fail_scan: AtomicBool,
    pub scan_delay: Mutex<Option<Duration>>,
    pub listed: Mutex<Vec<String>>,
    pub expire_result: AtomicUsize,
    pub resets: AtomicU64,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, opportunities: Vec<Opportunity>) {
        *self.store.lock().unwrap() = opportunities;
    }
}

#[async_trait]
impl OpportunityEngine for FakeEngine {
    async fn scan(&self, params: &ScanParams) -> Result<Vec<Opportunity>> {
        *self.last_params.lock().unwrap() = Some(params.clone());
        let delay = *self.scan_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_scan.load(Ordering::SeqCst) {
            bail!("engine scan exploded");
        }
        Ok(self.scan_result.lock().unwrap().clone())
    }

    async fn opportunities(
        &self,
        status: OpportunityStatus,
        min_score: f64,
        limit: usize,
    ) -> Vec<Opportunity> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.status == status && o.score >= min_score)
            .take(limit)
            .cloned()
            .collect()
    }

    async fn mark_listed(&self, id: &str) -> bool {
        let mut store = self.store.lock().unwrap();
        match store.iter_mut().find(|o| o.id == id) {
            Some(opp) => {
                opp.status = OpportunityStatus::Listed;
                self.listed.lock().unwrap().push(id.to_string());
                true
            }
            None => false,
        }
    }

    async fn expire_stale(&self) -> usize {
        self.expire_result.load(Ordering::SeqCst)
    }

    async fn reset_daily_counters(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    async fn stats(&self) -> EngineStats {
        let store = self.store.lock().unwrap();
        let mut stats = EngineStats::default();
        for opp in store.iter() {
            match opp.status {
                OpportunityStatus::Found => stats.tracked += 1,
                OpportunityStatus::Listed => stats.listed += 1,
                OpportunityStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }
}

#[derive(Default)]
pub struct FakeMarket {
    pub created: Mutex<Vec<ListingRequest>>,
    pub fail_for: Mutex<HashSet<String>>,
    pub unreachable: AtomicBool,
    pub orders: Mutex<Vec<Order>>,
    pub listings: Mutex<Vec<Listing>>,
    pub payouts: Mutex<PayoutStats>,
}

impl FakeMarket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_listing_for(&self, id: &str) {
        self.fail_for.lock().unwrap().insert(id.to_string());
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl MarketApi for FakeMarket {
    async fn create_listing(&self, req: &ListingRequest) -> Result<ListingReceipt> {
        self.check_reachable()?;
        if self.fail_for.lock().unwrap().contains(&req.opportunity_id) {
            bail!("marketplace rejected listing");
        }
        self.created.lock().unwrap().push(req.clone());
        Ok(ListingReceipt {
            id: format!("lst-{}", req.opportunity_id),
            status: Some("active".into()),
        })
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        self.check_reachable()?;
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn active_listings(&self) -> Result<Vec<Listing>> {
        self.check_reachable()?;
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn payout_history(&self) -> Result<PayoutStats> {
        self.check_reachable()?;
        Ok(self.payouts.lock().unwrap().clone())
    }
}
