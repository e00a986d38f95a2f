//! Supplier feed source.
//!
//! Fetches candidate opportunities from a JSON feed URL. Actual scraping
//! lives outside this repository; a feed endpoint is the thinnest contract
//! that lets the engine see real candidates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use flipforge_core::{Opportunity, OpportunitySource, OpportunityStatus, ScanParams};

/// How long a feed candidate without an explicit expiry stays eligible.
const DEFAULT_TTL_HOURS: i64 = 48;

/// One candidate row in the feed document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedCandidate {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    score: f64,
    roi: f64,
    profit: f64,
    supplier_price: f64,
    supplier_url: String,
    supplier_platform: String,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl FeedCandidate {
    fn into_opportunity(self, now: DateTime<Utc>) -> Opportunity {
        let expires_at = self
            .expires_at
            .or_else(|| Some(now + Duration::hours(DEFAULT_TTL_HOURS)));
        Opportunity {
            id: self.id,
            title: self.title,
            description: self.description,
            score: self.score,
            roi: self.roi,
            profit: self.profit,
            supplier_price: self.supplier_price,
            supplier_url: self.supplier_url,
            supplier_platform: self.supplier_platform,
            image_urls: self.image_urls,
            status: OpportunityStatus::Found,
            found_at: now,
            expires_at,
        }
    }
}

pub struct FeedSource {
    url: String,
    http: Client,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: Client::new(),
        }
    }

    fn parse(body: &str, now: DateTime<Utc>) -> Result<Vec<Opportunity>> {
        let candidates: Vec<FeedCandidate> =
            serde_json::from_str(body).context("invalid feed document")?;
        Ok(candidates
            .into_iter()
            .map(|c| c.into_opportunity(now))
            .collect())
    }
}

#[async_trait]
impl OpportunitySource for FeedSource {
    fn name(&self) -> &str {
        "supplier-feed"
    }

    async fn discover(&self, _params: &ScanParams) -> Result<Vec<Opportunity>> {
        let body = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("feed request failed")?
            .error_for_status()
            .context("feed request rejected")?
            .text()
            .await
            .context("feed body unreadable")?;
        let opportunities = Self::parse(&body, Utc::now())?;
        debug!(count = opportunities.len(), url = %self.url, "Feed candidates fetched");
        Ok(opportunities)
    }
}
