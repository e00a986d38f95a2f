//! Marketplace backend API client.
//!
//! Plain JSON over HTTP against the co-deployed backend; no auth token at
//! this layer. Errors surface as `anyhow` errors so job bodies decide how to
//! degrade.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use flipforge_core::{Listing, ListingReceipt, ListingRequest, MarketApi, Order, PayoutStats};

pub struct MarketClient {
    base_url: String,
    http: Client,
}

impl MarketClient {
    /// `base_url` without a trailing slash, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Some backend deployments wrap list responses in `{ "items": [...] }`,
/// others return a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Wrapped { items: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped { items } => items,
            ListEnvelope::Bare(items) => items,
        }
    }
}

#[async_trait]
impl MarketApi for MarketClient {
    async fn create_listing(&self, req: &ListingRequest) -> Result<ListingReceipt> {
        let url = self.url("/api/marketplace/list");
        debug!(opportunity = %req.opportunity_id, "POST {url}");
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .context("marketplace list request failed")?;
        let resp = resp
            .error_for_status()
            .context("marketplace rejected listing")?;
        resp.json().await.context("invalid listing response")
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let url = self.url("/api/marketplace/orders");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("orders request failed")?
            .error_for_status()
            .context("orders request rejected")?;
        let envelope: ListEnvelope<Order> =
            resp.json().await.context("invalid orders response")?;
        Ok(envelope.into_items())
    }

    async fn active_listings(&self) -> Result<Vec<Listing>> {
        let url = self.url("/api/marketplace/listings");
        let resp = self
            .http
            .get(&url)
            .query(&[("status", "active")])
            .send()
            .await
            .context("listings request failed")?
            .error_for_status()
            .context("listings request rejected")?;
        let envelope: ListEnvelope<Listing> =
            resp.json().await.context("invalid listings response")?;
        Ok(envelope.into_items())
    }

    async fn payout_history(&self) -> Result<PayoutStats> {
        let url = self.url("/api/payout/history");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("payout request failed")?
            .error_for_status()
            .context("payout request rejected")?;
        resp.json().await.context("invalid payout response")
    }
}
