//! Wire types for the co-deployed marketplace backend API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Opportunity;

/// Body of `POST /api/marketplace/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRequest {
    pub opportunity_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub supplier_price: f64,
    pub supplier_url: String,
    pub supplier_platform: String,
    pub markup_percent: f64,
}

impl ListingRequest {
    /// Build a listing request from a tracked opportunity, carrying its
    /// supplier fields through unchanged.
    pub fn from_opportunity(opp: &Opportunity, markup_percent: f64) -> Self {
        Self {
            opportunity_id: opp.id.clone(),
            title: opp.title.clone(),
            description: opp.description.clone(),
            image_urls: opp.image_urls.clone(),
            supplier_price: opp.supplier_price,
            supplier_url: opp.supplier_url.clone(),
            supplier_platform: opp.supplier_platform.clone(),
            markup_percent,
        }
    }
}

/// Response of a successful listing creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingReceipt {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// One marketplace order, as returned by `GET /api/marketplace/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Orders with this status are awaiting a supplier purchase.
pub const ORDER_STATUS_PENDING: &str = "pending";

/// One active listing, as returned by `GET /api/marketplace/listings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate payout figures from `GET /api/payout/history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStats {
    pub total_paid: f64,
    pub pending: f64,
    pub count: u64,
}
