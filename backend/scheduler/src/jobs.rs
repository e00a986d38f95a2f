//! The six job bodies.
//!
//! Each body is a thin orchestration step: all real work is delegated to the
//! opportunity engine or the marketplace backend. Bodies return a JSON
//! summary on success; errors propagate to the executor wrapper, which
//! records them on the job's run state.
//!
//! "Found nothing" and "upstream unreachable" both yield a zero/empty
//! summary; the distinction only survives in log lines and the `degraded`
//! marker on the run-log summary.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use flipforge_core::{
    market::ORDER_STATUS_PENDING, JobKind, ListingRequest, MarketApi, OpportunityEngine,
    OpportunityStatus, ScanParams,
};

use crate::run_log::RunLog;

/// Most opportunities listed in one pass.
const LISTING_BATCH_LIMIT: usize = 10;

/// Run-log rows older than this are pruned by the cleanup job.
const RUN_LOG_RETENTION_SECS: i64 = 30 * 24 * 3600;

/// Capabilities handed to a job body for one invocation. `params` is a
/// snapshot taken at trigger time; config updates apply to the next run.
pub struct JobContext {
    pub engine: Arc<dyn OpportunityEngine>,
    pub market: Arc<dyn MarketApi>,
    pub run_log: Arc<RunLog>,
    pub params: ScanParams,
}

/// Dispatch a trigger to its body. Exhaustive over `JobKind`, so a new kind
/// without a body is a compile error.
pub async fn run_job(kind: JobKind, ctx: &JobContext) -> Result<Value> {
    match kind {
        JobKind::OpportunityScan => opportunity_scan(ctx).await,
        JobKind::AutonomousListing => autonomous_listing(ctx).await,
        JobKind::OrderFulfillment => order_fulfillment(ctx).await,
        JobKind::Cleanup => cleanup(ctx).await,
        JobKind::DailyReset => daily_reset(ctx).await,
        JobKind::PayoutProcessing => payout_processing(ctx).await,
    }
}

async fn opportunity_scan(ctx: &JobContext) -> Result<Value> {
    let found = ctx.engine.scan(&ctx.params).await?;
    info!("[Jobs] Opportunity scan found {} above thresholds", found.len());
    Ok(json!({ "found": found.len() }))
}

async fn autonomous_listing(ctx: &JobContext) -> Result<Value> {
    let candidates = ctx
        .engine
        .opportunities(
            OpportunityStatus::Found,
            ctx.params.min_score,
            LISTING_BATCH_LIMIT,
        )
        .await;

    if candidates.is_empty() {
        debug!("[Jobs] No opportunities ready to list");
        return Ok(json!({ "listed": 0 }));
    }

    let mut failed = 0usize;
    for opp in &candidates {
        let request = ListingRequest::from_opportunity(opp, ctx.params.markup_percent);
        match ctx.market.create_listing(&request).await {
            Ok(receipt) => {
                ctx.engine.mark_listed(&opp.id).await;
                info!("[Jobs] Listed {} as marketplace listing {}", opp.id, receipt.id);
            }
            // One rejected listing must not abort the batch.
            Err(e) => {
                failed += 1;
                warn!("[Jobs] Listing failed for {}: {e:#}", opp.id);
            }
        }
    }

    // The reported count is opportunities attempted, not listings created.
    Ok(json!({ "listed": candidates.len(), "failed": failed }))
}

async fn order_fulfillment(ctx: &JobContext) -> Result<Value> {
    match ctx.market.orders().await {
        Ok(orders) => {
            let pending = orders
                .iter()
                .filter(|o| o.status == ORDER_STATUS_PENDING)
                .count();
            info!("[Jobs] {} orders pending fulfillment", pending);
            Ok(json!({ "pending": pending }))
        }
        Err(e) => {
            warn!("[Jobs] Order fetch failed, reporting zero pending: {e:#}");
            Ok(json!({ "pending": 0, "degraded": true }))
        }
    }
}

async fn cleanup(ctx: &JobContext) -> Result<Value> {
    let expired = ctx.engine.expire_stale().await;
    let mut summary = json!({ "expired": expired });

    match ctx.market.active_listings().await {
        Ok(listings) => {
            let now = Utc::now();
            let lapsed = listings
                .iter()
                .filter(|l| matches!(l.expires_at, Some(at) if at < now))
                .count();
            info!(
                "[Jobs] Cleanup: {} opportunities expired, {} active listings past expiry",
                expired, lapsed
            );
            summary["listingsPastExpiry"] = json!(lapsed);
        }
        Err(e) => {
            warn!("[Jobs] Listing fetch failed during cleanup: {e:#}");
            summary["degraded"] = json!(true);
        }
    }

    match ctx.run_log.prune(RUN_LOG_RETENTION_SECS) {
        Ok(n) if n > 0 => debug!("[Jobs] Pruned {} old run-log rows", n),
        Ok(_) => {}
        Err(e) => warn!("[Jobs] Run-log prune failed: {e:#}"),
    }

    Ok(summary)
}

async fn daily_reset(ctx: &JobContext) -> Result<Value> {
    let stats = ctx.engine.stats().await;
    ctx.engine.reset_daily_counters().await;
    info!(
        "[Jobs] Daily reset: tracked {}, listed {}, expired {}, scans {}, spend {:.2}",
        stats.tracked, stats.listed, stats.expired, stats.scans_today, stats.spend_today
    );
    Ok(json!({ "reset": true, "stats": stats }))
}

async fn payout_processing(ctx: &JobContext) -> Result<Value> {
    match ctx.market.payout_history().await {
        Ok(stats) => {
            info!(
                "[Jobs] Payouts: total paid {:.2}, pending {:.2} across {} payouts",
                stats.total_paid, stats.pending, stats.count
            );
            Ok(json!({
                "processed": stats.count,
                "totalPaid": stats.total_paid,
                "pending": stats.pending,
            }))
        }
        Err(e) => {
            warn!("[Jobs] Payout fetch failed, reporting zero processed: {e:#}");
            Ok(json!({ "processed": 0, "degraded": true }))
        }
    }
}
