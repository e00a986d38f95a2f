//! The cron scheduler.
//!
//! Owns the registry of six recurring jobs, one independent timer task per
//! enabled job, and the executor wrapper that tracks per-job run state.
//! Timers and `run_job_now` emit the same internal trigger event, so status
//! tracking applies identically to scheduled and manual fires.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use flipforge_core::{
    FlipError, JobDescriptor, JobKind, JobRunState, JobStatus, MarketApi, OpportunityEngine,
    ScanParams, ScanParamsPatch, SchedulerConfig,
};

use crate::jobs::{self, JobContext};
use crate::run_log::{RunLog, RunRecord};

/// Point-in-time view of one job, as reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub name: &'static str,
    pub description: &'static str,
    pub schedule: &'static str,
    pub enabled: bool,
    /// Whether the job's cron timer is currently live.
    pub active: bool,
    #[serde(flatten)]
    pub state: JobRunState,
}

/// Eventually-consistent snapshot of the whole registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_initialized: bool,
    pub jobs: Vec<JobSnapshot>,
    /// Friendly cadence label per job name.
    pub schedules: BTreeMap<&'static str, &'static str>,
}

struct JobEntry {
    descriptor: JobDescriptor,
    state: JobRunState,
    timer: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn timer_active(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

#[derive(Default)]
struct Registry {
    initialized: bool,
    entries: HashMap<JobKind, JobEntry>,
}

#[derive(Debug, Clone, Copy)]
struct Trigger {
    kind: JobKind,
    manual: bool,
}

struct Inner {
    engine: Arc<dyn OpportunityEngine>,
    market: Arc<dyn MarketApi>,
    run_log: Arc<RunLog>,
    config: SchedulerConfig,
    scan_params: RwLock<ScanParams>,
    registry: RwLock<Registry>,
    trigger_tx: mpsc::Sender<Trigger>,
}

/// What one trigger amounted to. The dispatch loop owns the decision of how
/// loudly to report each case.
enum RunOutcome {
    Completed(Value),
    /// Dropped because the previous run of the same job was still going.
    Skipped,
    Failed(String),
}

pub struct CronScheduler {
    inner: Arc<Inner>,
}

impl CronScheduler {
    pub fn new(
        engine: Arc<dyn OpportunityEngine>,
        market: Arc<dyn MarketApi>,
        run_log: Arc<RunLog>,
        config: SchedulerConfig,
        params: ScanParams,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(32);
        let inner = Arc::new(Inner {
            engine,
            market,
            run_log,
            config,
            scan_params: RwLock::new(params),
            registry: RwLock::new(Registry::default()),
            trigger_tx,
        });
        tokio::spawn(dispatch_loop(Arc::clone(&inner), trigger_rx));
        Self { inner }
    }

    /// Register all six jobs. Idempotent: a second call warns and leaves the
    /// registry untouched. Must be called before `start`.
    pub async fn initialize(&self) {
        let mut registry = self.inner.registry.write().await;
        if registry.initialized {
            warn!("[Scheduler] initialize called twice, registry unchanged");
            return;
        }
        for kind in JobKind::all() {
            let enabled = self.inner.config.enabled_for(kind);
            registry.entries.insert(
                kind,
                JobEntry {
                    descriptor: JobDescriptor::new(kind, enabled),
                    state: JobRunState::default(),
                    timer: None,
                },
            );
            info!(
                job = kind.name(),
                schedule = kind.schedule(),
                enabled,
                "Registered job"
            );
        }
        registry.initialized = true;
        info!("[Scheduler] {} jobs registered", registry.entries.len());
    }

    /// Activate a cron timer for every enabled job. Disabled jobs stay
    /// registered but inert.
    pub async fn start(&self) -> Result<(), FlipError> {
        let mut registry = self.inner.registry.write().await;
        if !registry.initialized {
            return Err(FlipError::NotInitialized);
        }
        let mut started = 0;
        for kind in JobKind::all() {
            let Some(entry) = registry.entries.get_mut(&kind) else {
                continue;
            };
            if !entry.descriptor.enabled || entry.timer_active() {
                continue;
            }
            entry.timer = Some(spawn_timer(Arc::clone(&self.inner), kind));
            started += 1;
        }
        info!("[Scheduler] Started {} job timers", started);
        Ok(())
    }

    /// Deactivate every job's timer unconditionally. In-flight job bodies
    /// are neither cancelled nor awaited; run states are untouched.
    pub async fn stop(&self) {
        let mut registry = self.inner.registry.write().await;
        for entry in registry.entries.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
        info!("[Scheduler] All job timers stopped");
    }

    /// Enable one job and start its timer. Returns false for unknown names.
    pub async fn enable_job(&self, name: &str) -> bool {
        let Ok(kind) = name.parse::<JobKind>() else {
            return false;
        };
        let mut registry = self.inner.registry.write().await;
        let Some(entry) = registry.entries.get_mut(&kind) else {
            return false;
        };
        entry.descriptor.enabled = true;
        if !entry.timer_active() {
            entry.timer = Some(spawn_timer(Arc::clone(&self.inner), kind));
        }
        info!(job = name, "Job enabled");
        true
    }

    /// Disable one job and stop its timer. Returns false for unknown names.
    pub async fn disable_job(&self, name: &str) -> bool {
        let Ok(kind) = name.parse::<JobKind>() else {
            return false;
        };
        let mut registry = self.inner.registry.write().await;
        let Some(entry) = registry.entries.get_mut(&kind) else {
            return false;
        };
        entry.descriptor.enabled = false;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        info!(job = name, "Job disabled");
        true
    }

    /// Fire a job immediately, bypassing its schedule. The trigger goes
    /// through the normal dispatch path, so run-state tracking applies.
    pub async fn run_job_now(&self, name: &str) -> Result<DateTime<Utc>, FlipError> {
        let kind = name
            .parse::<JobKind>()
            .map_err(|_| FlipError::JobNotFound(name.to_string()))?;
        {
            let registry = self.inner.registry.read().await;
            if !registry.entries.contains_key(&kind) {
                return Err(FlipError::JobNotFound(name.to_string()));
            }
        }
        self.inner
            .trigger_tx
            .send(Trigger { kind, manual: true })
            .await
            .map_err(|_| FlipError::Other(anyhow!("trigger channel closed")))?;
        Ok(Utc::now())
    }

    /// Shallow snapshot of every job's descriptor and run state. Safe to
    /// call while jobs run; a mid-run snapshot sees `running` with the
    /// current attempt's `last_run`.
    pub async fn status(&self) -> SchedulerStatus {
        let registry = self.inner.registry.read().await;
        let mut jobs = Vec::with_capacity(registry.entries.len());
        let mut schedules = BTreeMap::new();
        for kind in JobKind::all() {
            if let Some(entry) = registry.entries.get(&kind) {
                schedules.insert(kind.name(), kind.cadence());
                jobs.push(JobSnapshot {
                    name: entry.descriptor.name,
                    description: entry.descriptor.description,
                    schedule: entry.descriptor.schedule,
                    enabled: entry.descriptor.enabled,
                    active: entry.timer_active(),
                    state: entry.state.clone(),
                });
            }
        }
        SchedulerStatus {
            is_initialized: registry.initialized,
            jobs,
            schedules,
        }
    }

    /// Merge a partial scan-parameter update. Takes effect on the next
    /// triggered scan, not retroactively.
    pub async fn update_config(&self, patch: &ScanParamsPatch) -> ScanParams {
        let mut params = self.inner.scan_params.write().await;
        params.apply(patch);
        info!(
            min_score = params.min_score,
            min_roi = params.min_roi,
            min_profit = params.min_profit,
            max_price = params.max_price,
            auto_buy = params.auto_buy,
            "Scan parameters updated"
        );
        params.clone()
    }

    pub async fn scan_params(&self) -> ScanParams {
        self.inner.scan_params.read().await.clone()
    }

    /// Recent run-log rows for one job, newest first.
    pub async fn recent_runs(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, FlipError> {
        let kind = name
            .parse::<JobKind>()
            .map_err(|_| FlipError::JobNotFound(name.to_string()))?;
        {
            let registry = self.inner.registry.read().await;
            if !registry.entries.contains_key(&kind) {
                return Err(FlipError::JobNotFound(name.to_string()));
            }
        }
        Ok(self.inner.run_log.recent(kind.name(), limit)?)
    }
}

/// The `cron` crate wants a seconds field; the job schedules are five-field
/// expressions, so fires land on second zero.
fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(&format!("0 {expr}")).map_err(|e| anyhow!("invalid cron expression: {e}"))
}

/// One independent timer per job: sleep until the next cron fire, emit a
/// trigger, repeat. Aborted by `stop`/`disable_job`.
fn spawn_timer(inner: Arc<Inner>, kind: JobKind) -> JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = match parse_schedule(kind.schedule()) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    job = kind.name(),
                    error = %e,
                    "Invalid cron expression, timer not started"
                );
                return;
            }
        };
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                break;
            };
            let until = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(60));
            tokio::time::sleep(until).await;
            if inner
                .trigger_tx
                .send(Trigger {
                    kind,
                    manual: false,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

/// Receives every trigger (scheduled or manual) and spawns its execution so
/// jobs interleave freely. A failing job is recorded and logged, never
/// allowed to destabilize the loop or other jobs.
async fn dispatch_loop(inner: Arc<Inner>, mut rx: mpsc::Receiver<Trigger>) {
    while let Some(trigger) = rx.recv().await {
        debug!(
            job = trigger.kind.name(),
            manual = trigger.manual,
            "Trigger received"
        );
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            match execute(&inner, trigger.kind).await {
                RunOutcome::Completed(_) | RunOutcome::Skipped => {}
                RunOutcome::Failed(message) => {
                    error!(job = trigger.kind.name(), error = %message, "Job run failed");
                }
            }
        });
    }
}

/// The executor wrapper: run-state bookkeeping around one job body.
async fn execute(inner: &Inner, kind: JobKind) -> RunOutcome {
    let name = kind.name();

    {
        let mut registry = inner.registry.write().await;
        let Some(entry) = registry.entries.get_mut(&kind) else {
            return RunOutcome::Failed(format!("job not registered: {name}"));
        };
        if entry.state.status == JobStatus::Running {
            warn!("[Scheduler] {} still running, skipping overlapping trigger", name);
            record_or_warn(&inner.run_log, RunRecord::skipped(name));
            return RunOutcome::Skipped;
        }
        entry.state.last_run = Some(Utc::now());
        entry.state.run_count += 1;
        entry.state.status = JobStatus::Running;
    }

    let ctx = JobContext {
        engine: Arc::clone(&inner.engine),
        market: Arc::clone(&inner.market),
        run_log: Arc::clone(&inner.run_log),
        params: inner.scan_params.read().await.clone(),
    };
    let result = jobs::run_job(kind, &ctx).await;

    let mut registry = inner.registry.write().await;
    let Some(entry) = registry.entries.get_mut(&kind) else {
        return RunOutcome::Failed(format!("job vanished mid-run: {name}"));
    };
    match result {
        Ok(summary) => {
            entry.state.status = JobStatus::Idle;
            entry.state.last_error = None;
            record_or_warn(&inner.run_log, RunRecord::ok(name, &summary));
            debug!(job = name, %summary, "Job completed");
            RunOutcome::Completed(summary)
        }
        Err(e) => {
            let message = format!("{e:#}");
            entry.state.status = JobStatus::Error;
            entry.state.last_error = Some(message.clone());
            record_or_warn(&inner.run_log, RunRecord::error(name, &message));
            RunOutcome::Failed(message)
        }
    }
}

/// A run-log write failure must not fail the job.
fn record_or_warn(run_log: &RunLog, record: RunRecord) {
    if let Err(e) = run_log.record(&record) {
        warn!("[RunLog] Failed to record run: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::{opportunity, FakeEngine, FakeMarket};
    use std::sync::atomic::Ordering;

    fn scheduler_with(engine: Arc<FakeEngine>, market: Arc<FakeMarket>) -> CronScheduler {
        CronScheduler::new(
            engine,
            market,
            Arc::new(RunLog::in_memory().unwrap()),
            SchedulerConfig::default(),
            ScanParams::default(),
        )
    }

    fn scheduler() -> CronScheduler {
        scheduler_with(FakeEngine::new(), FakeMarket::new())
    }

    /// Poll the status snapshot until the predicate holds.
    async fn wait_for(
        scheduler: &CronScheduler,
        predicate: impl Fn(&SchedulerStatus) -> bool,
    ) -> SchedulerStatus {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = scheduler.status().await;
                if predicate(&status) {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    fn job<'a>(status: &'a SchedulerStatus, name: &str) -> &'a JobSnapshot {
        status.jobs.iter().find(|j| j.name == name).unwrap()
    }

    #[tokio::test]
    async fn initialize_registers_six_idle_jobs() {
        let scheduler = scheduler();
        scheduler.initialize().await;

        let status = scheduler.status().await;
        assert!(status.is_initialized);
        assert_eq!(status.jobs.len(), 6);
        for snapshot in &status.jobs {
            assert_eq!(snapshot.state.run_count, 0);
            assert_eq!(snapshot.state.status, JobStatus::Idle);
            assert!(snapshot.state.last_run.is_none());
        }
        assert_eq!(
            status.schedules.get("opportunity-scan"),
            Some(&"every 15 minutes")
        );
    }

    #[tokio::test]
    async fn initialize_twice_does_not_duplicate() {
        let scheduler = scheduler();
        scheduler.initialize().await;
        scheduler.initialize().await;
        assert_eq!(scheduler.status().await.jobs.len(), 6);
    }

    #[tokio::test]
    async fn unknown_names_return_false_and_mutate_nothing() {
        let scheduler = scheduler();
        scheduler.initialize().await;
        let before = scheduler.status().await;

        assert!(!scheduler.enable_job("nonexistent").await);
        assert!(!scheduler.disable_job("nonexistent").await);

        let after = scheduler.status().await;
        for (b, a) in before.jobs.iter().zip(after.jobs.iter()) {
            assert_eq!(b.enabled, a.enabled);
            assert_eq!(b.state.run_count, a.state.run_count);
        }
    }

    #[tokio::test]
    async fn run_job_now_increments_only_that_job() {
        let scheduler = scheduler();
        scheduler.initialize().await;

        scheduler.run_job_now("opportunity-scan").await.unwrap();

        let status = wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.run_count == 1
                && job(s, "opportunity-scan").state.status == JobStatus::Idle
        })
        .await;
        for snapshot in status.jobs.iter().filter(|j| j.name != "opportunity-scan") {
            assert_eq!(snapshot.state.run_count, 0);
        }
    }

    #[tokio::test]
    async fn run_job_now_unknown_name_is_not_found() {
        let scheduler = scheduler();
        scheduler.initialize().await;
        let err = scheduler.run_job_now("no-such-job").await.unwrap_err();
        assert!(matches!(err, FlipError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn failing_body_records_error_then_recovers() {
        let engine = FakeEngine::new();
        let scheduler = scheduler_with(Arc::clone(&engine), FakeMarket::new());
        scheduler.initialize().await;

        engine.fail_scan.store(true, Ordering::SeqCst);
        scheduler.run_job_now("opportunity-scan").await.unwrap();
        let status = wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.status == JobStatus::Error
        })
        .await;
        let snapshot = job(&status, "opportunity-scan");
        assert_eq!(snapshot.state.run_count, 1);
        let message = snapshot.state.last_error.clone().unwrap();
        assert!(message.contains("engine scan exploded"));

        engine.fail_scan.store(false, Ordering::SeqCst);
        scheduler.run_job_now("opportunity-scan").await.unwrap();
        let status = wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.run_count == 2
                && job(s, "opportunity-scan").state.status == JobStatus::Idle
        })
        .await;
        assert!(job(&status, "opportunity-scan").state.last_error.is_none());
    }

    #[tokio::test]
    async fn start_requires_initialize() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.start().await,
            Err(FlipError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn stop_suppresses_timers_but_keeps_state() {
        let scheduler = scheduler();
        scheduler.initialize().await;
        scheduler.start().await.unwrap();

        let status = scheduler.status().await;
        assert!(status.jobs.iter().all(|j| j.active));

        scheduler.run_job_now("cleanup").await.unwrap();
        wait_for(&scheduler, |s| job(s, "cleanup").state.run_count == 1).await;

        scheduler.stop().await;
        let status = scheduler.status().await;
        assert!(status.jobs.iter().all(|j| !j.active));
        assert_eq!(job(&status, "cleanup").state.run_count, 1);
        assert_eq!(job(&status, "cleanup").state.status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn disabled_job_is_registered_but_inert() {
        let engine = FakeEngine::new();
        let market = FakeMarket::new();
        let scheduler = CronScheduler::new(
            engine,
            market,
            Arc::new(RunLog::in_memory().unwrap()),
            SchedulerConfig {
                listing: false,
                ..Default::default()
            },
            ScanParams::default(),
        );
        scheduler.initialize().await;
        scheduler.start().await.unwrap();

        let status = scheduler.status().await;
        let listing = job(&status, "autonomous-listing");
        assert!(!listing.enabled);
        assert!(!listing.active);
        assert!(job(&status, "opportunity-scan").active);

        // enable starts its timer; disable stops it again
        assert!(scheduler.enable_job("autonomous-listing").await);
        let status = scheduler.status().await;
        assert!(job(&status, "autonomous-listing").active);
        assert!(scheduler.disable_job("autonomous-listing").await);
        let status = scheduler.status().await;
        assert!(!job(&status, "autonomous-listing").active);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let engine = FakeEngine::new();
        *engine.scan_delay.lock().unwrap() = Some(Duration::from_millis(300));
        let scheduler = scheduler_with(Arc::clone(&engine), FakeMarket::new());
        scheduler.initialize().await;

        scheduler.run_job_now("opportunity-scan").await.unwrap();
        wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.status == JobStatus::Running
        })
        .await;
        scheduler.run_job_now("opportunity-scan").await.unwrap();

        let status = wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.status == JobStatus::Idle
        })
        .await;
        assert_eq!(job(&status, "opportunity-scan").state.run_count, 1);

        // the skipped row is written by a separate task; poll for it
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let runs = scheduler.recent_runs("opportunity-scan", 10).await.unwrap();
                if runs.iter().any(|r| r.outcome == "skipped")
                    && runs.iter().any(|r| r.outcome == "ok")
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("skipped run not recorded in time");
    }

    #[tokio::test]
    async fn update_config_reaches_the_next_scan() {
        let engine = FakeEngine::new();
        let scheduler = scheduler_with(Arc::clone(&engine), FakeMarket::new());
        scheduler.initialize().await;

        let updated = scheduler
            .update_config(&ScanParamsPatch {
                min_score: Some(70.0),
                min_roi: Some(20.0),
                min_profit: Some(10.0),
                max_price: Some(200.0),
                ..Default::default()
            })
            .await;
        assert_eq!(updated.min_score, 70.0);

        scheduler.run_job_now("opportunity-scan").await.unwrap();
        wait_for(&scheduler, |s| {
            job(s, "opportunity-scan").state.run_count == 1
                && job(s, "opportunity-scan").state.status == JobStatus::Idle
        })
        .await;

        let seen = engine.last_params.lock().unwrap().clone().unwrap();
        assert_eq!(seen.min_score, 70.0);
        assert_eq!(seen.min_roi, 20.0);
        assert_eq!(seen.min_profit, 10.0);
        assert_eq!(seen.max_price, 200.0);
    }

    #[tokio::test]
    async fn listing_batch_failure_still_ends_idle() {
        let engine = FakeEngine::new();
        engine.seed(vec![
            opportunity("a", 90.0),
            opportunity("b", 90.0),
            opportunity("c", 90.0),
        ]);
        let market = FakeMarket::new();
        market.fail_listing_for("b");
        let scheduler = scheduler_with(engine, market);
        scheduler.initialize().await;

        scheduler.run_job_now("autonomous-listing").await.unwrap();
        let status = wait_for(&scheduler, |s| {
            job(s, "autonomous-listing").state.run_count == 1
                && job(s, "autonomous-listing").state.status == JobStatus::Idle
        })
        .await;
        assert!(job(&status, "autonomous-listing").state.last_error.is_none());

        let runs = scheduler.recent_runs("autonomous-listing", 5).await.unwrap();
        assert_eq!(runs[0].outcome, "ok");
        assert!(runs[0].summary.as_deref().unwrap().contains("\"listed\":3"));
    }

    #[tokio::test]
    async fn recent_runs_rejects_unknown_names() {
        let scheduler = scheduler();
        scheduler.initialize().await;
        assert!(matches!(
            scheduler.recent_runs("bogus", 5).await,
            Err(FlipError::JobNotFound(_))
        ));
    }

    #[test]
    fn all_job_schedules_parse() {
        for kind in JobKind::all() {
            parse_schedule(kind.schedule())
                .unwrap_or_else(|e| panic!("{} schedule invalid: {e}", kind.name()));
        }
    }
}
