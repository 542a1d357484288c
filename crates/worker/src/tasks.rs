use std::time::{Duration, Instant};

use ember_domain::poller::KeywordPoller;
use ember_domain::ports::BoxFuture;
use ember_domain::reconcile::Reconciler;
use ember_infra::scheduler::PeriodicTask;

use crate::observability;

/// Drives one keyword poll cycle per tick.
pub struct PollerTask {
    poller: KeywordPoller,
    interval: Duration,
}

impl PollerTask {
    pub fn new(poller: KeywordPoller, interval: Duration) -> Self {
        Self { poller, interval }
    }
}

impl PeriodicTask for PollerTask {
    fn name(&self) -> &'static str {
        "keyword-poll"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async {
            let started = Instant::now();
            match self.poller.run_cycle().await {
                Ok(outcome) => {
                    let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
                    observability::register_poll_cycle(
                        "ok",
                        outcome.provisioned as u64,
                        outcome.cleaned as u64,
                        elapsed,
                    );
                    tracing::info!(
                        provisioned = outcome.provisioned,
                        refreshed = outcome.refreshed,
                        cleaned = outcome.cleaned,
                        "keyword poll cycle complete"
                    );
                    Ok(())
                }
                Err(err) => {
                    let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
                    observability::register_poll_cycle("error", 0, 0, elapsed);
                    Err(err.into())
                }
            }
        })
    }
}

/// Writes the engagement cache back into durable storage each tick.
pub struct ReconcilerTask {
    reconciler: Reconciler,
    interval: Duration,
}

impl ReconcilerTask {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }
}

impl PeriodicTask for ReconcilerTask {
    fn name(&self) -> &'static str {
        "like-reconcile"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async {
            let started = Instant::now();
            match self.reconciler.run_once().await {
                Ok(report) => {
                    let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
                    observability::register_reconcile_run("ok", report.keys as u64, elapsed);
                    tracing::info!(
                        keys = report.keys,
                        saved = report.saved,
                        deleted = report.deleted,
                        failed = report.failed,
                        "reconciliation pass complete"
                    );
                    Ok(())
                }
                Err(err) => {
                    let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
                    observability::register_reconcile_run("error", 0, elapsed);
                    Err(err.into())
                }
            }
        })
    }
}
