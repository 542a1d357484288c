use std::sync::Arc;
use std::time::Duration;

use ember_domain::ports::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A named job executed on a fixed interval for the life of the process.
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Runs the task forever. A failed run is logged and the schedule keeps
/// going; missed ticks are delayed rather than burst.
pub fn spawn_periodic(task: Arc<dyn PeriodicTask>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(task.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = task.run().await {
                tracing::error!(task = task.name(), error = %err, "periodic task run failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: Arc<AtomicUsize>,
    }

    impl PeriodicTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingTask {
        runs: Arc<AtomicUsize>,
    }

    impl PeriodicTask for FailingTask {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        }
    }

    #[tokio::test]
    async fn task_runs_repeatedly() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn_periodic(Arc::new(CountingTask { runs: runs.clone() }));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn failing_runs_do_not_stop_the_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn_periodic(Arc::new(FailingTask { runs: runs.clone() }));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }
}
