//! Fixed-interval runner for daemon mode.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Interval used when none is configured or the configured one is below a minute.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Clamp a configured interval: anything below one minute falls back to the default.
pub fn effective_interval_minutes(configured: Option<i64>) -> u64 {
    match configured {
        Some(minutes) if minutes >= 1 => minutes as u64,
        _ => DEFAULT_INTERVAL_MINUTES,
    }
}

/// Run `job` once immediately, then once every `period` until `shutdown` resolves.
///
/// Ticks missed while a job is still running are skipped rather than replayed.
/// `shutdown` is also observed while a job is in flight; the job future is dropped.
/// Returns the number of completed job runs.
pub async fn run_periodic<F, Fut, S>(period: Duration, shutdown: S, mut job: F) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(runs, "[SCHEDULE] Shutdown signal received");
                return runs;
            }
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!(runs, "[SCHEDULE] Shutdown signal received while job was running");
                return runs;
            }
            _ = job() => {
                runs += 1;
                debug!(runs, next_in_secs = period.as_secs(), "[SCHEDULE] Job finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn interval_below_one_minute_falls_back_to_default() {
        assert_eq!(effective_interval_minutes(None), 5);
        assert_eq!(effective_interval_minutes(Some(0)), 5);
        assert_eq!(effective_interval_minutes(Some(-3)), 5);
        assert_eq!(effective_interval_minutes(Some(1)), 1);
        assert_eq!(effective_interval_minutes(Some(30)), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let job_count = count.clone();
        let period = Duration::from_secs(60);

        // Stop halfway between the third and fourth tick.
        let shutdown = tokio::time::sleep(Duration::from_secs(150));
        let runs = run_periodic(period, shutdown, move || {
            let job_count = job_count.clone();
            async move {
                job_count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(runs, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_running_job() {
        let period = Duration::from_secs(60);
        let shutdown = tokio::time::sleep(Duration::from_secs(10));
        let runs = run_periodic(period, shutdown, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .await;
        assert_eq!(runs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_jobs_skip_missed_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let job_count = count.clone();
        let period = Duration::from_secs(60);

        // Each job takes 150s, so ticks at 60s and 120s are missed and not replayed.
        let shutdown = tokio::time::sleep(Duration::from_secs(400));
        let runs = run_periodic(period, shutdown, move || {
            let job_count = job_count.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(150)).await;
                job_count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        // Runs finish at 150s and 300s; the third is cut off by shutdown at 400s.
        assert_eq!(runs, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
