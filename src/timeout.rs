//! Watchdog that keeps the processor from waiting forever on a batch.
//!
//! Every batch arms a timer. If the batch finishes first it stops the timer,
//! which also resets the count of consecutive forced batches. If the timer
//! wins, the count goes up and the processor is told to move on anyway; once
//! the count exceeds the threshold every further expiry reports
//! [`ThresholdExceeded`] until a batch finishes again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ProcessorConfig;
use crate::error::ThresholdExceeded;

/// Outcome delivered to the expiry callback: `Ok(())` for a forced batch the
/// processor should recover from, `Err` once the threshold is exceeded.
pub type Expiry = Result<(), ThresholdExceeded>;

#[derive(Debug, Clone)]
pub struct BatchWatchdog {
    batch_timeout: Duration,
    batch_force_threshold: u32,
    force_count: Arc<Mutex<u32>>,
}

impl BatchWatchdog {
    pub fn new(batch_timeout: Duration, batch_force_threshold: u32) -> Self {
        Self {
            batch_timeout,
            batch_force_threshold,
            force_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.batch_timeout, config.batch_force_threshold)
    }

    /// Consecutive forced batches since the last stop
    pub fn force_count(&self) -> u32 {
        *lock(&self.force_count)
    }

    /// Arm a timer for one batch.
    ///
    /// `on_expire` runs at most once, when the batch timeout elapses before the
    /// returned [`WatchdogStop`] is used. Must be called from within a tokio runtime.
    pub fn start<F>(&self, on_expire: F) -> WatchdogStop
    where
        F: FnOnce(Expiry) + Send + 'static,
    {
        let batch_timeout = self.batch_timeout;
        let threshold = self.batch_force_threshold;
        let force_count = Arc::clone(&self.force_count);
        let settled = Arc::new(AtomicBool::new(false));

        let timer = tokio::spawn({
            let settled = Arc::clone(&settled);
            async move {
                tokio::time::sleep(batch_timeout).await;
                if let Some(expiry) = force_next(&force_count, &settled, threshold) {
                    on_expire(expiry);
                }
            }
        });

        WatchdogStop {
            timer,
            settled,
            force_count: Arc::clone(&self.force_count),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `None` when the timer was stopped before it got to count.
fn force_next(force_count: &Mutex<u32>, settled: &AtomicBool, threshold: u32) -> Option<Expiry> {
    // `settled` is only touched with the count locked
    let mut count = lock(force_count);
    if settled.swap(true, Ordering::SeqCst) {
        return None;
    }

    *count = count.saturating_add(1);
    let forced = *count;
    drop(count);

    if forced > threshold {
        return Some(Err(ThresholdExceeded { forced, threshold }));
    }

    tracing::warn!(forced, threshold, "forced to fetch a new batch manually");
    Some(Ok(()))
}

/// Stops one armed timer.
///
/// Stopping means a batch really finished, so it also resets the forced batch
/// count. Calling it after the timer already fired is fine and still resets.
/// An expiry and a stop of the same timer never interleave: a timer that has
/// not counted yet by the time `stop` runs never will.
#[derive(Debug)]
pub struct WatchdogStop {
    timer: JoinHandle<()>,
    settled: Arc<AtomicBool>,
    force_count: Arc<Mutex<u32>>,
}

impl WatchdogStop {
    pub fn stop(&self) {
        let mut count = lock(&self.force_count);
        self.settled.store(true, Ordering::SeqCst);
        *count = 0;
        drop(count);

        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn recorder() -> (
        mpsc::UnboundedSender<Expiry>,
        mpsc::UnboundedReceiver<Expiry>,
    ) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Expiry>) -> Vec<Expiry> {
        let mut out = Vec::new();
        while let Ok(expiry) = rx.try_recv() {
            out.push(expiry);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_forces_next_batch() {
        let watchdog = BatchWatchdog::new(Duration::from_millis(1), 5);
        let (tx, mut rx) = recorder();

        let _stop = watchdog.start(move |expiry| {
            let _ = tx.send(expiry);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(drain(&mut rx), vec![Ok(())]);
        assert_eq!(watchdog.force_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_fires() {
        let watchdog = BatchWatchdog::new(Duration::from_millis(10), 5);
        let (tx, mut rx) = recorder();

        let stop = watchdog.start(move |expiry| {
            let _ = tx.send(expiry);
        });
        stop.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(watchdog.force_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_threshold_reports_every_further_expiry() {
        let watchdog = BatchWatchdog::new(Duration::from_millis(1), 3);
        let (tx, mut rx) = recorder();

        for _ in 0..5 {
            let tx = tx.clone();
            let _ = watchdog.start(move |expiry| {
                let _ = tx.send(expiry);
            });
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expiries = drain(&mut rx);
        assert_eq!(expiries.len(), 5);
        assert_eq!(expiries.iter().filter(|e| e.is_ok()).count(), 3);

        let mut forced: Vec<u32> = expiries
            .iter()
            .filter_map(|e| e.as_ref().err())
            .map(|err| {
                assert_eq!(err.threshold, 3);
                err.forced
            })
            .collect();
        forced.sort_unstable();
        assert_eq!(forced, vec![4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_recovers_from_exceeded_threshold() {
        let watchdog = BatchWatchdog::new(Duration::from_millis(1), 3);
        let (tx, mut rx) = recorder();

        for _ in 0..4 {
            let tx = tx.clone();
            let _ = watchdog.start(move |expiry| {
                let _ = tx.send(expiry);
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let expiries = drain(&mut rx);
        assert_eq!(expiries[..3], [Ok(()), Ok(()), Ok(())]);
        assert!(expiries[3].is_err());

        let stop = watchdog.start({
            let tx = tx.clone();
            move |expiry| {
                let _ = tx.send(expiry);
            }
        });
        stop.stop();
        assert_eq!(watchdog.force_count(), 0);

        let _ = watchdog.start(move |expiry| {
            let _ = tx.send(expiry);
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(drain(&mut rx), vec![Ok(())]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_expiry_still_resets_count() {
        let watchdog = BatchWatchdog::new(Duration::from_millis(1), 5);

        let first = watchdog.start(|_| {});
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _second = watchdog.start(|_| {});
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(watchdog.force_count(), 2);

        first.stop();
        assert_eq!(watchdog.force_count(), 0);
    }

    #[test]
    fn timer_woken_after_stop_does_not_count() {
        let force_count = Mutex::new(3);
        let settled = AtomicBool::new(false);

        // Stop wins: the reset is final
        settled.store(true, Ordering::SeqCst);
        *lock(&force_count) = 0;

        assert_eq!(force_next(&force_count, &settled, 5), None);
        assert_eq!(*lock(&force_count), 0);
    }

    #[test]
    fn timer_counts_only_once() {
        let force_count = Mutex::new(0);
        let settled = AtomicBool::new(false);

        assert_eq!(force_next(&force_count, &settled, 5), Some(Ok(())));
        assert_eq!(force_next(&force_count, &settled, 5), None);
        assert_eq!(*lock(&force_count), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_racing_expiry_always_leaves_count_reset() {
        let watchdog = BatchWatchdog::new(Duration::ZERO, u32::MAX);

        for round in 0..500 {
            let stop = watchdog.start(|_| {});
            for _ in 0..round % 4 {
                tokio::task::yield_now().await;
            }
            stop.stop();

            // Give a timer that already woke the chance to finish
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert_eq!(watchdog.force_count(), 0, "count leaked in round {round}");
        }
    }
}
