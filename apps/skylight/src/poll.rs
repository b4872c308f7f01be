use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Fixed-interval pull fallback. At most one timer runs per scheduler
/// instance: `start` replaces any running timer, `stop` is a no-op when
/// idle. Ticks are fire-and-forget; the callback must tolerate a new tick
/// arriving while earlier work is still in flight.
#[derive(Debug, Default)]
pub struct PollingScheduler {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<F>(&self, interval: Duration, tick: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            // First tick after one full period, matching a repeating timer
            // rather than an immediate fire.
            let start = time::Instant::now() + interval;
            let mut timer = time::interval_at(start, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                tick();
            }
        });
        let previous = self.task.lock().unwrap().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().unwrap().is_some()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ticks_on_the_period_not_immediately() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        scheduler.start(Duration::from_secs(4), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_timer() {
        let scheduler = PollingScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        scheduler.start(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        scheduler.start(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
        // Stopping again is a no-op.
        scheduler.stop();
    }
}
