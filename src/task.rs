//! Owned, cancellable scheduled tasks.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A periodic background task bound to one owner.
///
/// The recording clock and the upload progress estimator both run on
/// this guard: dropping it aborts the task, so no interval survives an
/// exit path (stop, error, or teardown) of the session or job that
/// owns it.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn a task invoking `tick` every `period`. The first tick
    /// fires one full period after the spawn, not immediately.
    pub fn spawn_interval<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            // interval() ticks immediately; delay the first tick
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                timer.tick().await;
                tick();
            }
        });

        Self { handle }
    }

    /// Explicitly cancel the task.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_stop_after_drop() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let task = ScheduledTask::spawn_interval(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let seen = count.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
