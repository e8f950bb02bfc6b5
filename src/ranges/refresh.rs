//! Background range refresh owned by the process lifecycle.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::matcher::RangeMatcher;

/// Handle to a running refresh task. Dropping it aborts the task;
/// [`RefreshHandle::shutdown`] stops it cleanly.
#[must_use = "dropping the handle stops the refresh task"]
pub struct RefreshHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Refresh `matcher` every `every`, starting immediately.
///
/// Must be called from within a tokio runtime.
pub fn spawn_refresh_task(matcher: RangeMatcher, every: Duration) -> RefreshHandle {
    let (stop, mut stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    matcher.refresh().await;
                }
            }
        }
        debug!("range refresh task stopped");
    });
    RefreshHandle {
        stop: Some(stop),
        task: Some(task),
    }
}

impl RefreshHandle {
    /// Signal the task and wait for it to exit. A refresh already in progress
    /// finishes first.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
