use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period between two heartbeat lines.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic "still uploading" log line for one long-running transfer.
///
/// The first line is logged one full interval after [`start()`](Self::start).
/// Call [`stop()`](Self::stop) when the transfer is over. If the heartbeat is
/// dropped instead (the owning future was cancelled), the task is aborted.
pub struct Heartbeat {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Heartbeat {
    /// Spawn the heartbeat task. Must be called from within a tokio runtime.
    ///
    /// Intervals shorter than [`MIN_INTERVAL`] (including zero) are raised to it.
    pub fn start(path: PathBuf, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            let mut beats = 0;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        beats += 1;
                        tracing::info!(path = %path.display(), "Still uploading {}", path.display());
                    },
                }
            }
            beats
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Signal the task and wait for it to finish, returning how many lines
    /// it logged.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            // The task only exits early if it panicked, nothing to signal then.
            _ = stop.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => 0,
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
