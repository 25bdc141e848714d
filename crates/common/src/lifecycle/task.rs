//! Cancellable periodic background task
//!
//! A [`PeriodicTask`] owns a single tokio task that runs a tick closure on a
//! fixed interval until stopped. Tick failures are logged and followed by an
//! optional cooldown; they never end the loop. Stopping cancels the loop and
//! awaits the join handle with a bounded timeout.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CommonError, CommonResult};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct TaskState {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Named periodic task with start/stop lifecycle
pub struct PeriodicTask {
    name: &'static str,
    state: Mutex<TaskState>,
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask").field("name", &self.name).finish_non_exhaustive()
    }
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self { name, state: Mutex::new(TaskState::default()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn the loop.
    ///
    /// The first tick happens one `interval` after start. When a tick fails
    /// and `error_cooldown` is set, the loop waits that long before resuming
    /// its normal cadence.
    ///
    /// # Errors
    ///
    /// Returns a config error if the task is already running.
    pub async fn start<F, Fut, E>(
        &self,
        interval: Duration,
        error_cooldown: Option<Duration>,
        tick: F,
    ) -> CommonResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let mut state = self.state.lock().await;
        if state.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(CommonError::config(format!("{} is already running", self.name)));
        }

        // Fresh token so the task can be restarted after stop
        state.cancel = CancellationToken::new();
        let cancel = state.cancel.clone();
        let name = self.name;

        state.handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(task = name, "Periodic task cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = tick().await {
                            warn!(task = name, error = %e, "Periodic task tick failed");
                            if let Some(cooldown) = error_cooldown {
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(cooldown) => {}
                                }
                            }
                        }
                    }
                }
            }
        }));

        info!(task = name, interval_secs = interval.as_secs(), "Periodic task started");
        Ok(())
    }

    /// Cancel the loop and wait for it to finish.
    ///
    /// Stopping a task that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the task panicked, or a timeout error if
    /// it did not finish within five seconds.
    pub async fn stop(&self) -> CommonResult<()> {
        let handle = {
            let mut state = self.state.lock().await;
            state.cancel.cancel();
            state.handle.take()
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => {
                info!(task = self.name, "Periodic task stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(task = self.name, error = %e, "Periodic task panicked");
                Err(CommonError::internal(format!("{} panicked: {e}", self.name)))
            }
            Err(_) => {
                warn!(task = self.name, "Periodic task did not complete within timeout");
                Err(CommonError::timeout(self.name, STOP_TIMEOUT))
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}
