//! Debounced saving.
//!
//! A [`SaveScheduler`] owns a background task and a persistence action.
//! Every [`SaveHandle::trigger`] restarts a quiet window; the action runs
//! once when the window elapses with no further triggers. Bursts of
//! mutations therefore collapse into one write, and the action sees the
//! state as of the moment it fires.
//!
//! ```text
//! trigger ─┐  trigger ─┐                 (quiet)
//!          ▼           ▼                    │
//! ─────────[====window====][====window====]─▶ action()
//! ```

use crate::persist::PersistError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default quiet window.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(1000);

/// The persistence action a scheduler runs.
pub type SaveAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), PersistError>> + Send + Sync>;

type Reply = oneshot::Sender<Result<bool, PersistError>>;

enum Command {
    Trigger,
    Flush(Reply),
    Stop { flush: bool, reply: Reply },
}

/// Cheap, cloneable trigger for a [`SaveScheduler`].
#[derive(Clone)]
pub struct SaveHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SaveHandle {
    /// Request a save. Restarts the quiet window.
    ///
    /// Triggers sent after the scheduler stopped are ignored.
    pub fn trigger(&self) {
        if self.tx.send(Command::Trigger).is_err() {
            debug!("save requested after scheduler stopped");
        }
    }

    /// Whether the scheduler behind this handle is still running.
    pub fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl fmt::Debug for SaveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns the debounce worker.
///
/// Dropping the scheduler aborts the worker and loses any pending write;
/// call [`SaveScheduler::flush_and_stop`] to shut down cleanly.
pub struct SaveScheduler {
    tx: mpsc::UnboundedSender<Command>,
    worker: Option<JoinHandle<()>>,
    quiet: Duration,
}

impl SaveScheduler {
    /// Start a scheduler on the current tokio runtime.
    pub fn spawn<F, Fut>(quiet: Duration, action: F) -> Result<Self, PersistError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PersistError>> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| PersistError::NoRuntime)?;
        let action: SaveAction = Arc::new(move || action().boxed());

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(quiet, action, rx));

        Ok(Self {
            tx,
            worker: Some(worker),
            quiet,
        })
    }

    /// The quiet window.
    pub fn quiet_window(&self) -> Duration {
        self.quiet
    }

    /// A trigger handle for stores to hold.
    pub fn handle(&self) -> SaveHandle {
        SaveHandle {
            tx: self.tx.clone(),
        }
    }

    /// Request a save. Same as triggering through a handle.
    pub fn trigger(&self) {
        self.handle().trigger();
    }

    /// Write now if a save is pending, and keep running.
    ///
    /// Returns whether a write happened. Failures are returned, not retried.
    pub async fn flush(&self) -> Result<bool, PersistError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| PersistError::SchedulerStopped)?;
        rx.await.map_err(|_| PersistError::SchedulerStopped)?
    }

    /// Write if a save is pending, then stop the worker.
    pub async fn flush_and_stop(self) -> Result<bool, PersistError> {
        self.shutdown(true).await
    }

    /// Stop the worker, discarding any pending save.
    pub async fn stop(self) -> Result<(), PersistError> {
        self.shutdown(false).await.map(|_| ())
    }

    async fn shutdown(mut self, flush: bool) -> Result<bool, PersistError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stop { flush, reply })
            .map_err(|_| PersistError::SchedulerStopped)?;
        let result = rx.await.map_err(|_| PersistError::SchedulerStopped)?;

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "save worker did not shut down cleanly");
            }
        }

        result
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl fmt::Debug for SaveScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveScheduler")
            .field("quiet", &self.quiet)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

async fn run_worker(
    quiet: Duration,
    action: SaveAction,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending = false;

    loop {
        let command = if pending {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    pending = false;
                    match action().await {
                        Ok(()) => debug!("debounced save written"),
                        Err(e) => error!(error = %e, "debounced save failed"),
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Trigger) => pending = true,
            Some(Command::Flush(reply)) => {
                let result = write_pending(&action, pending).await;
                pending = false;
                let _ = reply.send(result);
            }
            Some(Command::Stop { flush, reply }) => {
                let result = if flush {
                    write_pending(&action, pending).await
                } else {
                    if pending {
                        debug!("pending save discarded on stop");
                    }
                    Ok(false)
                };
                let _ = reply.send(result);
                break;
            }
            None => break,
        }
    }

    debug!("save worker stopped");
}

async fn write_pending(action: &SaveAction, pending: bool) -> Result<bool, PersistError> {
    if !pending {
        return Ok(false);
    }
    action().await?;
    debug!("pending save flushed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    /// Records the value of `state` at every write.
    #[derive(Clone, Default)]
    struct Probe {
        state: Arc<AtomicUsize>,
        writes: Arc<Mutex<Vec<usize>>>,
        fail: Arc<AtomicBool>,
    }

    impl Probe {
        fn scheduler(&self, quiet_ms: u64) -> SaveScheduler {
            let probe = self.clone();
            SaveScheduler::spawn(Duration::from_millis(quiet_ms), move || {
                let probe = probe.clone();
                async move {
                    if probe.fail.load(Ordering::SeqCst) {
                        return Err(PersistError::NotFound("probe".to_string()));
                    }
                    let state = probe.state.load(Ordering::SeqCst);
                    probe.writes.lock().unwrap().push(state);
                    Ok(())
                }
            })
            .unwrap()
        }

        fn writes(&self) -> Vec<usize> {
            self.writes.lock().unwrap().clone()
        }

        fn set(&self, value: usize) {
            self.state.store(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_write() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        probe.set(1);
        scheduler.trigger();
        sleep(Duration::from_millis(500)).await;
        probe.set(2);
        scheduler.trigger();
        sleep(Duration::from_millis(700)).await;

        // Second trigger restarted the window.
        assert!(probe.writes().is_empty());

        sleep(Duration::from_millis(400)).await;
        assert_eq!(probe.writes(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_state_at_fire_time() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        probe.set(1);
        scheduler.trigger();
        sleep(Duration::from_millis(100)).await;
        probe.set(7);
        sleep(Duration::from_millis(1000)).await;

        assert_eq!(probe.writes(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_write_separately() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        scheduler.trigger();
        sleep(Duration::from_millis(1500)).await;
        scheduler.trigger();
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(probe.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_pending_immediately() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        assert!(!scheduler.flush().await.unwrap());

        scheduler.handle().trigger();
        assert!(scheduler.flush().await.unwrap());
        assert_eq!(probe.writes().len(), 1);

        // Nothing left pending after the flush.
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(probe.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_and_stop_covers_final_mutation() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);
        let handle = scheduler.handle();

        probe.set(3);
        handle.trigger();
        assert!(scheduler.flush_and_stop().await.unwrap());
        assert_eq!(probe.writes(), vec![3]);

        assert!(!handle.is_active());
        handle.trigger();
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(probe.writes(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        scheduler.trigger();
        scheduler.stop().await.unwrap();
        sleep(Duration::from_millis(2000)).await;
        assert!(probe.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_loses_pending_write() {
        let probe = Probe::default();
        let scheduler = probe.scheduler(1000);

        scheduler.trigger();
        drop(scheduler);
        sleep(Duration::from_millis(2000)).await;
        assert!(probe.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_retried() {
        let probe = Probe::default();
        probe.fail.store(true, Ordering::SeqCst);
        let scheduler = probe.scheduler(1000);

        scheduler.trigger();
        sleep(Duration::from_millis(1500)).await;

        probe.fail.store(false, Ordering::SeqCst);
        sleep(Duration::from_millis(3000)).await;
        assert!(probe.writes().is_empty());

        probe.fail.store(true, Ordering::SeqCst);
        scheduler.trigger();
        let err = scheduler.flush().await.unwrap_err();
        assert!(matches!(err, PersistError::NotFound(_)));

        // The scheduler survives a failed write.
        probe.fail.store(false, Ordering::SeqCst);
        scheduler.trigger();
        assert!(scheduler.flush().await.unwrap());
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let err = SaveScheduler::spawn(DEFAULT_QUIET_WINDOW, || async { Ok(()) }).unwrap_err();
        assert!(matches!(err, PersistError::NoRuntime));
    }
}
