//! Trailing-edge debouncer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Runs a task once triggers have been quiet for `window`.
///
/// A burst of triggers yields one run. Triggers that arrive while the task
/// is running queue exactly one more run.
pub struct Debouncer {
    trigger: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the debouncer on the current runtime.
    pub fn spawn<F, Fut>(window: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let notify = trigger.clone();

        let handle = tokio::spawn(async move {
            loop {
                notify.notified().await;
                loop {
                    tokio::select! {
                        _ = notify.notified() => continue,
                        _ = tokio::time::sleep(window) => break,
                    }
                }
                debug!("Debounce window of {:?} elapsed", window);
                task().await;
            }
        });

        Self { trigger, handle }
    }

    pub fn trigger(&self) {
        self.trigger.notify_one();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
