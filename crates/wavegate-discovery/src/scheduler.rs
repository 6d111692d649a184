//! Cancellable periodic task registry.
//!
//! Background loops register here instead of spawning ad-hoc timers, so
//! the whole schedule can be shut down cleanly and tests can run the loop
//! bodies directly without waiting on wall-clock intervals.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Registry of named periodic background tasks.
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a named periodic task.
    ///
    /// `period` is re-read before every tick, so configuration changes to
    /// an interval take effect on the next cycle. The task body runs to
    /// completion even when shutdown arrives mid-run; shutdown interrupts
    /// only the sleep.
    pub fn spawn_periodic<P, PF, T, TF>(&self, name: impl Into<String>, period: P, task: T)
    where
        P: Fn() -> PF + Send + 'static,
        PF: Future<Output = Duration> + Send,
        T: Fn() -> TF + Send + 'static,
        TF: Future<Output = ()> + Send,
    {
        let name = name.into();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!(task = %task_name, "periodic task started");
            loop {
                let delay = period().await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        task().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(task = %task_name, "periodic task stopped");
        });

        self.handles.lock().push((name, handle));
    }

    /// Names of registered tasks.
    pub fn task_names(&self) -> Vec<String> {
        self.handles.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Signal all tasks to stop and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for (name, handle) in handles {
            if handle.await.is_err() {
                tracing::warn!(task = %name, "periodic task panicked");
            }
        }
    }
}
