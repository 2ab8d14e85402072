//! Tracks the long-running tasks of the notifier and shuts them down together.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Owner of the shutdown signal and of every spawned worker task.
///
/// Tasks observe the signal through [`TaskManager::shutdown_rx`] and are
/// expected to return promptly once it flips to `true`.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Spawns a task and keeps its handle until shutdown.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Spawning task");
        let handle = tokio::spawn(future);
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.retain(|(_, handle)| !handle.is_finished());
        handles.push((name, handle));
    }

    /// A receiver that turns `true` once shutdown has been requested.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signals shutdown and waits for every tracked task to finish.
    ///
    /// Tasks spawned while shutting down are awaited as well.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let mut panicked = 0;
        loop {
            let handles = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .drain(..)
                .collect::<Vec<_>>();
            if handles.is_empty() {
                break;
            }
            info!(
                "TaskManager shutting down. Waiting for {} tasks to complete...",
                handles.len()
            );

            let (names, handles): (Vec<String>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
            let results = join_all(handles).await;

            for (name, result) in names.iter().zip(results) {
                match result {
                    Ok(()) => debug!(task_name = %name, "Task shut down gracefully."),
                    Err(e) => {
                        panicked += 1;
                        error!(task_name = %name, error = %e, "Task panicked during shutdown.");
                    }
                }
            }
        }

        if panicked > 0 {
            error!("{} tasks panicked during shutdown", panicked);
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}
