use std::future::Future;

use tokio::spawn;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct TaskManager {
    hold_tx: Mutex<Option<mpsc::Sender<()>>>,
    hold_rx: Mutex<mpsc::Receiver<()>>,
    stop_tx: broadcast::Sender<()>,
}

impl TaskManager {
    pub fn new() -> Self {
        let (hold_tx, hold_rx) = mpsc::channel(1);
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            // Taken once shutdown begins, after which `spawn` refuses new
            // tasks.
            hold_tx: Mutex::new(Some(hold_tx)),
            hold_rx: Mutex::new(hold_rx),
            stop_tx,
        }
    }

    /// Spawn a task that receives a [`TaskContext`] to watch for the stop
    /// signal. Returns `None` if the manager is already stopping.
    pub async fn spawn<F, T>(&self, f: F) -> Option<Task<T::Output>>
    where
        F: FnOnce(TaskContext) -> T + Send + 'static,
        T: Future + Send + 'static,
        T::Output: Send + 'static,
    {
        let hold_tx = self.hold_tx.lock().await.as_ref().cloned()?;
        let stop_rx = self.stop_tx.subscribe();
        let handle = spawn(async move {
            // The hold is released when the context is dropped, which happens
            // when the future generated by `f` completes.
            let task_context = TaskContext {
                _hold: hold_tx,
                stop: stop_rx,
                stopped: false,
            };

            f(task_context).await
        });
        Some(Task { handle })
    }

    pub async fn stop(&self) {
        // The manager's own hold must go first or waiting for the hold
        // channel to close below never returns. Dropping it also makes
        // later calls to `spawn` return `None`, so no task can start that
        // misses the stop signal.
        drop(self.hold_tx.lock().await.take());

        let _ = self.stop_tx.send(());

        // Every task holds a sender. The channel closes once all of them
        // have finished.
        let _ = self.hold_rx.lock().await.recv().await;
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Task<O> {
    handle: JoinHandle<O>,
}

impl<O> Task<O> {
    /// Wait for the task to finish by itself or after a stop signal.
    /// Returns `None` if the task panicked.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    pub async fn join(&mut self) -> Option<O> {
        match (&mut self.handle).await {
            Ok(output) => Some(output),
            Err(err) => {
                tracing::error!(%err, "task failed");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct TaskContext {
    stop: broadcast::Receiver<()>,
    stopped: bool,
    _hold: mpsc::Sender<()>,
}

impl TaskContext {
    /// Resolves once the manager asks its tasks to stop. After that it
    /// resolves immediately on every call.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    pub async fn wait_for_stop(&mut self) {
        if !self.stopped {
            let _ = self.stop.recv().await;
            self.stopped = true;
        }
    }
}
