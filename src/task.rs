//! Supervised task pool.
//!
//! Every task body runs in its own tokio task.  A tracked supervisor awaits
//! it and turns a panic into an error log line, so one failing service
//! never takes its siblings down.  Essential tasks are the exception: their
//! panic cancels the whole pool.  All tasks share one cancellation token;
//! [`TaskPool::shutdown`] cancels it and waits for every task to finish.

use std::any::Any;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, warn, Instrument};

#[derive(Clone, Default)]
pub struct TaskPool {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under supervision.  It receives the pool's cancellation
    /// token and is expected to return once the token is cancelled.
    pub fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.supervise(name, false, task);
    }

    /// Like [`TaskPool::spawn`], but a panic or abort of `task` cancels the
    /// whole pool.
    pub fn spawn_essential<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.supervise(name, true, task);
    }

    fn supervise<F, Fut>(&self, name: &'static str, essential: bool, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let span = info_span!("service", service = name);
        let handle = tokio::spawn(task(self.token.clone()).instrument(span));
        let token = self.token.clone();
        self.tracker.spawn(async move {
            match handle.await {
                Ok(()) => {
                    debug!(task = name, "task finished");
                    return;
                }
                Err(err) if err.is_panic() => {
                    error!(task = name, panic = %panic_message(err.into_panic()), "task panicked")
                }
                Err(err) => warn!(task = name, error = %err, "task aborted"),
            }
            if essential {
                error!(task = name, "essential task failed, cancelling all tasks");
                token.cancel();
            }
        });
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask every task to stop without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the pool has been cancelled, by anyone.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Number of supervised tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Cancel all tasks and wait for them to return.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
