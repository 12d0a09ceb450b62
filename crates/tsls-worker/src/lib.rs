//! Strictly ordered execution of asynchronous units of work.
//!
//! Every task submitted to a [`Queue`] starts only after all previously
//! submitted tasks, including their asynchronous results, have settled. A
//! task that fails or panics settles as a failure for its own caller and the
//! queue moves on to the next one.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::Instrument;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue worker has stopped")]
    Closed,
    #[error("queued task panicked")]
    Panicked,
}

/// Handle to the ordering queue. Clones share the same worker.
///
/// The worker stops once every handle has been dropped and the tasks already
/// submitted have run.
#[derive(Clone)]
pub struct Queue {
    sender: mpsc::UnboundedSender<Job>,
}

impl Queue {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(
            async move {
                tracing::debug!("Queue worker started");
                while let Some(job) = receiver.recv().await {
                    job.await;
                }
                tracing::debug!("Queue worker stopped");
            }
            .in_current_span(),
        );

        Self { sender }
    }

    /// Enqueue the initial unit of work.
    pub fn init<Fut, T>(&self, task: Fut) -> Pending<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.then(move || task)
    }

    /// Enqueue `task`. It is called once every earlier task has settled.
    ///
    /// The position in the queue is fixed when this returns; awaiting the
    /// returned [`Pending`] is optional and dropping it does not cancel the
    /// task.
    pub fn then<F, Fut, T>(&self, task: F) -> Pending<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::pin(
            async move {
                // Run in a task of its own so a panic surfaces as a JoinError
                // instead of taking the worker down.
                let result = match tokio::spawn(async move { task().await }).await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        tracing::error!("Queued task panicked: {err}");
                        Err(QueueError::Panicked.into())
                    }
                    Err(_) => Err(QueueError::Closed.into()),
                };

                if let Err(err) = &result {
                    tracing::debug!("Queued task failed: {err:#}");
                }
                let _ = tx.send(result);
            }
            .in_current_span(),
        );

        if self.sender.send(job).is_err() {
            tracing::warn!("Task submitted to a stopped queue");
        }

        Pending { rx }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle of a queued task.
#[must_use = "dropping a Pending discards the task's result but does not cancel it"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(QueueError::Closed.into())))
    }
}
