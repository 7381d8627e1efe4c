//! Escalation queue: unbounded FIFO hand-off from evaluators to the
//! dispatcher, with an outstanding-task count for quiescence.
//!
//! A task counts as outstanding from the moment it is enqueued until its
//! [`CompletionGuard`] is dropped, which the dispatcher does only after the
//! inference call and the log write have finished.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::QueueError;
use crate::worker::task::EscalationTask;

pub struct EscalationQueue {
    /// `None` once the queue has been closed.
    tx: Mutex<Option<mpsc::UnboundedSender<EscalationTask>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<EscalationTask>>,
    outstanding: watch::Sender<usize>,
}

impl EscalationQueue {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            outstanding: watch::Sender::new(0),
        })
    }

    /// Add a task to the back of the queue. Never blocks.
    ///
    /// Fails only after the dispatcher has closed the queue; the task is
    /// handed back inside the error.
    pub fn enqueue(&self, task: EscalationTask) -> Result<(), QueueError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(QueueError::Closed(Box::new(task)));
        };

        self.outstanding.send_modify(|n| *n += 1);
        match tx.send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(task)) => {
                self.task_done();
                Err(QueueError::Closed(Box::new(task)))
            }
        }
    }

    /// Wait up to `timeout` for the next task.
    ///
    /// Returns `None` on timeout or when the queue is closed and empty.
    /// Cancel-safe: dropping the future never loses a task.
    pub async fn dequeue(&self, timeout: Duration) -> Option<EscalationTask> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Stop accepting tasks and return everything still queued, in order.
    pub(crate) async fn close(&self) -> Vec<EscalationTask> {
        // Dropping the sender under the lock orders close after every
        // in-progress enqueue.
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut remaining = Vec::new();
        while let Ok(task) = rx.try_recv() {
            remaining.push(task);
        }
        debug!(remaining = remaining.len(), "Escalation queue closed");
        remaining
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Mark one task as fully processed.
    pub fn task_done(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// A guard that calls [`task_done`](Self::task_done) exactly once when dropped.
    pub fn completion_guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard {
            queue: Arc::clone(self),
        }
    }

    /// Tasks enqueued but not yet fully processed.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    pub fn is_quiescent(&self) -> bool {
        self.outstanding() == 0
    }

    /// Resolve once no task is queued or in flight.
    pub async fn wait_quiescent(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Like [`wait_quiescent`](Self::wait_quiescent) with an upper bound.
    /// Returns `false` if the bound elapsed first.
    pub async fn wait_quiescent_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_quiescent())
            .await
            .is_ok()
    }
}

/// Decrements the outstanding count when dropped, whether the task
/// completed, failed, panicked or was aborted.
#[must_use = "dropping the guard immediately marks the task as done"]
pub struct CompletionGuard {
    queue: Arc<EscalationQueue>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Priority, Sender};

    fn task(subject: &str) -> EscalationTask {
        EscalationTask::new(Sender::HealthAgent, subject, "msg", Priority::Urgent)
    }

    #[tokio::test]
    async fn fifo_order() {
        let queue = EscalationQueue::new();
        for s in ["a", "b", "c"] {
            queue.enqueue(task(s)).unwrap();
        }
        let mut seen = Vec::new();
        while let Some(t) = queue.dequeue(Duration::from_millis(10)).await {
            seen.push(t.subject);
        }
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let queue = EscalationQueue::new();
        assert!(queue.dequeue(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn outstanding_counts_until_guard_drops() {
        let queue = EscalationQueue::new();
        queue.enqueue(task("a")).unwrap();
        queue.enqueue(task("b")).unwrap();
        assert_eq!(queue.outstanding(), 2);

        let _ = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(queue.outstanding(), 2, "dequeue alone is not completion");

        drop(queue.completion_guard());
        assert_eq!(queue.outstanding(), 1);
        queue.task_done();
        assert!(queue.is_quiescent());
    }

    #[tokio::test]
    async fn wait_quiescent_returns_immediately_when_idle() {
        let queue = EscalationQueue::new();
        assert!(queue.wait_quiescent_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn wait_quiescent_blocks_until_done() {
        let queue = EscalationQueue::new();
        queue.enqueue(task("a")).unwrap();
        assert!(!queue.wait_quiescent_timeout(Duration::from_millis(20)).await);

        let guard = queue.completion_guard();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_quiescent().await })
        };
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn close_returns_remaining_and_rejects_new_tasks() {
        let queue = EscalationQueue::new();
        queue.enqueue(task("a")).unwrap();
        queue.enqueue(task("b")).unwrap();

        let remaining = queue.close().await;
        assert_eq!(remaining.len(), 2);
        assert!(queue.is_closed());
        assert_eq!(queue.outstanding(), 2, "remaining tasks still need completion");

        let err = queue.enqueue(task("late")).unwrap_err();
        let QueueError::Closed(rejected) = err;
        assert_eq!(rejected.subject, "late");
        assert_eq!(queue.outstanding(), 2);
        assert!(queue.dequeue(Duration::from_millis(10)).await.is_none());
    }
}
