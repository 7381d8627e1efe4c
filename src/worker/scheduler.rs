//! Dispatcher: drains the escalation queue into a bounded pool of
//! concurrent inference calls.
//!
//! One control loop polls the queue and spawns each task into a
//! `JoinSet`; a semaphore caps how many inference calls run at once.
//! Spawning never waits for a permit, so a slow call never delays polling.
//!
//! Shutdown is driven by a `CancellationToken`. Once cancelled, the loop
//! closes the queue, dispatches whatever was still queued and waits for
//! every in-flight task. In-flight inference calls are never aborted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::llm::InferenceGateway;
use crate::store::CommunicationLog;
use crate::worker::queue::{CompletionGuard, EscalationQueue};
use crate::worker::task::{DispatchResult, EscalationTask};

/// Shared by every spawned dispatch.
struct DispatchContext {
    gateway: Arc<dyn InferenceGateway>,
    log: Arc<dyn CommunicationLog>,
    permits: Semaphore,
}

impl DispatchContext {
    /// Run one task to completion. The guard is dropped last, after the log
    /// write, however this function exits.
    async fn process(self: Arc<Self>, task: EscalationTask, _done: CompletionGuard) {
        let Ok(_permit) = self.permits.acquire().await else {
            error!(task_id = %task.id, "Dispatch pool closed, task not processed");
            return;
        };

        let outcome = self
            .gateway
            .infer(task.sender, &task.subject, &task.message)
            .await;

        if !outcome.is_success() {
            warn!(
                task_id = %task.id,
                sender = %task.sender,
                user_id = %task.subject,
                outcome = outcome.label(),
                "Inference call failed: {}",
                outcome.response_text()
            );
        }

        let result = DispatchResult::new(task, outcome);
        info!(
            task_id = %result.task.id,
            sender = %result.task.sender,
            user_id = %result.task.subject,
            priority = %result.task.priority,
            severity = %result.severity,
            "Escalation dispatched"
        );

        if let Err(e) = self.log.append(&result.to_log_entry()).await {
            error!(
                task_id = %result.task.id,
                sender = %result.task.sender,
                user_id = %result.task.subject,
                "Failed to write communication log entry: {e}"
            );
        }
    }
}

/// Handle to a running dispatcher.
pub struct Dispatcher {
    queue: Arc<EscalationQueue>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the control loop. Must be called from within a Tokio runtime,
    /// before any evaluator enqueues.
    pub fn start(
        queue: Arc<EscalationQueue>,
        gateway: Arc<dyn InferenceGateway>,
        log: Arc<dyn CommunicationLog>,
        config: &DispatchConfig,
    ) -> Self {
        info!(
            model = %gateway.model_name(),
            pool_width = config.pool_width,
            poll_ms = config.poll_interval.as_millis() as u64,
            "Dispatcher started"
        );

        let ctx = Arc::new(DispatchContext {
            gateway,
            log,
            permits: Semaphore::new(config.pool_width.max(1)),
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(control_loop(
            ctx,
            Arc::clone(&queue),
            cancel.clone(),
            config.poll_interval,
        ));

        Self {
            queue,
            cancel,
            handle,
        }
    }

    pub fn queue(&self) -> &Arc<EscalationQueue> {
        &self.queue
    }

    /// Signal the control loop to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the control loop and every worker to finish.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Dispatcher control loop ended abnormally: {e}");
        }
    }

    /// Wait for quiescence (bounded by `drain_timeout` if given), then stop
    /// and join.
    pub async fn shutdown(self, drain_timeout: Option<Duration>) {
        match drain_timeout {
            Some(limit) => {
                if !self.queue.wait_quiescent_timeout(limit).await {
                    warn!(
                        outstanding = self.queue.outstanding(),
                        "Drain timed out after {limit:?}, stopping with tasks outstanding"
                    );
                }
            }
            None => self.queue.wait_quiescent().await,
        }
        self.stop();
        self.join().await;
        info!("Dispatcher stopped");
    }
}

async fn control_loop(
    ctx: Arc<DispatchContext>,
    queue: Arc<EscalationQueue>,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    let mut in_flight = JoinSet::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.dequeue(poll_interval) => next,
        };

        match next {
            Some(task) => {
                let done = queue.completion_guard();
                in_flight.spawn(Arc::clone(&ctx).process(task, done));
            }
            None if queue.is_closed() => break,
            None => {}
        }

        while let Some(joined) = in_flight.try_join_next() {
            report_join(joined);
        }
    }

    let remaining = queue.close().await;
    if !remaining.is_empty() {
        info!(
            count = remaining.len(),
            "Dispatching tasks still queued at shutdown"
        );
    }
    for task in remaining {
        let done = queue.completion_guard();
        in_flight.spawn(Arc::clone(&ctx).process(task, done));
    }

    if !in_flight.is_empty() {
        info!(in_flight = in_flight.len(), "Waiting for in-flight dispatches");
    }
    while let Some(joined) = in_flight.join_next().await {
        report_join(joined);
    }
}

fn report_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!("Dispatch task ended abnormally: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm::InferenceOutcome;
    use crate::pipeline::types::{Priority, Sender};
    use crate::store::MemoryStore;

    /// Echoes the subject after a fixed delay and records peak concurrency.
    struct SlowEcho {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowEcho {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceGateway for SlowEcho {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn infer(&self, _sender: Sender, subject: &str, _message: &str) -> InferenceOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            InferenceOutcome::Completed(format!("ack {subject}"))
        }
    }

    fn config(pool_width: usize) -> DispatchConfig {
        DispatchConfig {
            pool_width,
            poll_interval: Duration::from_millis(20),
            drain_timeout: None,
        }
    }

    fn task(subject: &str) -> EscalationTask {
        EscalationTask::new(Sender::ReminderAgent, subject, "msg", Priority::Routine)
    }

    #[tokio::test]
    async fn every_task_is_logged_once() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SlowEcho::new(Duration::from_millis(5)));
        let dispatcher =
            Dispatcher::start(EscalationQueue::new(), gateway, store.clone(), &config(4));

        for i in 0..12 {
            dispatcher.queue().enqueue(task(&format!("U{i}"))).unwrap();
        }
        dispatcher.queue().wait_quiescent().await;

        let mut subjects: Vec<_> = store.entries().await.into_iter().map(|e| e.subject).collect();
        subjects.sort();
        let mut expected: Vec<_> = (0..12).map(|i| format!("U{i}")).collect();
        expected.sort();
        assert_eq!(subjects, expected);

        dispatcher.shutdown(None).await;
    }

    #[tokio::test]
    async fn pool_width_caps_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SlowEcho::new(Duration::from_millis(30)));
        let dispatcher = Dispatcher::start(
            EscalationQueue::new(),
            gateway.clone(),
            store.clone(),
            &config(2),
        );

        for i in 0..6 {
            dispatcher.queue().enqueue(task(&format!("U{i}"))).unwrap();
        }
        dispatcher.shutdown(None).await;

        assert_eq!(store.entries().await.len(), 6);
        assert!(gateway.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn stop_dispatches_tasks_still_queued() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SlowEcho::new(Duration::from_millis(1)));
        let queue = EscalationQueue::new();
        let dispatcher = Dispatcher::start(queue.clone(), gateway, store.clone(), &config(2));

        dispatcher.stop();
        // The loop has not run yet on this single-threaded runtime.
        for i in 0..3 {
            queue.enqueue(task(&format!("U{i}"))).unwrap();
        }
        dispatcher.join().await;

        assert!(queue.is_closed());
        assert!(queue.is_quiescent());
        assert_eq!(store.entries().await.len(), 3);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SlowEcho::new(Duration::from_millis(1)));
        let queue = EscalationQueue::new();
        let dispatcher = Dispatcher::start(queue.clone(), gateway, store.clone(), &config(2));
        dispatcher.shutdown(None).await;

        assert!(queue.enqueue(task("late")).is_err());
        assert!(queue.is_quiescent());
        assert!(store.entries().await.is_empty());
    }
}
