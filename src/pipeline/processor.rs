//! Batch processor: runs one evaluator over one batch of records.
//!
//! For each record:
//! 1. Evaluate the ordered rule cases (pure, no I/O)
//! 2. If a case fired and the run budget allows it, enqueue an escalation;
//!    fall cases that the queue accepted are also announced locally
//! 3. Persist the evaluated record, whether or not it escalated
//!
//! Malformed records are logged and skipped. Nothing in a batch aborts the
//! run.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::config::AlertBudgets;
use crate::error::{QueueError, Result};
use crate::notify::Notifier;
use crate::pipeline::budget::AlertBudget;
use crate::pipeline::rules::{HealthRules, ReminderRules, RuleEvaluator, SafetyRules};
use crate::pipeline::types::{Domain, DomainRecord, Record};
use crate::store::RecordStore;
use crate::worker::queue::EscalationQueue;
use crate::worker::task::EscalationTask;

/// What one evaluator run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub domain: Domain,
    /// Records evaluated (and persisted).
    pub evaluated: usize,
    /// Escalations accepted by the queue.
    pub escalated: usize,
    /// Records skipped because a field could not be parsed.
    pub malformed: usize,
    /// Rule firings dropped because the run budget was spent.
    pub suppressed_by_budget: usize,
    /// Local notifications attempted (accepted fall escalations only).
    pub notifications: usize,
    /// Escalations refused because the queue was already closed.
    pub rejected: usize,
}

impl BatchReport {
    fn new(domain: Domain) -> Self {
        Self {
            domain,
            evaluated: 0,
            escalated: 0,
            malformed: 0,
            suppressed_by_budget: 0,
            notifications: 0,
            rejected: 0,
        }
    }
}

/// Drives evaluators over record batches.
pub struct BatchProcessor {
    store: Arc<dyn RecordStore>,
    queue: Arc<EscalationQueue>,
    notifier: Arc<dyn Notifier>,
    budgets: AlertBudgets,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<EscalationQueue>,
        notifier: Arc<dyn Notifier>,
        budgets: AlertBudgets,
    ) -> Self {
        Self {
            store,
            queue,
            notifier,
            budgets,
        }
    }

    /// Evaluate one batch with a fresh alert budget.
    ///
    /// Records belonging to another domain are ignored.
    pub async fn run_batch<E: RuleEvaluator>(
        &self,
        evaluator: &E,
        records: &[Record],
        now: NaiveDateTime,
    ) -> BatchReport {
        let domain = E::Record::DOMAIN;
        let sender = domain.sender();
        let mut budget = AlertBudget::new(self.budgets.for_domain(domain));
        let mut report = BatchReport::new(domain);

        for record in records {
            let Some(typed) = E::Record::from_record(record) else {
                debug!(%domain, found = %record.domain(), "Ignoring record from another domain");
                continue;
            };

            let escalation = match evaluator.evaluate(typed, now) {
                Ok(escalation) => escalation,
                Err(e) => {
                    warn!(%domain, "Skipping malformed record: {e}");
                    report.malformed += 1;
                    continue;
                }
            };

            if let Some(escalation) = escalation {
                if budget.try_consume() {
                    let notify_locally = escalation.notify_locally;
                    let announcement = escalation.message.clone();
                    debug!(
                        %sender,
                        user_id = %record.user_id(),
                        rule = escalation.rule,
                        priority = %escalation.priority,
                        "Rule fired"
                    );

                    let task =
                        EscalationTask::from_escalation(sender, record.user_id(), escalation);
                    match self.queue.enqueue(task) {
                        Ok(()) => {
                            report.escalated += 1;
                            if notify_locally {
                                // Outcome is logged by the notifier.
                                let _ = self.notifier.notify(&announcement).await;
                                report.notifications += 1;
                            }
                        }
                        Err(QueueError::Closed(task)) => {
                            error!(
                                task_id = %task.id,
                                %sender,
                                user_id = %task.subject,
                                "Escalation queue closed, escalation not dispatched"
                            );
                            report.rejected += 1;
                        }
                    }
                } else {
                    report.suppressed_by_budget += 1;
                }
            }

            if let Err(e) = self.store.persist(record).await {
                warn!(
                    %domain,
                    user_id = %record.user_id(),
                    "Failed to persist evaluated record: {e}"
                );
            }
            report.evaluated += 1;
        }

        if report.suppressed_by_budget > 0 {
            info!(
                %domain,
                cap = budget.cap(),
                suppressed = report.suppressed_by_budget,
                "Alert budget exhausted"
            );
        }
        info!(
            %domain,
            evaluated = report.evaluated,
            escalated = report.escalated,
            malformed = report.malformed,
            "Batch evaluated"
        );
        report
    }

    /// Fetch the domain's records and evaluate them.
    pub async fn run_domain<E: RuleEvaluator>(
        &self,
        evaluator: &E,
        now: NaiveDateTime,
    ) -> Result<BatchReport> {
        let records = self.store.fetch(E::Record::DOMAIN).await?;
        Ok(self.run_batch(evaluator, &records, now).await)
    }

    /// Run every domain concurrently. Results are in [`Domain::all`] order.
    pub async fn run_all(&self, now: NaiveDateTime) -> Vec<Result<BatchReport>> {
        let (health, safety, reminder) = tokio::join!(
            self.run_domain(&HealthRules, now),
            self.run_domain(&SafetyRules, now),
            self.run_domain(&ReminderRules, now),
        );
        vec![health, safety, reminder]
    }
}
