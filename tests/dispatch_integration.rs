//! End-to-end: evaluators -> queue -> dispatcher -> communication log.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use eldercare_dispatch::config::{AlertBudgets, DispatchConfig};
use eldercare_dispatch::error::{DatabaseError, QueueError};
use eldercare_dispatch::llm::{InferenceGateway, InferenceOutcome, TIMEOUT_FALLBACK};
use eldercare_dispatch::notify::{Notifier, NotifyOutcome};
use eldercare_dispatch::pipeline::types::{
    HealthRecord, ImpactLevel, Movement, ReminderRecord, SafetyRecord,
};
use eldercare_dispatch::pipeline::{BatchProcessor, Domain, Priority, Record, Sender};
use eldercare_dispatch::store::{
    CommunicationEntry, CommunicationLog, LibSqlBackend, MemoryStore, RecordStore,
};
use eldercare_dispatch::worker::{Dispatcher, EscalationQueue, EscalationTask};

// ── Test doubles ────────────────────────────────────────────────────

/// Answers with a canned line; subjects listed in `time_out` get a timeout.
struct StubGateway {
    time_out: Vec<String>,
    calls: AtomicUsize,
}

impl StubGateway {
    fn new() -> Self {
        Self {
            time_out: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn timing_out(subjects: &[&str]) -> Self {
        Self {
            time_out: subjects.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceGateway for StubGateway {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn infer(&self, sender: Sender, subject: &str, _message: &str) -> InferenceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.time_out.iter().any(|s| s == subject) {
            InferenceOutcome::TimedOut {
                after: Duration::from_millis(5),
            }
        } else {
            InferenceOutcome::Completed(format!("{sender}: check on {subject}"))
        }
    }
}

/// A log sink that always fails.
struct BrokenLog;

#[async_trait]
impl CommunicationLog for BrokenLog {
    async fn append(&self, _entry: &CommunicationEntry) -> Result<(), DatabaseError> {
        Err(DatabaseError::Query("disk full".into()))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<CommunicationEntry>, DatabaseError> {
        Ok(Vec::new())
    }

    async fn count_by_sender(&self) -> Result<HashMap<String, usize>, DatabaseError> {
        Ok(HashMap::new())
    }
}

struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _message: &str) -> NotifyOutcome {
        NotifyOutcome::Delivered
    }
}

fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        pool_width: 4,
        poll_interval: Duration::from_millis(20),
        drain_timeout: Some(Duration::from_secs(5)),
    }
}

fn now() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-01-22 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
}

fn health(user: &str, hr: bool, bp: bool, glucose: bool) -> Record {
    Record::Health(HealthRecord {
        user_id: user.into(),
        timestamp: "2025-01-22 09:00:00".into(),
        heart_rate: 118,
        heart_rate_flag: hr,
        blood_pressure: "120/80 mmHg".into(),
        blood_pressure_flag: bp,
        glucose: 101,
        glucose_flag: glucose,
        oxygen: 96,
        oxygen_flag: false,
        alert_triggered: false,
        caregiver_notified: false,
    })
}

fn safety(user: &str, fall: bool, movement: Movement, inactivity: &str, location: &str) -> Record {
    Record::Safety(SafetyRecord {
        user_id: user.into(),
        timestamp: "2025-01-22 09:30:00".into(),
        movement,
        fall_detected: fall,
        impact: ImpactLevel::High,
        inactivity: inactivity.into(),
        location: location.into(),
        alert_triggered: false,
        caregiver_notified: false,
    })
}

fn reminder(user: &str, scheduled: &str, sent: bool) -> Record {
    Record::Reminder(ReminderRecord {
        user_id: user.into(),
        timestamp: "2025-01-22 07:00:00".into(),
        reminder_type: "Medication".into(),
        scheduled_time: scheduled.into(),
        sent,
        acknowledged: false,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_logs_one_entry_per_escalation() {
    let store = Arc::new(
        MemoryStore::with_records([
            health("H1", true, false, false),
            health("H2", false, false, false),
            safety("S1", true, Movement::None, "45", "Bathroom"),
            safety("S2", false, Movement::Walking, "0", "Hall"),
            reminder("R1", "09:00", false),
            reminder("R2", "09:30", true),
            reminder("R3", "23:59", false),
        ])
        .await,
    );
    let queue = EscalationQueue::new();
    let gateway = Arc::new(StubGateway::new());
    let dispatcher = Dispatcher::start(
        queue.clone(),
        gateway.clone(),
        store.clone(),
        &dispatch_config(),
    );

    let processor = BatchProcessor::new(
        store.clone(),
        queue.clone(),
        Arc::new(SilentNotifier),
        AlertBudgets::default(),
    );
    for result in processor.run_all(now()).await {
        result.unwrap();
    }
    dispatcher.shutdown(Some(Duration::from_secs(5))).await;

    let entries = store.entries().await;
    let mut subjects: Vec<_> = entries.iter().map(|e| e.subject.as_str()).collect();
    subjects.sort();
    assert_eq!(subjects, ["H1", "R1", "R2", "S1"]);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 4);

    let counts = store.count_by_sender().await.unwrap();
    assert_eq!(counts["HealthAgent"], 1);
    assert_eq!(counts["SafetyAgent"], 1);
    assert_eq!(counts["ReminderAgent"], 2);

    let health_entry = entries.iter().find(|e| e.subject == "H1").unwrap();
    assert!(health_entry.message.contains("not normal"));
    assert_eq!(health_entry.response, "HealthAgent: check on H1");

    let fall_entry = entries.iter().find(|e| e.subject == "S1").unwrap();
    assert!(fall_entry.message.contains("Bathroom"));
    assert!(fall_entry.message.contains("high"));
    assert!(fall_entry.message.contains("45"));

    assert_eq!(store.persisted().await.len(), 7);
    assert!(queue.is_quiescent());
}

#[tokio::test]
async fn timed_out_inference_is_logged_with_fallback() {
    let store = Arc::new(MemoryStore::new());
    let queue = EscalationQueue::new();
    let gateway = Arc::new(StubGateway::timing_out(&["D1001"]));
    let dispatcher = Dispatcher::start(queue.clone(), gateway, store.clone(), &dispatch_config());

    queue
        .enqueue(EscalationTask::new(
            Sender::SafetyAgent,
            "D1001",
            "Fall detected",
            Priority::Critical,
        ))
        .unwrap();
    dispatcher.shutdown(None).await;

    let entries = store.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response, TIMEOUT_FALLBACK);
    assert_eq!(entries[0].sender, "SafetyAgent");
}

#[tokio::test]
async fn quiescence_is_immediate_when_idle() {
    let store = Arc::new(MemoryStore::new());
    let queue = EscalationQueue::new();
    let dispatcher = Dispatcher::start(
        queue.clone(),
        Arc::new(StubGateway::new()),
        store.clone(),
        &dispatch_config(),
    );

    assert!(queue.wait_quiescent_timeout(Duration::from_millis(10)).await);
    dispatcher.shutdown(None).await;
}

#[tokio::test]
async fn quiescence_waits_for_every_log_write() {
    let store = Arc::new(MemoryStore::new());
    let queue = EscalationQueue::new();
    let dispatcher = Dispatcher::start(
        queue.clone(),
        Arc::new(StubGateway::new()),
        store.clone(),
        &dispatch_config(),
    );

    for i in 0..25 {
        queue
            .enqueue(EscalationTask::new(
                Sender::ReminderAgent,
                format!("U{i}"),
                "Reminder due",
                Priority::Routine,
            ))
            .unwrap();
    }
    queue.wait_quiescent().await;
    assert_eq!(store.entries().await.len(), 25);

    dispatcher.shutdown(None).await;
}

#[tokio::test]
async fn failing_log_sink_still_completes_tasks() {
    let queue = EscalationQueue::new();
    let dispatcher = Dispatcher::start(
        queue.clone(),
        Arc::new(StubGateway::new()),
        Arc::new(BrokenLog),
        &dispatch_config(),
    );

    for i in 0..3 {
        queue
            .enqueue(EscalationTask::new(
                Sender::HealthAgent,
                format!("U{i}"),
                "Vitals",
                Priority::Urgent,
            ))
            .unwrap();
    }
    assert!(queue.wait_quiescent_timeout(Duration::from_secs(5)).await);
    dispatcher.shutdown(None).await;
}

#[tokio::test]
async fn enqueue_after_shutdown_hands_the_task_back() {
    let store = Arc::new(MemoryStore::new());
    let queue = EscalationQueue::new();
    let dispatcher = Dispatcher::start(
        queue.clone(),
        Arc::new(StubGateway::new()),
        store.clone(),
        &dispatch_config(),
    );
    dispatcher.shutdown(None).await;

    let late = EscalationTask::new(
        Sender::HealthAgent,
        "D9",
        "late",
        Priority::Urgent,
    );
    let late_id = late.id;
    let err = queue.enqueue(late).unwrap_err();
    let QueueError::Closed(task) = err;
    assert_eq!(task.id, late_id);
    assert!(store.entries().await.is_empty());
}

#[tokio::test]
async fn libsql_store_round_trip_through_the_pipeline() {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    store
        .insert_record(&health("D1000", true, false, false))
        .await
        .unwrap();
    store
        .insert_record(&safety("D1001", true, Movement::None, "45", "Kitchen"))
        .await
        .unwrap();

    let queue = EscalationQueue::new();
    let dispatcher = Dispatcher::start(
        queue.clone(),
        Arc::new(StubGateway::new()),
        store.clone(),
        &dispatch_config(),
    );
    let processor = BatchProcessor::new(
        store.clone(),
        queue,
        Arc::new(SilentNotifier),
        AlertBudgets::default(),
    );
    processor.run_all(now()).await;
    dispatcher.shutdown(None).await;

    let recent = store.recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(store.count_persisted(Domain::Health).await.unwrap(), 1);
    assert_eq!(store.count_persisted(Domain::Safety).await.unwrap(), 1);
}
