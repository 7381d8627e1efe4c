use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use eldercare_dispatch::config::PipelineConfig;
use eldercare_dispatch::llm::OllamaGateway;
use eldercare_dispatch::notify::SpeechNotifier;
use eldercare_dispatch::pipeline::{BatchProcessor, Domain};
use eldercare_dispatch::store::{CommunicationLog, LibSqlBackend, RecordStore};
use eldercare_dispatch::worker::{Dispatcher, EscalationQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("Invalid configuration")?;

    // Held for the process lifetime so buffered log lines are flushed.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("Eldercare dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Model: {} (via {})",
        config.inference.model, config.inference.program
    );
    eprintln!("   Dispatch pool width: {}", config.dispatch.pool_width);

    // ── Database ─────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Dispatcher must be running before anything is enqueued ──────────
    let queue = EscalationQueue::new();
    let gateway = Arc::new(OllamaGateway::new(config.inference.clone()));
    let dispatcher = Dispatcher::start(queue.clone(), gateway, store.clone(), &config.dispatch);

    // ── Evaluate every domain ────────────────────────────────────────────
    let notifier = Arc::new(SpeechNotifier::new(config.notify.clone()));
    let processor = BatchProcessor::new(store.clone(), queue, notifier, config.budgets);

    let now = Local::now().naive_local();
    for (domain, result) in Domain::all().iter().zip(processor.run_all(now).await) {
        match result {
            Ok(report) => info!(
                %domain,
                evaluated = report.evaluated,
                escalated = report.escalated,
                malformed = report.malformed,
                suppressed = report.suppressed_by_budget,
                "Domain evaluated"
            ),
            Err(e) => error!(%domain, "Failed to fetch records: {e}"),
        }
    }

    // ── Drain, then stop ─────────────────────────────────────────────────
    info!(
        outstanding = dispatcher.queue().outstanding(),
        "Waiting for escalation queue to drain"
    );
    dispatcher.shutdown(config.dispatch.drain_timeout).await;

    print_summary(store.as_ref()).await?;
    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "eldercare-dispatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Per-agent totals: records evaluated and escalations logged.
async fn print_summary(store: &LibSqlBackend) -> anyhow::Result<()> {
    let logged = store
        .count_by_sender()
        .await
        .context("Failed to read communication log")?;

    println!("\nAgent summary");
    println!("{:<15} {:>10} {:>12}", "Agent", "Evaluated", "LLM alerts");
    for &domain in Domain::all() {
        let evaluated = store
            .count_persisted(domain)
            .await
            .context("Failed to count evaluated records")?;
        let sender = domain.sender();
        let alerts = logged.get(sender.as_str()).copied().unwrap_or(0);
        println!("{:<15} {:>10} {:>12}", sender.as_str(), evaluated, alerts);
    }
    Ok(())
}
