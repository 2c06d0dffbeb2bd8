use std::sync::Arc;

use anyhow::Context;

use inbox_scheduler::config::{GoogleConfig, SchedulingConfig, ServerConfig};
use inbox_scheduler::llm::{LlmConfig, create_provider};
use inbox_scheduler::pipeline::{ClassificationRouter, FollowupTracker, MeetingScheduler};
use inbox_scheduler::server::{self, Dispatcher};
use inbox_scheduler::services::{
    GmailInbox, GoogleCalendar, LlmAgendaGenerator, LlmClassifier, LlmTimeExtractor,
};
use inbox_scheduler::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let scheduling = SchedulingConfig::from_env()?;
    let google = GoogleConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;

    eprintln!("Inbox Scheduler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Database: {}", server_config.db_path.display());
    eprintln!("   Calendar: {} ({})", scheduling.calendar_id, scheduling.calendar_time_zone);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .with_context(|| {
                format!("failed to open database at {}", server_config.db_path.display())
            })?,
    );

    // ── Collaborators ────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let inbox = Arc::new(GmailInbox::new(google.access_token.clone()));
    let calendar = Arc::new(GoogleCalendar::new(google.access_token, &scheduling));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let scheduler = MeetingScheduler::new(
        Arc::clone(&db),
        Arc::new(LlmTimeExtractor::new(llm.clone())),
        Arc::new(LlmAgendaGenerator::new(llm.clone())),
        calendar,
        scheduling,
    );
    let tracker = FollowupTracker::new(Arc::clone(&db));
    let router = ClassificationRouter::new(
        Arc::new(LlmClassifier::new(llm, server_config.classifier_mode)),
        scheduler,
        tracker,
    );
    let dispatcher = Arc::new(Dispatcher::new(inbox, router, server_config.batch_size));

    // ── Listener ─────────────────────────────────────────────────────────
    let bind_addr = server_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "Inbox scheduler listening");

    server::serve(listener, dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl+C received, shutting down...");
    })
    .await;

    Ok(())
}
