use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use taskmesh_core::Blackboard;
use taskmesh_coordinator::{Supervisor, TaskRegistry};
use taskmesh_observability::{init_process_logging, ProcessKind};
use taskmesh_server::{router, spawn_snapshot_sync, AppState, MemoryWriter};
use taskmesh_types::config::RuntimeConfig;

fn config_path() -> PathBuf {
    std::env::var("TASKMESH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./taskmesh.yaml"))
}

fn load_config(path: &std::path::Path) -> anyhow::Result<RuntimeConfig> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Repopulates the registry from disk without re-emitting `task.snapshot`
/// events for each entry — only the single `memory.bootstrap` the caller
/// emits afterward should announce the backlog to subscribers.
async fn restore_from_disk(registry: &TaskRegistry, memory: &MemoryWriter) -> anyhow::Result<()> {
    for task_id in memory.list_ids().await? {
        match memory.load(&task_id).await {
            Ok(snapshot) => registry.register(snapshot).await,
            Err(err) => tracing::warn!(task_id = %task_id, error = %err, "failed to restore task snapshot"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(&config_path())?;
    config.validate()?;

    let (_guard, log_info) = init_process_logging(ProcessKind::Server, &config.logs_dir, 14)?;
    tracing::info!(logs_dir = %log_info.logs_dir, prefix = %log_info.prefix, "logging initialized");

    let events = taskmesh_core::EventBus::new(config.event_buffer_size);
    let registry = TaskRegistry::new(events.clone());
    let blackboard = Blackboard::new(events.clone());
    let memory = MemoryWriter::new(config.snapshot_dir.clone()).await?;

    restore_from_disk(&registry, &memory).await?;

    let bind_addr: SocketAddr = config.http_bind_addr.parse()?;
    let supervisor = Arc::new(Supervisor::new(config, events.clone(), registry, blackboard));
    supervisor.registry().await.bootstrap().await;

    let persistence_sync = spawn_snapshot_sync(events.clone(), memory.clone());

    let state_supervisor = supervisor.clone();
    let state = AppState {
        supervisor,
        events,
        memory,
    };
    let app = router(state);

    tracing::info!(addr = %bind_addr, "taskmesh daemon listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state_supervisor))
        .await?;

    persistence_sync.abort();
    Ok(())
}

/// Waits for Ctrl-C, then cancels the Supervisor's cooperative shutdown
/// token so in-flight requests stop dispatching new roles while axum drains
/// the handlers that are already running.
async fn shutdown_signal(supervisor: Arc<Supervisor>) {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    supervisor.shutdown();
}
