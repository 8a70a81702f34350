use std::path::{Path, PathBuf};

use taskmesh_core::EventBus;
use taskmesh_types::event::event_types;
use taskmesh_types::task::TaskSnapshot;
use tokio::fs;

use crate::error::{IngressError, IngressResult};

/// Subscribes to the event bus and mirrors every `task.snapshot` event to
/// disk, so persistence is a passive observer rather than something every
/// mutation site has to remember to call. Runs until its `JoinHandle` is
/// aborted or the bus itself is dropped.
pub fn spawn_snapshot_sync(events: EventBus, memory: MemoryWriter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = events.subscribe();
        while let Ok(sequenced) = rx.recv().await {
            if sequenced.envelope.event_type != event_types::TASK_SNAPSHOT {
                continue;
            }
            match serde_json::from_value::<TaskSnapshot>(sequenced.envelope.payload) {
                Ok(snapshot) => {
                    if let Err(err) = memory.save(&snapshot).await {
                        tracing::warn!(error = %err, "failed to persist task snapshot");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "malformed task.snapshot payload"),
            }
        }
    })
}

/// Filesystem-backed reference persistence for task snapshots, one JSON file
/// per task under `snapshot_dir/tasks/`. Writes go through a temp file plus
/// rename so a reader never observes a half-written file.
#[derive(Clone)]
pub struct MemoryWriter {
    base_dir: PathBuf,
}

impl MemoryWriter {
    pub async fn new(snapshot_dir: impl Into<PathBuf>) -> IngressResult<Self> {
        let base_dir = snapshot_dir.into();
        let tasks_dir = base_dir.join("tasks");
        fs::create_dir_all(&tasks_dir)
            .await
            .map_err(|source| IngressError::Persistence { source })?;
        Ok(Self { base_dir })
    }

    fn task_path(&self, task_id: &str) -> PathBuf {
        self.base_dir.join("tasks").join(format!("{task_id}.json"))
    }

    pub async fn save(&self, snapshot: &TaskSnapshot) -> IngressResult<()> {
        let path = self.task_path(&snapshot.task.id);
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|source| IngressError::Serialization { source })?;
        atomic_write(&path, &content).await
    }

    pub async fn load(&self, task_id: &str) -> IngressResult<TaskSnapshot> {
        let path = self.task_path(task_id);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| IngressError::Persistence { source })?;
        serde_json::from_str(&content).map_err(|source| IngressError::Serialization { source })
    }

    pub async fn list_ids(&self) -> IngressResult<Vec<String>> {
        let tasks_dir = self.base_dir.join("tasks");
        let mut entries = fs::read_dir(&tasks_dir)
            .await
            .map_err(|source| IngressError::Persistence { source })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| IngressError::Persistence { source })?
        {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }
}

async fn atomic_write(path: &Path, content: &str) -> IngressResult<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)
        .await
        .map_err(|source| IngressError::Persistence { source })?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|source| IngressError::Persistence { source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_types::task::Task;

    fn snap(id: &str) -> TaskSnapshot {
        Task::new(id, "title", "description").to_snapshot(0, 0, false)
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MemoryWriter::new(dir.path()).await.unwrap();
        writer.save(&snap("t1")).await.unwrap();

        let loaded = writer.load("t1").await.unwrap();
        assert_eq!(loaded.task.id, "t1");
    }

    #[tokio::test]
    async fn list_ids_reflects_saved_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MemoryWriter::new(dir.path()).await.unwrap();
        writer.save(&snap("a")).await.unwrap();
        writer.save(&snap("b")).await.unwrap();

        let mut ids = writer.list_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn load_missing_task_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MemoryWriter::new(dir.path()).await.unwrap();
        assert!(writer.load("nope").await.is_err());
    }
}
