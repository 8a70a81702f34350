use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use taskmesh_types::blackboard::{BlackboardEntry, BlackboardScope};

use crate::event_bus::EventBus;

/// Stigmergy store shared by every role: a global scope plus one namespace
/// per task. Reads return owned clones so a caller
/// can never hold a lock across an `.await` by borrowing into the map.
#[derive(Clone)]
pub struct Blackboard {
    global: Arc<RwLock<HashMap<String, BlackboardEntry>>>,
    per_task: Arc<RwLock<HashMap<String, HashMap<String, BlackboardEntry>>>>,
    events: EventBus,
}

impl Blackboard {
    pub fn new(events: EventBus) -> Self {
        Self {
            global: Arc::new(RwLock::new(HashMap::new())),
            per_task: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub async fn set_global(&self, key: impl Into<String>, value: Value, writer: impl Into<String>) {
        let key = key.into();
        let entry = BlackboardEntry {
            scope: BlackboardScope::Global,
            task_id: None,
            key: key.clone(),
            value,
            last_writer: writer.into(),
            at: Utc::now(),
        };
        self.global.write().await.insert(key, entry.clone());
        self.emit_change(&entry).await;
    }

    pub async fn get_global(&self, key: &str) -> Option<BlackboardEntry> {
        self.global.read().await.get(key).cloned()
    }

    pub async fn set_task(
        &self,
        task_id: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        writer: impl Into<String>,
    ) {
        let task_id = task_id.into();
        let key = key.into();
        let entry = BlackboardEntry {
            scope: BlackboardScope::Task,
            task_id: Some(task_id.clone()),
            key: key.clone(),
            value,
            last_writer: writer.into(),
            at: Utc::now(),
        };
        self.per_task
            .write()
            .await
            .entry(task_id)
            .or_default()
            .insert(key, entry.clone());
        self.emit_change(&entry).await;
    }

    pub async fn get_task(&self, task_id: &str, key: &str) -> Option<BlackboardEntry> {
        self.per_task
            .read()
            .await
            .get(task_id)
            .and_then(|m| m.get(key))
            .cloned()
    }

    /// Every entry for a task, used when seeding a sub-task's initial view
    /// or building a snapshot.
    pub async fn task_snapshot(&self, task_id: &str) -> Vec<BlackboardEntry> {
        self.per_task
            .read()
            .await
            .get(task_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn global_snapshot(&self) -> Vec<BlackboardEntry> {
        self.global.read().await.values().cloned().collect()
    }

    /// Removes a task's namespace entirely. Called once a task reaches a
    /// terminal status and its working data is no longer needed in memory.
    pub async fn clear_task(&self, task_id: &str) {
        self.per_task.write().await.remove(task_id);
    }

    async fn emit_change(&self, entry: &BlackboardEntry) {
        let payload = serde_json::to_value(entry).unwrap_or(Value::Null);
        self.events
            .publish(
                taskmesh_types::event::event_types::TASK_TRANSITION,
                entry.task_id.clone(),
                payload,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_scope_is_isolated_from_global() {
        let bb = Blackboard::new(EventBus::new(10));
        bb.set_task("t1", "k", serde_json::json!(1), "worker").await;
        bb.set_global("k", serde_json::json!(2), "worker").await;

        assert_eq!(
            bb.get_task("t1", "k").await.unwrap().value,
            serde_json::json!(1)
        );
        assert_eq!(bb.get_global("k").await.unwrap().value, serde_json::json!(2));
    }

    #[tokio::test]
    async fn reads_are_copies_not_references() {
        let bb = Blackboard::new(EventBus::new(10));
        bb.set_task("t1", "k", serde_json::json!("v1"), "worker").await;
        let mut first = bb.get_task("t1", "k").await.unwrap();
        first.value = serde_json::json!("mutated-locally");

        let second = bb.get_task("t1", "k").await.unwrap();
        assert_eq!(second.value, serde_json::json!("v1"));
    }

    #[tokio::test]
    async fn clear_task_drops_its_namespace() {
        let bb = Blackboard::new(EventBus::new(10));
        bb.set_task("t1", "k", serde_json::json!(1), "worker").await;
        bb.clear_task("t1").await;
        assert!(bb.get_task("t1", "k").await.is_none());
    }
}
