use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use taskmesh_core::EventBus;
use taskmesh_types::event::event_types;
use taskmesh_types::task::TaskSnapshot;

/// Passive, in-memory authoritative snapshot store. Never
/// drives any transition itself — coordinators write their own snapshots
/// here after every state change, and readers (the HTTP ingress, the
/// `memory.bootstrap` event) only ever see copies.
#[derive(Clone)]
pub struct TaskRegistry {
    snapshots: Arc<RwLock<HashMap<String, TaskSnapshot>>>,
    events: EventBus,
}

impl TaskRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub async fn register(&self, snapshot: TaskSnapshot) {
        let task_id = snapshot.task.id.clone();
        self.snapshots.write().await.insert(task_id, snapshot);
    }

    pub async fn update(&self, snapshot: TaskSnapshot) {
        let task_id = snapshot.task.id.clone();
        let payload = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
        self.snapshots.write().await.insert(task_id.clone(), snapshot);
        self.events
            .publish(event_types::TASK_SNAPSHOT, Some(task_id), payload)
            .await;
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.snapshots.read().await.get(task_id).cloned()
    }

    pub async fn list(&self) -> Vec<TaskSnapshot> {
        self.snapshots.read().await.values().cloned().collect()
    }

    pub async fn children_of(&self, parent_task_id: &str) -> Vec<TaskSnapshot> {
        self.snapshots
            .read()
            .await
            .values()
            .filter(|s| s.task.parent_task_id.as_deref() == Some(parent_task_id))
            .cloned()
            .collect()
    }

    /// Emits one `memory.bootstrap` event carrying every known snapshot, for
    /// a client that connects after the runtime has already been running.
    pub async fn bootstrap(&self) {
        let all = self.list().await;
        let payload = serde_json::to_value(&all).unwrap_or(serde_json::Value::Null);
        self.events
            .publish(event_types::MEMORY_BOOTSTRAP, None, payload)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_types::task::Task;

    fn snap(id: &str, parent: Option<&str>) -> TaskSnapshot {
        let mut task = Task::new(id, "t", "d");
        task.parent_task_id = parent.map(|s| s.to_string());
        task.to_snapshot(0, 0, false)
    }

    #[tokio::test]
    async fn register_then_get_roundtrips() {
        let registry = TaskRegistry::new(EventBus::new(10));
        registry.register(snap("t1", None)).await;
        let got = registry.get("t1").await.unwrap();
        assert_eq!(got.task.id, "t1");
    }

    #[tokio::test]
    async fn children_of_filters_by_parent() {
        let registry = TaskRegistry::new(EventBus::new(10));
        registry.register(snap("parent", None)).await;
        registry.register(snap("child-a", Some("parent"))).await;
        registry.register(snap("child-b", Some("parent"))).await;
        registry.register(snap("unrelated", None)).await;

        let mut children: Vec<String> = registry
            .children_of("parent")
            .await
            .into_iter()
            .map(|s| s.task.id)
            .collect();
        children.sort();
        assert_eq!(children, vec!["child-a".to_string(), "child-b".to_string()]);
    }

    #[tokio::test]
    async fn update_publishes_a_snapshot_event() {
        let bus = EventBus::new(10);
        let registry = TaskRegistry::new(bus.clone());
        let mut rx = bus.subscribe();
        registry.update(snap("t1", None)).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.envelope.event_type, event_types::TASK_SNAPSHOT);
    }
}
