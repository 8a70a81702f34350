use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use taskmesh_types::event::EventEnvelope;

/// One ring-buffered entry: the envelope plus the monotonic sequence number
/// it was assigned at publish time.
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    pub seq: u64,
    pub envelope: EventEnvelope,
}

struct RingState {
    buffer: VecDeque<SequencedEvent>,
    capacity: usize,
    dropped_total: u64,
}

impl RingState {
    fn push(&mut self, event: SequencedEvent) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped_total += 1;
        }
        self.buffer.push_back(event);
    }
}

/// Per-process event bus: a broadcast channel for live subscribers plus a
/// bounded, sequence-numbered ring buffer so a subscriber that joins late can
/// replay recent history. The sequence counter and
/// ring buffer are the only process-wide mutable state this crate owns
/// outside of per-task structures.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SequencedEvent>,
    seq: Arc<AtomicU64>,
    ring: Arc<RwLock<RingState>>,
}

impl EventBus {
    pub fn new(ring_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
            ring: Arc::new(RwLock::new(RingState {
                buffer: VecDeque::with_capacity(ring_capacity),
                capacity: ring_capacity.max(1),
                dropped_total: 0,
            })),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.tx.subscribe()
    }

    /// Assigns the next sequence number, appends to the ring buffer, and
    /// fans out to live subscribers. A publish with no subscribers still
    /// lands in the ring buffer — publishing with zero subscribers never
    /// panics or blocks.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        task_id: Option<String>,
        payload: Value,
    ) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::new(seq, event_type, task_id, payload);
        let sequenced = SequencedEvent { seq, envelope };

        {
            let mut ring = self.ring.write().await;
            ring.push(sequenced.clone());
        }

        let _ = self.tx.send(sequenced);
        seq
    }

    /// Returns up to `last_n` most recent events, oldest first.
    pub async fn recent(&self, last_n: usize) -> Vec<SequencedEvent> {
        let ring = self.ring.read().await;
        let skip = ring.buffer.len().saturating_sub(last_n);
        ring.buffer.iter().skip(skip).cloned().collect()
    }

    /// Returns every buffered event with `seq > since`, for a client
    /// resubscribing after an ordinary reconnect.
    pub async fn since(&self, since: u64) -> Vec<SequencedEvent> {
        let ring = self.ring.read().await;
        ring.buffer
            .iter()
            .filter(|e| e.seq > since)
            .cloned()
            .collect()
    }

    pub async fn dropped_total(&self) -> u64 {
        self.ring.read().await.dropped_total
    }

    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pub_(bus: &EventBus, kind: &str) -> u64 {
        bus.publish(kind, None, serde_json::json!({})).await
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic() {
        let bus = EventBus::new(10);
        let s1 = pub_(&bus, "a").await;
        let s2 = pub_(&bus, "b").await;
        assert!(s2 > s1);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_past_capacity() {
        let bus = EventBus::new(2);
        pub_(&bus, "a").await;
        pub_(&bus, "b").await;
        pub_(&bus, "c").await;

        let recent = bus.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].envelope.event_type, "b");
        assert_eq!(recent[1].envelope.event_type, "c");
        assert_eq!(bus.dropped_total().await, 1);
    }

    #[tokio::test]
    async fn since_filters_strictly_greater() {
        let bus = EventBus::new(10);
        let s1 = pub_(&bus, "a").await;
        pub_(&bus, "b").await;

        let tail = bus.since(s1).await;
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].envelope.event_type, "b");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(5);
        pub_(&bus, "a").await;
    }
}
