//! In-memory collaborators: a queue store, an event source, and a job client
//! that completes everything it accepts. These back the test suite and the
//! `--dry-run` mode; nothing here survives the process.

use crate::clients::{ClientMap, JobClient};
use crate::error::{EventError, SubmitError};
use crate::queue_store::{QueueStore, StoreResult};
use crate::request::{gen_jid, ClientKind, LowData, Request};
use async_trait::async_trait;
use saltbus::events::TaggedEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Queue store over a shared map, matching deletes by record equality the
/// way the real backend matches stored documents.
#[derive(Debug, Default, Clone)]
pub struct MemQueueStore {
    queues: Arc<Mutex<HashMap<String, Vec<Request>>>>,
}

impl MemQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .expect("mem store lock")
            .get(queue)
            .map_or(0, Vec::len)
    }

    /// Snapshot of one queue's records, oldest first.
    pub fn records(&self, queue: &str) -> Vec<Request> {
        self.queues
            .lock()
            .expect("mem store lock")
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueStore for MemQueueStore {
    async fn list(&self, queue: &str) -> StoreResult<Vec<Request>> {
        Ok(self.records(queue))
    }

    async fn insert(&self, queue: &str, requests: &[Request]) -> StoreResult<()> {
        self.queues
            .lock()
            .expect("mem store lock")
            .entry(queue.to_string())
            .or_default()
            .extend_from_slice(requests);
        Ok(())
    }

    async fn delete(&self, queue: &str, requests: &[Request]) -> StoreResult<()> {
        let mut queues = self.queues.lock().expect("mem store lock");
        if let Some(stored) = queues.get_mut(queue) {
            for template in requests {
                if let Some(position) = stored.iter().position(|record| record == template) {
                    stored.remove(position);
                }
            }
        }
        Ok(())
    }
}

/// Event source over a shared buffer; `push` what the test or loopback
/// client wants the next drain to see.
#[derive(Debug, Default, Clone)]
pub struct MemEventSource {
    events: Arc<Mutex<VecDeque<TaggedEvent>>>,
}

impl MemEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: TaggedEvent) {
        self.events.lock().expect("mem events lock").push_back(event);
    }
}

#[async_trait]
impl crate::event_processor::EventSource for MemEventSource {
    async fn get_pending(&mut self) -> Result<Vec<TaggedEvent>, EventError> {
        let mut events = self.events.lock().expect("mem events lock");
        Ok(events.drain(..).collect())
    }
}

/// Job client that assigns a jid and immediately posts the matching return
/// event, so a dry run exercises the whole submit/retire cycle.
#[derive(Clone)]
pub struct LoopbackClient {
    events: MemEventSource,
}

impl LoopbackClient {
    pub fn new(events: MemEventSource) -> Self {
        Self { events }
    }
}

#[async_trait]
impl JobClient for LoopbackClient {
    async fn submit_async(&self, fun: &str, _low: &LowData) -> Result<String, SubmitError> {
        let jid = gen_jid();
        log::debug!("loopback accepted {fun} as jid {jid}");
        self.events.push(TaggedEvent {
            tag: format!("salt/job/{jid}/ret/loopback"),
            data: serde_json::json!({"fun": fun, "retcode": 0, "success": true}),
        });
        Ok(jid)
    }
}

/// A full client table backed by the loopback client.
pub fn loopback_clients(events: &MemEventSource) -> ClientMap {
    ClientKind::ALL
        .iter()
        .map(|kind| {
            (
                *kind,
                Box::new(LoopbackClient::new(events.clone())) as Box<dyn JobClient>,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputQueueConfig;
    use crate::test_fixtures::low;

    fn record(queue: &str, fun: &str) -> Request {
        Request::new(queue, low("runner", fun))
    }

    #[tokio::test]
    async fn lists_in_insertion_order() {
        let store = MemQueueStore::new();
        let first = record("foo", "one");
        let second = record("foo", "two");
        store.insert("foo", &[first.clone()]).await.unwrap();
        store.insert("foo", &[second.clone()]).await.unwrap();

        assert_eq!(store.list("foo").await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn read_all_truncates_to_capacity_and_skips_empty_queues() {
        let store = MemQueueStore::new();
        for fun in ["one", "two", "three"] {
            store.insert("foo", &[record("foo", fun)]).await.unwrap();
        }
        let queues = vec![
            InputQueueConfig {
                name: "foo".to_string(),
                capacity: 2,
            },
            InputQueueConfig {
                name: "bar".to_string(),
                capacity: 4,
            },
        ];

        let pending = store.read_all(&queues).await.unwrap();
        assert_eq!(pending["foo"].len(), 2);
        assert_eq!(pending["foo"][0].low.fun, "one");
        assert!(!pending.contains_key("bar"));
    }

    #[tokio::test]
    async fn delete_matches_by_equality() {
        let store = MemQueueStore::new();
        let keep = record("foo", "keep");
        let drop = record("foo", "drop");
        store
            .insert("foo", &[keep.clone(), drop.clone()])
            .await
            .unwrap();

        store.delete("foo", &[drop.clone()]).await.unwrap();
        assert_eq!(store.records("foo"), vec![keep]);

        // a template that matches nothing is a no-op
        store.delete("foo", &[drop]).await.unwrap();
        assert_eq!(store.len("foo"), 1);
    }

    #[tokio::test]
    async fn a_nulled_jid_template_matches_the_stored_form() {
        let store = MemQueueStore::new();
        let stored = record("foo", "test.ping");
        store.insert("foo", &[stored.clone()]).await.unwrap();

        // what the manager holds after submission
        let mut running = stored.clone();
        running.jid = Some("20170101000000000001".to_string());
        assert_ne!(running, stored);

        store.delete("foo", &[stored.delete_template()]).await.unwrap();
        assert_eq!(store.len("foo"), 0);
    }

    #[tokio::test]
    async fn mem_events_drain_once() {
        use crate::event_processor::EventSource;

        let mut source = MemEventSource::new();
        source.push(TaggedEvent {
            tag: "x".to_string(),
            data: serde_json::Value::Null,
        });

        assert_eq!(source.get_pending().await.unwrap().len(), 1);
        assert!(source.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loopback_posts_a_return_for_every_submission() {
        use crate::event_processor::EventSource;

        let mut events = MemEventSource::new();
        let client = LoopbackClient::new(events.clone());
        let jid = client
            .submit_async("test.ping", &low("runner", "test.ping"))
            .await
            .unwrap();

        let pending = events.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tag, format!("salt/job/{jid}/ret/loopback"));
    }
}
