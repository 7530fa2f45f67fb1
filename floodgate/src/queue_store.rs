//! The durable input-queue store: the crash-safe side of the pending work
//! set. The in-memory registry only ever tracks what has been read back off
//! this store.

use crate::config::InputQueueConfig;
use crate::error::StoreError;
use crate::request::Request;
use async_trait::async_trait;
use std::collections::HashMap;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Records persisted for one queue, oldest first.
    async fn list(&self, queue: &str) -> StoreResult<Vec<Request>>;

    /// Durable append.
    async fn insert(&self, queue: &str, requests: &[Request]) -> StoreResult<()>;

    /// Durable removal by record equality.
    async fn delete(&self, queue: &str, requests: &[Request]) -> StoreResult<()>;

    /// Pending records for every configured queue, each list truncated to
    /// that queue's capacity. Queues with nothing pending are omitted.
    async fn read_all(
        &self,
        queues: &[InputQueueConfig],
    ) -> StoreResult<HashMap<String, Vec<Request>>> {
        let mut pending = HashMap::new();
        for queue in queues {
            log::debug!("reading pending records for queue {:?}", queue.name);
            let mut records = self.list(&queue.name).await?;
            records.truncate(queue.capacity);
            if !records.is_empty() {
                pending.insert(queue.name.clone(), records);
            }
        }
        Ok(pending)
    }

    /// Remove submitted records from their input queues.
    async fn delete_all(&self, to_delete: &HashMap<String, Vec<Request>>) -> StoreResult<()> {
        for (queue, requests) in to_delete {
            if requests.is_empty() {
                continue;
            }
            log::debug!(
                "deleting {} submitted records from queue {queue:?}",
                requests.len()
            );
            self.delete(queue, requests).await?;
        }
        Ok(())
    }
}
