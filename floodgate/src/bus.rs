//! Live collaborators backed by the master API.

use crate::clients::{ClientMap, JobClient};
use crate::error::{EventError, SubmitError};
use crate::event_processor::EventSource;
use crate::queue_store::{QueueStore, StoreResult};
use crate::request::{ClientKind, LowData, Request};
use async_trait::async_trait;
use saltbus::client::BusClient;
use saltbus::events::{EventStream, TaggedEvent};
use serde_json::Value;
use std::sync::Arc;

/// Queue store backed by the master's queue runner functions.
pub struct BusQueueStore {
    bus: Arc<BusClient>,
    backend: String,
}

impl BusQueueStore {
    pub fn new(bus: Arc<BusClient>, backend: impl Into<String>) -> Self {
        Self {
            bus,
            backend: backend.into(),
        }
    }

    fn encode(requests: &[Request]) -> StoreResult<Vec<Value>> {
        requests
            .iter()
            .map(|request| serde_json::to_value(request).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl QueueStore for BusQueueStore {
    async fn list(&self, queue: &str) -> StoreResult<Vec<Request>> {
        let items = self.bus.queue_list(queue, &self.backend).await?;
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect()
    }

    async fn insert(&self, queue: &str, requests: &[Request]) -> StoreResult<()> {
        let items = Self::encode(requests)?;
        self.bus.queue_insert(queue, &items, &self.backend).await?;
        Ok(())
    }

    async fn delete(&self, queue: &str, requests: &[Request]) -> StoreResult<()> {
        let items = Self::encode(requests)?;
        self.bus.queue_delete(queue, &items, &self.backend).await?;
        Ok(())
    }
}

/// One backend family on the master API.
pub struct BusJobClient {
    bus: Arc<BusClient>,
    kind: ClientKind,
}

impl BusJobClient {
    pub fn new(bus: Arc<BusClient>, kind: ClientKind) -> Self {
        Self { bus, kind }
    }
}

#[async_trait]
impl JobClient for BusJobClient {
    async fn submit_async(&self, fun: &str, low: &LowData) -> Result<String, SubmitError> {
        let low = serde_json::to_value(low)?;
        let submission = self
            .bus
            .run_async(self.kind.as_async_api(), fun, &low)
            .await?;
        Ok(submission.jid)
    }
}

/// A handle for every client family, all over the same bus connection.
pub fn client_map(bus: &Arc<BusClient>) -> ClientMap {
    ClientKind::ALL
        .iter()
        .map(|kind| {
            (
                *kind,
                Box::new(BusJobClient::new(bus.clone(), *kind)) as Box<dyn JobClient>,
            )
        })
        .collect()
}

/// Event source over the master bus websocket.
pub struct BusEventSource {
    stream: EventStream,
}

impl BusEventSource {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl EventSource for BusEventSource {
    async fn get_pending(&mut self) -> Result<Vec<TaggedEvent>, EventError> {
        Ok(self.stream.get_pending().await?)
    }
}
