//! The request manager: owns every in-flight request and drives the
//! poll/update cycle.
//!
//! Four structures track the lifecycle, and they move together:
//!
//!   - the durable input queues (behind [`QueueStore`]) hold records not yet
//!     submitted;
//!   - one [`RunQueue`] per input queue bounds how many jids are in flight;
//!   - the registry keeps the observed snapshots of every tracked request;
//!   - the jid map points each backend jid back at its request.
//!
//! `poll` moves records from the store into flight, `update` retires slots
//! when their return events arrive. The two never interleave: the driver
//! calls them in sequence on a single task, which is the whole concurrency
//! story here.

use crate::clients::ClientMap;
use crate::config::InputQueueConfig;
use crate::error::{QueueError, RequestError, SubmitError, TickError};
use crate::event_processor::{self, Completion, EventSource};
use crate::queue_store::QueueStore;
use crate::request::{is_wire_id, ClientKind, LowData, Request, RequestState};
use crate::run_queue::RunQueue;
use metrics::counter;
use saltbus::events::TaggedEvent;
use std::collections::{HashMap, VecDeque};

/// Snapshots per request id, oldest first: the pristine stored record, then
/// the running copy once a backend accepted it.
type Registry = HashMap<String, Vec<Request>>;

pub struct RequestManager {
    input_queues: Vec<InputQueueConfig>,
    queues: HashMap<String, RunQueue>,
    requests: HashMap<String, Registry>,
    jid_req_map: HashMap<String, (String, String)>,
    clients: ClientMap,
    store: Box<dyn QueueStore>,
    events: Box<dyn EventSource>,
}

impl RequestManager {
    pub fn new(
        input_queues: Vec<InputQueueConfig>,
        clients: ClientMap,
        store: Box<dyn QueueStore>,
        events: Box<dyn EventSource>,
    ) -> Self {
        let queues = input_queues
            .iter()
            .map(|q| (q.name.clone(), RunQueue::new(&q.name, q.capacity)))
            .collect();
        let requests = input_queues
            .iter()
            .map(|q| (q.name.clone(), Registry::new()))
            .collect();
        Self {
            input_queues,
            queues,
            requests,
            jid_req_map: HashMap::new(),
            clients,
            store,
            events,
        }
    }

    /// Persist a brand-new request and hand its id back to the caller.
    ///
    /// The in-memory registry is deliberately not touched here: it only ever
    /// reflects records that have been read back off the durable queue, so a
    /// restart between insert and first poll loses nothing.
    pub async fn initialize_request(
        &self,
        input_queue: &str,
        low: LowData,
    ) -> Result<String, RequestError> {
        if !self.queues.contains_key(input_queue) {
            return Err(RequestError::UnknownQueue(input_queue.to_string()));
        }
        let request = Request::new(input_queue, low);
        let request_id = request.request_id.clone();
        self.store
            .insert(input_queue, std::slice::from_ref(&request))
            .await?;
        log::debug!("new request {request_id} initialized on queue {input_queue:?}");
        Ok(request_id)
    }

    /// Read pending records off every input queue, admit as many as capacity
    /// allows, then clear the submitted ones from the durable store.
    pub async fn poll(&mut self) -> Result<(), TickError> {
        log::debug!("poll tick");
        let mut pending = self.store.read_all(&self.input_queues).await?;
        let mut to_delete: HashMap<String, Vec<Request>> = HashMap::new();

        for queue_config in &self.input_queues {
            let name = &queue_config.name;
            let Some(records) = pending.remove(name) else {
                continue;
            };
            let Some(run_queue) = self.queues.get_mut(name) else {
                continue;
            };
            let Some(registry) = self.requests.get_mut(name) else {
                continue;
            };

            let mut processor = InputQueueProcessor {
                input_queue: name,
                run_queue,
                requests: registry,
                jid_req_map: &mut self.jid_req_map,
                clients: &self.clients,
            };
            let submitted = processor.submit_pending(VecDeque::from(records)).await?;
            if submitted.is_empty() {
                continue;
            }
            counter!("floodgate_requests_submitted_total").increment(submitted.len() as u64);

            // Delete templates come from the first snapshot so they match
            // the record as it was stored.
            let Some(registry) = self.requests.get(name) else {
                continue;
            };
            let templates = submitted
                .iter()
                .filter_map(|request_id| {
                    registry
                        .get(request_id)
                        .and_then(|snapshots| snapshots.first())
                        .map(Request::delete_template)
                })
                .collect();
            to_delete.insert(name.clone(), templates);
        }

        self.store.delete_all(&to_delete).await?;
        Ok(())
    }

    /// Drain the event bus and retire every slot with a matching return.
    pub async fn update(&mut self) -> Result<(), TickError> {
        let events = self.events.get_pending().await?;
        if !events.is_empty() {
            log::debug!("processing {} pending events", events.len());
            self.process_events(&events);
        }
        Ok(())
    }

    /// Apply one batch of events to the tracking structures.
    pub fn process_events(&mut self, events: &[TaggedEvent]) {
        let completions = event_processor::parse_completions(events, &self.jid_req_map);
        self.retire(&completions);
    }

    /// Remove completed jobs from the run queue, the registry, and the jid
    /// map. Tuples that are already gone (duplicate returns) fall through
    /// harmlessly.
    fn retire(&mut self, completions: &[Completion]) {
        for done in completions {
            log::debug!(
                "retiring jid {} (request {}) from queue {:?}",
                done.jid,
                done.request_id,
                done.input_queue
            );
            if let Some(run_queue) = self.queues.get_mut(&done.input_queue) {
                run_queue.remove(&done.jid);
            }
            if let Some(registry) = self.requests.get_mut(&done.input_queue) {
                registry.remove(&done.request_id);
            }
            self.jid_req_map.remove(&done.jid);
            counter!("floodgate_requests_completed_total").increment(1);
        }
    }

    /// The observed snapshots of one tracked request, oldest first.
    pub fn get_request(&self, input_queue: &str, request_id: &str) -> Option<&[Request]> {
        self.requests
            .get(input_queue)?
            .get(request_id)
            .map(Vec::as_slice)
    }

    /// The (request id, input queue) pair a jid belongs to.
    pub fn get_req_for_jid(&self, jid: &str) -> Option<&(String, String)> {
        self.jid_req_map.get(jid)
    }

    pub fn run_queue(&self, input_queue: &str) -> Option<&RunQueue> {
        self.queues.get(input_queue)
    }
}

/// Admission control for one input queue. Borrows exactly the state it needs
/// from the manager for the duration of one poll; no back-pointer.
struct InputQueueProcessor<'a> {
    input_queue: &'a str,
    run_queue: &'a mut RunQueue,
    requests: &'a mut Registry,
    jid_req_map: &'a mut HashMap<String, (String, String)>,
    clients: &'a ClientMap,
}

impl InputQueueProcessor<'_> {
    /// Submit pending records in store order while capacity lasts. Returns
    /// the ids of the requests a backend accepted; everything it skipped
    /// stays on the durable queue for the next tick.
    async fn submit_pending(
        &mut self,
        mut pending: VecDeque<Request>,
    ) -> Result<Vec<String>, QueueError> {
        let mut submitted = Vec::new();
        while !self.run_queue.is_full() {
            let Some(request) = pending.pop_front() else {
                break;
            };

            // First observation of this stored record: register the pristine
            // snapshot. Re-observation after a failed submission must not
            // duplicate it.
            let snapshots = self.requests.entry(request.request_id.clone()).or_default();
            if snapshots.is_empty() {
                snapshots.push(request.clone());
            }

            log::debug!(
                "submitting request {} on queue {:?}",
                request.request_id,
                self.input_queue
            );
            let jid = match self.submit_one(&request).await {
                Ok(jid) => jid,
                Err(err) => {
                    log::warn!(
                        "leaving request {} on queue {:?}: {err}",
                        request.request_id,
                        self.input_queue
                    );
                    counter!("floodgate_submit_failures_total").increment(1);
                    continue;
                }
            };

            self.run_queue.add(jid.clone())?;

            let mut running = request;
            running.jid = Some(jid.clone());
            running.state = RequestState::Running;
            let request_id = running.request_id.clone();
            self.requests
                .entry(request_id.clone())
                .or_default()
                .push(running);

            self.jid_req_map
                .insert(jid, (request_id.clone(), self.input_queue.to_string()));
            submitted.push(request_id);
        }
        Ok(submitted)
    }

    /// One dispatch to the backend matching the request's client family.
    async fn submit_one(&self, request: &Request) -> Result<String, SubmitError> {
        let kind = ClientKind::parse(&request.low.client)
            .ok_or_else(|| SubmitError::UnknownClientKind(request.low.client.clone()))?;
        let client = self
            .clients
            .get(&kind)
            .ok_or_else(|| SubmitError::UnknownClientKind(request.low.client.clone()))?;
        let jid = client.submit_async(&request.low.fun, &request.low).await?;
        if !is_wire_id(&jid) {
            return Err(SubmitError::BadJid(jid));
        }
        Ok(jid)
    }
}
