//! Shared test helpers: the canonical event sequence the master emits around
//! one job, and a scripted backend client.

use crate::clients::JobClient;
use crate::error::SubmitError;
use crate::request::LowData;
use async_trait::async_trait;
use saltbus::events::TaggedEvent;
use saltbus::BusError;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// The three events observed around one job: the bare announcement, the
/// `/new` broadcast, and the per-minion return. Only the last one matters to
/// the event processor.
pub(crate) fn events_for(jid: &str) -> Vec<TaggedEvent> {
    vec![
        TaggedEvent {
            tag: jid.to_string(),
            data: json!({
                "_stamp": "2016-12-08T16:47:05.305210",
                "minions": ["saltvm"]
            }),
        },
        TaggedEvent {
            tag: format!("salt/job/{jid}/new"),
            data: json!({
                "tgt_type": "glob",
                "jid": jid,
                "tgt": "*.local",
                "_stamp": "2016-12-08T16:47:05.305601",
                "user": "salt",
                "arg": [],
                "fun": "test.ping",
                "minions": ["saltvm"]
            }),
        },
        TaggedEvent {
            tag: format!("salt/job/{jid}/ret/saltvm"),
            data: json!({
                "fun_args": [],
                "jid": jid,
                "return": true,
                "retcode": 0,
                "success": true,
                "cmd": "_return",
                "_stamp": "2016-12-08T16:47:05.374480",
                "fun": "test.ping",
                "id": "saltvm",
                "metadata": {"foo": "bar"}
            }),
        },
    ]
}

pub(crate) fn low(client: &str, fun: &str) -> LowData {
    LowData::new(client, fun)
}

/// Backend that hands out scripted jids (or failures) in order and records
/// the function names it was called with. Once the script runs out it keeps
/// accepting with generated jids.
pub(crate) struct ScriptedClient {
    jids: Mutex<VecDeque<Result<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedClient {
    pub(crate) fn new(jids: Vec<Result<&str, &str>>, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            jids: Mutex::new(
                jids.into_iter()
                    .map(|jid| {
                        jid.map(str::to_string)
                            .map_err(str::to_string)
                    })
                    .collect(),
            ),
            calls,
        }
    }
}

#[async_trait]
impl JobClient for ScriptedClient {
    async fn submit_async(&self, fun: &str, _low: &LowData) -> Result<String, SubmitError> {
        self.calls.lock().unwrap().push(fun.to_string());
        match self.jids.lock().unwrap().pop_front() {
            Some(Ok(jid)) => Ok(jid),
            Some(Err(body)) => Err(SubmitError::Backend(BusError::Status {
                status: 500,
                body,
            })),
            None => Ok(crate::request::gen_jid()),
        }
    }
}
