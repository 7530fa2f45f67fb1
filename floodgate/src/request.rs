//! The request record: the unit of work this service tracks from durable
//! queue to running job.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Request ids and jids are both 20-digit local-time stamps.
pub const WIRE_ID_LEN: usize = 20;

/// Lifecycle state of a tracked request. There is no terminal state:
/// completion removes the request instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    New,
    Running,
}

/// The families of execution services a request can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Local,
    Runner,
    Wheel,
    Cloud,
}

impl ClientKind {
    pub const ALL: [ClientKind; 4] = [
        ClientKind::Local,
        ClientKind::Runner,
        ClientKind::Wheel,
        ClientKind::Cloud,
    ];

    /// Case-insensitive parse of the `client` discriminator in low data.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(ClientKind::Local),
            "runner" => Some(ClientKind::Runner),
            "wheel" => Some(ClientKind::Wheel),
            "cloud" => Some(ClientKind::Cloud),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Local => "local",
            ClientKind::Runner => "runner",
            ClientKind::Wheel => "wheel",
            ClientKind::Cloud => "cloud",
        }
    }

    /// The matching async client name on the master API.
    pub fn as_async_api(&self) -> &'static str {
        match self {
            ClientKind::Local => "local_async",
            ClientKind::Runner => "runner_async",
            ClientKind::Wheel => "wheel_async",
            ClientKind::Cloud => "cloud_async",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The job payload forwarded to the execution backend unmodified. Only the
/// client family and function name mean anything to this service; the rest
/// rides along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowData {
    pub client: String,
    pub fun: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LowData {
    pub fn new(client: impl Into<String>, fun: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            fun: fun.into(),
            extra: Map::new(),
        }
    }
}

/// A queued request as persisted on its input queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub input_queue: String,
    pub low: LowData,
    pub jid: Option<String>,
    pub request_id: String,
    pub state: RequestState,
}

impl Request {
    /// A fresh record with a newly assigned request id.
    pub fn new(input_queue: impl Into<String>, low: LowData) -> Self {
        Self {
            input_queue: input_queue.into(),
            low,
            jid: None,
            request_id: gen_jid(),
            state: RequestState::New,
        }
    }

    /// The copy handed to the store for deletion. The jid is forced back to
    /// null so the template matches the record as it was originally stored.
    pub fn delete_template(&self) -> Self {
        let mut template = self.clone();
        template.jid = None;
        template
    }
}

/// Generate a 20-digit time-ordered identifier: local time down to the
/// microsecond. Uniqueness is by timestamp resolution, same as the master's
/// own jids.
pub fn gen_jid() -> String {
    Local::now().format("%Y%m%d%H%M%S%6f").to_string()
}

/// Whether a string is a well-formed request id or jid.
pub fn is_wire_id(s: &str) -> bool {
    s.len() == WIRE_ID_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gen_jid_is_20_decimal_digits() {
        let jid = gen_jid();
        assert_eq!(jid.len(), WIRE_ID_LEN);
        assert!(jid.bytes().all(|b| b.is_ascii_digit()));
        assert!(is_wire_id(&jid));
    }

    #[test]
    fn wire_id_rejects_short_and_non_digit() {
        assert!(!is_wire_id("2016120811470530408"));
        assert!(!is_wire_id("2016120811470530408x"));
        assert!(is_wire_id("20161208114705304086"));
    }

    #[test]
    fn client_kind_parse_is_case_insensitive() {
        assert_eq!(ClientKind::parse("Runner"), Some(ClientKind::Runner));
        assert_eq!(ClientKind::parse("WHEEL"), Some(ClientKind::Wheel));
        assert_eq!(ClientKind::parse("ssh"), None);
    }

    #[test]
    fn record_serializes_to_the_stored_form() -> anyhow::Result<()> {
        let mut low = LowData::new("runner", "jobs.list_jobs");
        low.extra
            .insert("arg".to_string(), json!(["20161208114705304086"]));
        let request = Request {
            input_queue: "foo".to_string(),
            low,
            jid: None,
            request_id: "20161208114705304086".to_string(),
            state: RequestState::New,
        };

        let value = serde_json::to_value(&request)?;
        assert_eq!(
            value,
            json!({
                "input_queue": "foo",
                "low": {
                    "client": "runner",
                    "fun": "jobs.list_jobs",
                    "arg": ["20161208114705304086"]
                },
                "jid": null,
                "request_id": "20161208114705304086",
                "state": "new"
            })
        );

        let back: Request = serde_json::from_value(value)?;
        assert_eq!(back, request);
        Ok(())
    }

    #[test]
    fn delete_template_drops_the_jid() {
        let mut request = Request::new("foo", LowData::new("runner", "test.ping"));
        request.jid = Some("20161208114705304086".to_string());
        request.state = RequestState::Running;

        let template = request.delete_template();
        assert_eq!(template.jid, None);
        assert_eq!(template.request_id, request.request_id);
    }
}
