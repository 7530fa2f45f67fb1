//! HTTP client for the master API.
//!
//! Everything goes through the `/run` endpoint: async job submissions on one
//! of the client families, and synchronous runner calls for the queue
//! functions backing the durable input queues.

use crate::error::{BusError, BusResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

/// A successfully accepted async submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub jid: String,
}

/// Envelope every API response comes wrapped in.
#[derive(Debug, Deserialize)]
struct ReturnEnvelope {
    #[serde(rename = "return")]
    ret: Vec<Value>,
}

pub struct BusClient {
    http: reqwest::Client,
    run_url: Url,
    token: Option<String>,
}

impl BusClient {
    pub fn new(api_url: &str, token: Option<String>) -> BusResult<Self> {
        let base = Url::parse(api_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            run_url: base.join("run")?,
            token,
        })
    }

    /// POST one command to `/run` and unwrap the first returned value.
    async fn call(&self, body: &Value) -> BusResult<Value> {
        let mut request = self.http.post(self.run_url.clone()).json(body);
        if let Some(token) = &self.token {
            request = request.header("X-Auth-Token", token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BusError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: ReturnEnvelope = response.json().await?;
        envelope.ret.into_iter().next().ok_or(BusError::EmptyReturn)
    }

    /// Fire a job on one of the async client families; returns as soon as
    /// the master assigns a jid.
    pub async fn run_async(&self, client: &str, fun: &str, low: &Value) -> BusResult<Submission> {
        let body = build_run_body(client, fun, low);
        let first = self.call(&body).await?;
        match extract_jid(&first) {
            Some(jid) => Ok(Submission {
                jid: jid.to_string(),
            }),
            None => Err(BusError::MissingJid(first)),
        }
    }

    /// Call a runner function synchronously and return its value.
    pub async fn runner(&self, fun: &str, kwargs: Value) -> BusResult<Value> {
        let mut body = match kwargs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("client".to_string(), json!("runner"));
        body.insert("fun".to_string(), json!(fun));
        self.call(&Value::Object(body)).await
    }

    /// Records persisted on one input queue, oldest first.
    pub async fn queue_list(&self, queue: &str, backend: &str) -> BusResult<Vec<Value>> {
        let listed = self
            .runner(
                "queue.list_items",
                json!({"queue": queue, "backend": backend}),
            )
            .await?;
        match listed {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(BusError::UnexpectedShape(other)),
        }
    }

    /// Durable append of records to one input queue.
    pub async fn queue_insert(&self, queue: &str, items: &[Value], backend: &str) -> BusResult<()> {
        self.runner(
            "queue.insert",
            json!({"queue": queue, "items": items, "backend": backend}),
        )
        .await?;
        Ok(())
    }

    /// Durable removal of records from one input queue, matched by value.
    pub async fn queue_delete(&self, queue: &str, items: &[Value], backend: &str) -> BusResult<()> {
        self.runner(
            "queue.delete",
            json!({"queue": queue, "items": items, "backend": backend}),
        )
        .await?;
        Ok(())
    }
}

/// Body for an async submission: the low data with the client family and
/// function spliced in.
fn build_run_body(client: &str, fun: &str, low: &Value) -> Value {
    let mut body = match low {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    body.insert("client".to_string(), json!(client));
    body.insert("fun".to_string(), json!(fun));
    Value::Object(body)
}

fn extract_jid(value: &Value) -> Option<&str> {
    value.get("jid").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_body_splices_client_and_fun_over_low() {
        let low = json!({
            "client": "runner",
            "fun": "jobs.list_jobs",
            "arg": ["x"]
        });
        let body = build_run_body("runner_async", "jobs.list_jobs", &low);
        assert_eq!(body["client"], json!("runner_async"));
        assert_eq!(body["fun"], json!("jobs.list_jobs"));
        assert_eq!(body["arg"], json!(["x"]));
    }

    #[test]
    fn run_body_tolerates_non_object_low() {
        let body = build_run_body("wheel_async", "key.list_all", &Value::Null);
        assert_eq!(body["client"], json!("wheel_async"));
        assert_eq!(body["fun"], json!("key.list_all"));
    }

    #[test]
    fn decodes_the_return_envelope() -> anyhow::Result<()> {
        let envelope: ReturnEnvelope = serde_json::from_str(
            r#"{"return": [{"jid": "20161208114705304086", "minions": ["saltvm"]}]}"#,
        )?;
        let first = envelope.ret.into_iter().next().expect("one return value");
        assert_eq!(extract_jid(&first), Some("20161208114705304086"));
        Ok(())
    }

    #[test]
    fn missing_jid_is_detected() {
        assert_eq!(extract_jid(&json!({"minions": []})), None);
        assert_eq!(extract_jid(&json!({"jid": 42})), None);
    }
}
