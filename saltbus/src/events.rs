//! Subscription to the master event bus.
//!
//! The bus is a websocket feed of JSON text frames, one tagged event per
//! frame. Consumers drain it in finite snapshots rather than blocking on it,
//! so a quiet bus never stalls the caller's loop.

use crate::error::{BusError, BusResult};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// How long to wait for one more frame before declaring the drain finished.
const DRAIN_WAIT: Duration = Duration::from_millis(1);

/// One event off the bus: an opaque tag plus a structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEvent {
    pub tag: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lazily-connected event subscription with a non-blocking drain.
///
/// The connection is established on first use and dropped on transport
/// errors; the next call re-establishes it.
pub struct EventStream {
    endpoint: Url,
    conn: Option<WsStream>,
}

impl EventStream {
    pub fn new(endpoint: &str) -> BusResult<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            conn: None,
        })
    }

    async fn ensure_connected(&mut self) -> BusResult<()> {
        if self.conn.is_none() {
            log::info!("connecting to event bus at {}", self.endpoint);
            let (ws, _response) = connect_async(self.endpoint.as_str()).await?;
            self.conn = Some(ws);
        }
        Ok(())
    }

    /// Drain everything currently pending: poll with a short wait until a
    /// poll comes up empty, then hand back the accumulated batch.
    pub async fn get_pending(&mut self) -> BusResult<Vec<TaggedEvent>> {
        self.ensure_connected().await?;
        let Some(mut conn) = self.conn.take() else {
            return Ok(Vec::new());
        };

        let mut pending = Vec::new();
        loop {
            match timeout(DRAIN_WAIT, conn.next()).await {
                // nothing more pending right now
                Err(_elapsed) => break,
                Ok(None) => return Err(BusError::StreamClosed),
                Ok(Some(Err(err))) => return Err(err.into()),
                Ok(Some(Ok(Message::Text(raw)))) => {
                    match serde_json::from_str::<TaggedEvent>(raw.as_str()) {
                        Ok(event) => pending.push(event),
                        Err(err) => log::warn!("skipping undecodable event frame: {err}"),
                    }
                }
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                Ok(Some(Ok(Message::Close(frame)))) => {
                    log::info!("event bus closed the subscription: {frame:?}");
                    return Ok(pending);
                }
                Ok(Some(Ok(other))) => {
                    log::debug!("ignoring non-text frame: {other:?}");
                }
            }
        }
        self.conn = Some(conn);

        log::debug!("drained {} pending events", pending.len());
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_full_event_frame() -> anyhow::Result<()> {
        let event: TaggedEvent = serde_json::from_str(
            r#"{
                "tag": "salt/job/20161208114705304086/ret/saltvm",
                "data": {"jid": "20161208114705304086", "retcode": 0, "success": true}
            }"#,
        )?;
        assert_eq!(event.tag, "salt/job/20161208114705304086/ret/saltvm");
        assert_eq!(event.data["retcode"], json!(0));
        Ok(())
    }

    #[test]
    fn data_is_optional() -> anyhow::Result<()> {
        let event: TaggedEvent = serde_json::from_str(r#"{"tag": "20161208114705304086"}"#)?;
        assert_eq!(event.data, serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn rejects_tagless_frames() {
        assert!(serde_json::from_str::<TaggedEvent>(r#"{"data": {}}"#).is_err());
    }
}
