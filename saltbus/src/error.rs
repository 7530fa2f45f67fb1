use serde_json::Value;
use thiserror::Error;

pub type BusResult<T> = Result<T, BusError>;

/// Errors talking to the master API or its event bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bad endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("websocket transport: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("event subscription closed")]
    StreamClosed,

    #[error("api returned an empty return list")]
    EmptyReturn,

    #[error("submission response carries no jid: {0}")]
    MissingJid(Value),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(Value),
}
