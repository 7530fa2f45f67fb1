//! The seam to the execution backends.

use crate::error::SubmitError;
use crate::request::{ClientKind, LowData};
use async_trait::async_trait;
use std::collections::HashMap;

/// Handle to one family of execution services.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit a job without waiting for it to run; returns the
    /// backend-assigned jid.
    async fn submit_async(&self, fun: &str, low: &LowData) -> Result<String, SubmitError>;
}

/// Backend handles keyed by the client discriminator in low data.
pub type ClientMap = HashMap<ClientKind, Box<dyn JobClient>>;
