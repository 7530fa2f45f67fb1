//! Service configuration.
//!
//! The document is shared with unrelated subsystems on the same master, so
//! anything this service does not recognise is ignored.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOOP_INTERVAL: f64 = 5.0;
pub const DEFAULT_QUEUE_BACKEND: &str = "pgjsonb";

/// One named input queue and its in-flight capacity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputQueueConfig {
    pub name: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input_queues: Vec<InputQueueConfig>,

    /// Seconds between driver ticks; fractional values allowed.
    #[serde(default = "default_loop_interval")]
    pub loop_interval: f64,

    /// Master HTTP API endpoint, e.g. `https://master:8000/`.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Event bus websocket endpoint, e.g. `wss://master:8000/ws`.
    #[serde(default)]
    pub event_url: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    /// Backend tag handed to the queue runner functions.
    #[serde(default = "default_queue_backend")]
    pub queue_backend: String,

    /// Expose prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,

    /// Accepted for compatibility with the shared master document and handed
    /// through to the event-source constructor; the websocket transport has
    /// no use for them.
    #[serde(default)]
    pub sock_dir: Option<PathBuf>,
    #[serde(default)]
    pub transport: Option<String>,
}

fn default_loop_interval() -> f64 {
    DEFAULT_LOOP_INTERVAL
}

fn default_queue_backend() -> String {
    DEFAULT_QUEUE_BACKEND.to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for queue in &self.input_queues {
            if !seen.insert(queue.name.as_str()) {
                return Err(ConfigError::DuplicateQueue(queue.name.clone()));
            }
            if queue.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(queue.name.clone()));
            }
        }
        if !(self.loop_interval > 0.0) {
            return Err(ConfigError::BadInterval(self.loop_interval));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Config {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn parses_queues_in_order_and_ignores_unknown_keys() {
        let config = parse(
            r#"
            loop_interval = 0.5
            api_url = "https://master:8000/"
            event_url = "wss://master:8000/ws"
            interface = "0.0.0.0"
            worker_threads = 5

            [[input_queues]]
            name = "foo"
            capacity = 16

            [[input_queues]]
            name = "bar"
            capacity = 7
            "#,
        );
        assert_eq!(
            config.input_queues,
            vec![
                InputQueueConfig {
                    name: "foo".to_string(),
                    capacity: 16,
                },
                InputQueueConfig {
                    name: "bar".to_string(),
                    capacity: 7,
                },
            ]
        );
        assert_eq!(config.loop_interval, 0.5);
        assert_eq!(config.queue_backend, DEFAULT_QUEUE_BACKEND);
        config.validate().unwrap();
    }

    #[test]
    fn defaults_apply_to_an_empty_document() {
        let config = parse("");
        assert!(config.input_queues.is_empty());
        assert_eq!(config.loop_interval, DEFAULT_LOOP_INTERVAL);
        assert_eq!(config.metrics_listen, None);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_duplicate_queue_names() {
        let config = parse(
            r#"
            [[input_queues]]
            name = "foo"
            capacity = 1

            [[input_queues]]
            name = "foo"
            capacity = 2
            "#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateQueue(name)) if name == "foo"
        ));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = parse(
            r#"
            [[input_queues]]
            name = "foo"
            capacity = 0
            "#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroCapacity(name)) if name == "foo"
        ));
    }

    #[test]
    fn rejects_non_positive_interval() {
        let config = parse("loop_interval = 0.0");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadInterval(_))
        ));
    }
}
