use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::SinkSection;

use super::Event;

/// Delivery seam between the orchestrator and the outside world.
/// `send` reports acceptance and never fails outward.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &Event) -> bool;
}

/// Synchronous HTTP delivery to `<sink>/api/events` with bounded retry.
/// Runs on the hit thread by design: worst-case added latency is the
/// retry budget times the backoff, never unbounded.
pub struct HttpEmitter {
    client: Client,
    endpoint: String,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpEmitter {
    pub fn new(config: &SinkSection) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()
            .context("unable to build event sink client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/events", config.url.trim_end_matches('/')),
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    fn attempt(&self, event: &Event) -> Result<StatusCode> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .context("event sink unreachable")?;
        Ok(res.status())
    }
}

impl EventSink for HttpEmitter {
    fn send(&self, event: &Event) -> bool {
        for attempt in 0..self.max_retries {
            match self.attempt(event) {
                Ok(status) if status.is_success() => return true,
                Ok(status) if status.is_client_error() => {
                    // the event itself is bad, retrying cannot help
                    tracing::warn!(%status, probe_id = %event.probe_id, "event rejected by sink");
                    return false;
                }
                Ok(status) => {
                    tracing::debug!(%status, attempt, "event sink error, will retry");
                }
                Err(err) => {
                    tracing::debug!(%err, attempt, "event send failed, will retry");
                }
            }

            if attempt + 1 < self.max_retries {
                thread::sleep(self.base_delay * 2u32.saturating_pow(attempt));
            }
        }

        tracing::warn!(
            probe_id = %event.probe_id,
            retries = self.max_retries,
            "dropping event after exhausting retries"
        );
        false
    }
}

/// In-memory sink for tests and offline capture.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &Event) -> bool {
        self.events.lock().push(event.clone());
        true
    }
}
