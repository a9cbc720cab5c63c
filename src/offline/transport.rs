//! Delivery of queued events to the remote backend

use std::time::Duration;

use thiserror::Error;

use super::events::{EventKind, QueuedEvent};
use crate::config::SyncConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("backend rejected event with status {status}")]
    Rejected { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Sends one event; `Ok` means the backend acknowledged it
pub trait SyncTransport: Send + Sync {
    fn send(&self, event: &QueuedEvent) -> Result<(), TransportError>;
}

/// Posts events as JSON over HTTP
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    progress_endpoint: String,
    score_endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            progress_endpoint: config.progress_endpoint.clone(),
            score_endpoint: config.score_endpoint.clone(),
        }
    }

    pub fn url_for(&self, kind: EventKind) -> String {
        let endpoint = match kind {
            EventKind::Progress => &self.progress_endpoint,
            EventKind::Score => &self.score_endpoint,
        };
        format!("{}{}", self.base_url, endpoint)
    }
}

impl SyncTransport for HttpTransport {
    fn send(&self, event: &QueuedEvent) -> Result<(), TransportError> {
        let body = event
            .wire_body()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        match self.agent.post(&self.url_for(event.kind())).send_json(body) {
            Ok(resp) if (200..300).contains(&resp.status()) => Ok(()),
            Ok(resp) => Err(TransportError::Rejected {
                status: resp.status(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(TransportError::Rejected { status }),
            Err(e) => Err(TransportError::Network(e.to_string())),
        }
    }
}
