use std::time::Duration;

use crate::config::TelemetryConfig;
use crate::error::{AdvisorError, Result};
use crate::types::TelemetrySnapshot;

/// Supplies one snapshot per call. Calls may block.
pub trait TelemetrySource: Send + Sync {
    fn fetch(&self) -> Result<TelemetrySnapshot>;
}

/// One unauthenticated GET per poll, no retries.
pub struct HttpTelemetrySource {
    agent: ureq::Agent,
    url: String,
}

impl HttpTelemetrySource {
    pub fn new(cfg: &TelemetryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build();
        Self { agent, url: cfg.url() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySource for HttpTelemetrySource {
    fn fetch(&self) -> Result<TelemetrySnapshot> {
        let resp = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| AdvisorError::Fetch(e.to_string()))?;
        let body = resp
            .into_string()
            .map_err(|e| AdvisorError::Fetch(format!("reading body: {}", e)))?;
        let snap = serde_json::from_str::<TelemetrySnapshot>(&body)?.check_finite()?;
        tracing::trace!(url = %self.url, ?snap, "fetched telemetry");
        Ok(snap)
    }
}
