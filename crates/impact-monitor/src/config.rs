use anyhow::{bail, Context, Result};
use impact_analysis::{EngineConfig, LayoutConfig, PollingConfig};
use impact_client::{ClientConfig, DEFAULT_SERVICE_URL};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    // Impact service
    pub service_url: String,
    pub http_timeout_secs: u64,

    // Polling
    pub poll_interval_ms: u64,  // 2000
    pub poll_deadline_ms: u64,  // 60000
    pub settle_grace_ms: u64,   // 500

    // Chart
    pub large_viewport: bool,
    pub chart_width: Option<f64>,
    pub chart_height: Option<f64>,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let config = Self {
            service_url: var("IMPACT_SERVICE_URL", DEFAULT_SERVICE_URL),
            http_timeout_secs: var("IMPACT_HTTP_TIMEOUT_SECS", "10")
                .parse()
                .context("IMPACT_HTTP_TIMEOUT_SECS must be a whole number of seconds")?,

            poll_interval_ms: var("POLL_INTERVAL_MS", "2000")
                .parse()
                .context("POLL_INTERVAL_MS must be a whole number of milliseconds")?,
            poll_deadline_ms: var("POLL_DEADLINE_MS", "60000")
                .parse()
                .context("POLL_DEADLINE_MS must be a whole number of milliseconds")?,
            settle_grace_ms: var("SETTLE_GRACE_MS", "500")
                .parse()
                .context("SETTLE_GRACE_MS must be a whole number of milliseconds")?,

            large_viewport: var("LARGE_VIEWPORT", "false")
                .parse()
                .context("LARGE_VIEWPORT must be true or false")?,
            chart_width: lookup("CHART_WIDTH")
                .map(|v| v.parse())
                .transpose()
                .context("CHART_WIDTH must be a number")?,
            chart_height: lookup("CHART_HEIGHT")
                .map(|v| v.parse())
                .transpose()
                .context("CHART_HEIGHT must be a number")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_url.trim().is_empty() {
            bail!("IMPACT_SERVICE_URL is empty");
        }
        if self.http_timeout_secs == 0 {
            bail!("IMPACT_HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if self.poll_interval_ms == 0 || self.poll_deadline_ms == 0 {
            bail!("Polling interval and deadline must be greater than zero");
        }
        if self.poll_interval_ms >= self.poll_deadline_ms {
            bail!(
                "POLL_INTERVAL_MS ({}) must be shorter than POLL_DEADLINE_MS ({})",
                self.poll_interval_ms,
                self.poll_deadline_ms
            );
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.service_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            polling: PollingConfig {
                tick_interval: Duration::from_millis(self.poll_interval_ms),
                deadline: Duration::from_millis(self.poll_deadline_ms),
                settle_grace: Duration::from_millis(self.settle_grace_ms),
            },
            layout: LayoutConfig::default(),
        }
    }
}
