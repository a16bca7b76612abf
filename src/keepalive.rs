//! Background self-ping that keeps the hosting platform from idling the
//! process.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

/// Default delay between probes (10 minutes).
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(600);

/// Shortest delay the prober accepts.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(1);

/// Longest delay the prober accepts (one day).
pub const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(86_400);

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered 200.
    Alive,
    /// The target answered with another status code.
    UnexpectedStatus(u16),
    /// The request did not complete.
    Failed(String),
}

/// Periodically requests a health endpoint and logs the outcome.
#[derive(Debug, Clone)]
pub struct LivenessProber {
    http: reqwest::Client,
    target: Url,
    interval: Duration,
}

impl LivenessProber {
    /// The interval is clamped to `MIN_PROBE_INTERVAL..=MAX_PROBE_INTERVAL`.
    #[must_use]
    pub fn new(target: Url, interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            target,
            interval: interval.clamp(MIN_PROBE_INTERVAL, MAX_PROBE_INTERVAL),
        }
    }

    #[must_use]
    pub fn target(&self) -> &Url {
        &self.target
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request the target once.
    pub async fn probe_once(&self) -> ProbeOutcome {
        match self.http.get(self.target.clone()).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => ProbeOutcome::Alive,
            Ok(resp) => ProbeOutcome::UnexpectedStatus(resp.status().as_u16()),
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }

    /// Probe forever, one interval apart, starting one interval from now.
    ///
    /// Failures are logged and never end the loop.
    pub async fn run(self) {
        tracing::info!(
            name: "keepalive.started",
            target_url = %self.target,
            interval_secs = self.interval.as_secs(),
            "Liveness prober started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.probe_once().await {
                ProbeOutcome::Alive => tracing::info!(target_url = %self.target, "Ping successful"),
                ProbeOutcome::UnexpectedStatus(status) => {
                    tracing::warn!(target_url = %self.target, status, "Ping failed with status code");
                }
                ProbeOutcome::Failed(error) => {
                    tracing::error!(target_url = %self.target, error = %error, "Ping failed with exception");
                }
            }
        }
    }
}
