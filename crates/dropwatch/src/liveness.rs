//! Liveness surface: an always-OK HTTP responder and the self-wake pinger.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PING_TIMEOUT: Duration = Duration::from_secs(10);

async fn ok() -> &'static str {
    "OK"
}

/// Every path and method answers `200 OK`.
pub fn router() -> Router {
    Router::new().fallback(ok)
}

pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("liveness listener address")?;
    info!("liveness endpoint listening on http://{}", addr);

    axum::serve(listener, router())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("liveness server error")?;
    Ok(())
}

/// Periodic GET against our own public URL so the host does not idle us out.
pub struct SelfPinger {
    url: String,
    every: Duration,
    http: reqwest::Client,
}

impl SelfPinger {
    pub fn new(url: impl Into<String>, every: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PING_TIMEOUT)
            .build()
            .context("self-ping http client")?;
        Ok(Self {
            url: url.into(),
            every,
            http,
        })
    }

    pub async fn ping_once(&self) -> Result<reqwest::StatusCode> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("self-ping {}", self.url))?;
        Ok(resp.status())
    }

    /// First ping after one full interval; failures only show up at debug level.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(url = %self.url, every_secs = self.every.as_secs(), "self-ping enabled");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.ping_once().await {
                Ok(status) => debug!(%status, "self-ping"),
                Err(e) => debug!(error = %e, "self-ping failed"),
            }
        }
    }
}
