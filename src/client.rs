use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Method;
use tracing::{debug, info};

use crate::server::ControlResponse;

/// Talks to a running control server.
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn start(&self) -> Result<ControlResponse> {
        self.send(Method::POST, "start").await
    }

    pub async fn stop(&self) -> Result<ControlResponse> {
        self.send(Method::POST, "stop").await
    }

    pub async fn status(&self) -> Result<ControlResponse> {
        self.send(Method::GET, "status").await
    }

    /// Poll `/status` until the server answers.
    pub async fn wait_until_ready(&self, attempts: u32, delay: Duration) -> Result<()> {
        info!("Waiting for control server at {} to be ready...", self.base_url);
        for attempt in 1..=attempts {
            match self.status().await {
                Ok(_) => {
                    info!("Control server is ready");
                    return Ok(());
                }
                Err(e) => {
                    debug!("Status probe failed: {:#}", e);
                    info!(
                        "Attempt {}/{}: server not yet available, retrying in {}ms",
                        attempt,
                        attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        bail!(
            "Control server at {} did not answer after {} attempts",
            self.base_url,
            attempts
        )
    }

    // Error responses still carry a JSON body, so the HTTP status is only logged.
    async fn send(&self, method: Method, endpoint: &str) -> Result<ControlResponse> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .request(method, &url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let code = response.status();
        let body: ControlResponse = response
            .json()
            .await
            .with_context(|| format!("Unexpected response from {url} ({code})"))?;
        debug!("{} -> {} ({})", url, code, body.status);
        Ok(body)
    }
}
