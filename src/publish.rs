//! HTTP [`Publisher`]: POSTs each notification payload as JSON to the
//! configured address.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use docgate_core::store::Publisher;

pub struct HttpPublisher {
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, address: &str, json_payload: &str) -> Result<()> {
        let resp = self
            .client
            .post(address)
            .header("Content-Type", "application/json")
            .body(json_payload.to_string())
            .send()
            .await
            .with_context(|| format!("Failed to publish to {}", address))?;

        if !resp.status().is_success() {
            bail!("publish to {} returned {}", address, resp.status());
        }
        Ok(())
    }
}
