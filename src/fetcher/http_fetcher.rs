use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Plain HTTP page fetcher with browser emulation and retry.
pub struct HttpFetcher {
    client: Client,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new(max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .emulation(Emulation::Firefox136)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(HttpFetcher {
            client,
            max_retries: max_retries.max(1),
        })
    }

    /// Fetch a page, retrying transient failures with exponential backoff
    /// and jitter.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut attempts = 0;

        while attempts < self.max_retries {
            match self.fetch_once(url).await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    attempts += 1;
                    if attempts < self.max_retries {
                        let delay = Duration::from_millis(
                            1000 * (2_u64.pow(attempts as u32)) + (rand::random::<u64>() % 1000),
                        );
                        warn!(
                            "Fetch {}/{} of {} failed ({}), next try in {:?}",
                            attempts, self.max_retries, url, e, delay
                        );
                        sleep(delay).await;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(anyhow!(
            "giving up on {} after {} attempts",
            url,
            self.max_retries
        ))
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("server answered {}", response.status()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| anyhow!("body could not be read: {}", e))?;

        if html.is_empty() {
            return Err(anyhow!("empty response body"));
        }
        if !html.contains("<html") && !html.contains("<div") && !html.contains("<body") {
            return Err(anyhow!("response carries no HTML markup"));
        }

        info!("Fetched {} ({} bytes)", url, html.len());
        Ok(html)
    }
}
