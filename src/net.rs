//! Link throughput probing and classification.
//!
//! The probe runs once per upload attempt; its result is ephemeral and
//! never persisted. It drives both the adaptive compression policy and
//! the synthetic progress estimate.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::NetworkConfig;

/// Coarse classification of the current link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTier {
    Slow,
    Normal,
}

/// Measured (or assumed) link quality for one upload attempt.
#[derive(Debug, Clone, Copy)]
pub struct NetworkClass {
    pub throughput_bytes_per_sec: f64,
    pub tier: LinkTier,
}

impl NetworkClass {
    /// Derive the tier from a throughput estimate.
    pub fn classify(throughput_bytes_per_sec: f64, slow_threshold_bytes_per_sec: f64) -> Self {
        let tier = if throughput_bytes_per_sec < slow_threshold_bytes_per_sec {
            LinkTier::Slow
        } else {
            LinkTier::Normal
        };
        Self {
            throughput_bytes_per_sec,
            tier,
        }
    }

    pub fn is_slow(&self) -> bool {
        self.tier == LinkTier::Slow
    }
}

/// Link estimation seam. The HTTP implementation is the production
/// path; tests substitute deterministic links.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Estimate current link throughput. Implementations fall back to a
    /// conservative assumption instead of failing.
    async fn measure(&self) -> NetworkClass;
}

/// Times one small HTTP round trip and divides bytes by elapsed time.
pub struct HttpNetworkProbe {
    client: Client,
    config: NetworkConfig,
}

impl HttpNetworkProbe {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn fallback(&self) -> NetworkClass {
        NetworkClass::classify(
            self.config.fallback_throughput_bytes_per_sec,
            self.config.slow_threshold_bytes_per_sec,
        )
    }
}

#[async_trait]
impl NetworkProbe for HttpNetworkProbe {
    async fn measure(&self) -> NetworkClass {
        let Some(url) = self.config.probe_url.clone() else {
            debug!("no probe url configured, assuming fallback throughput");
            return self.fallback();
        };

        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let started = Instant::now();
        let fetched = tokio::time::timeout(timeout, async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let body = response.bytes().await?;
            Ok::<usize, reqwest::Error>(body.len())
        })
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        match fetched {
            Ok(Ok(bytes)) if bytes > 0 && elapsed > 0.0 => {
                let throughput = bytes as f64 / elapsed;
                let class = NetworkClass::classify(
                    throughput,
                    self.config.slow_threshold_bytes_per_sec,
                );
                debug!(
                    bytes,
                    elapsed_secs = elapsed,
                    throughput_bytes_per_sec = throughput,
                    tier = ?class.tier,
                    "network probe complete"
                );
                class
            }
            Ok(Ok(_)) => {
                warn!("network probe returned an empty body, assuming fallback");
                self.fallback()
            }
            Ok(Err(e)) => {
                warn!("network probe failed: {e}, assuming fallback");
                self.fallback()
            }
            Err(_) => {
                warn!("network probe timed out, assuming fallback");
                self.fallback()
            }
        }
    }
}
