use crate::provider::MarketDataProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use posada_common::config::UpstreamConfig;
use posada_common::types::{
    Candle, MarketStats, PriceChanges, RawCandle, SwapEvent, VolumeEntry,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// `/integration/latest-block` 응답
#[derive(Debug, Deserialize)]
struct LatestBlock {
    #[serde(rename = "blockHeight")]
    block_height: Option<u64>,
}

/// TapTools REST API 클라이언트
pub struct TapToolsClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    ohlcv_timeout: Duration,
}

impl TapToolsClient {
    pub fn new(upstream: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(upstream.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: upstream.taptools_url.trim_end_matches('/').to_string(),
            api_key: upstream.taptools_api_key.clone(),
            timeout: Duration::from_secs(upstream.taptools_timeout_secs),
            ohlcv_timeout: Duration::from_secs(upstream.ohlcv_timeout_secs),
        })
    }

    /// GET 요청 후 JSON 파싱. 200이 아니면 에러
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("🌐 Calling TapTools API: {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("Failed to send request to TapTools {}", path))?;

        if !response.status().is_success() {
            anyhow::bail!("TapTools {} returned HTTP {}", path, response.status().as_u16());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse TapTools {} response", path))
    }
}

#[async_trait]
impl MarketDataProvider for TapToolsClient {
    async fn top_volume(&self) -> Result<Vec<VolumeEntry>> {
        self.get_json("/token/top/volume", &[], self.timeout).await
    }

    async fn latest_block(&self) -> Result<u64> {
        let block: LatestBlock = self
            .get_json("/integration/latest-block", &[], self.timeout)
            .await?;

        block
            .block_height
            .ok_or_else(|| anyhow::anyhow!("latest-block response has no blockHeight"))
    }

    async fn swap_events(&self, from_block: u64, to_block: u64) -> Result<Vec<SwapEvent>> {
        let query = [
            ("from", from_block.to_string()),
            ("to", to_block.to_string()),
            ("type", "swap".to_string()),
        ];
        let events: Vec<SwapEvent> = self
            .get_json("/integration/events", &query, self.timeout)
            .await?;

        info!(
            "Fetched {} swap events for blocks {}..={}",
            events.len(),
            from_block,
            to_block
        );
        Ok(events)
    }

    async fn price_changes(&self, unit: &str) -> Result<PriceChanges> {
        let query = [
            ("unit", unit.to_string()),
            ("timeframes", "1h,4h,24h,7d".to_string()),
        ];
        self.get_json("/token/prices/chg", &query, self.timeout).await
    }

    async fn market_stats(&self) -> Result<MarketStats> {
        let query = [("quote", "USD".to_string())];
        self.get_json("/market/stats", &query, self.timeout).await
    }

    async fn ohlcv(&self, unit: &str, interval: &str, periods: i64) -> Result<Vec<Candle>> {
        let query = [
            ("unit", unit.to_string()),
            ("interval", interval.to_string()),
            ("numIntervals", periods.to_string()),
        ];
        let raw: Vec<RawCandle> = self
            .get_json("/token/ohlcv", &query, self.ohlcv_timeout)
            .await?;

        Ok(raw.into_iter().map(Candle::from).collect())
    }

    fn name(&self) -> &str {
        "taptools"
    }
}
