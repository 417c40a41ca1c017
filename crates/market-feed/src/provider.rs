use anyhow::Result;
use async_trait::async_trait;
use posada_common::types::{Candle, MarketStats, PriceChanges, SwapEvent, TokenQuote, VolumeEntry};
use tracing::warn;

/// Source of the ranked token list with current prices
#[async_trait]
pub trait TokenListProvider: Send + Sync {
    /// Fetch up to `limit` tokens, skipping any ticker in `excluded`
    async fn fetch_tokens(&self, limit: usize, excluded: &[String]) -> Result<Vec<TokenQuote>>;

    /// Get the name of the provider
    fn name(&self) -> &str;
}

/// Source of volume, on-chain swap and candle data
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Tokens ranked by 24h volume
    async fn top_volume(&self) -> Result<Vec<VolumeEntry>>;

    /// Current chain height
    async fn latest_block(&self) -> Result<u64>;

    /// Swap events in the inclusive block range
    async fn swap_events(&self, from_block: u64, to_block: u64) -> Result<Vec<SwapEvent>>;

    /// Multi-timeframe price change for one token unit
    async fn price_changes(&self, unit: &str) -> Result<PriceChanges>;

    /// Aggregate DEX statistics
    async fn market_stats(&self) -> Result<MarketStats>;

    /// Candle history for one token unit
    async fn ohlcv(&self, unit: &str, interval: &str, periods: i64) -> Result<Vec<Candle>>;

    /// Get the name of the provider
    fn name(&self) -> &str;
}

/// Fetch price changes for every token that has a unit, in list order.
/// Failed lookups are logged and skipped.
pub async fn collect_price_changes(
    provider: &dyn MarketDataProvider,
    tokens: &[TokenQuote],
) -> Vec<(TokenQuote, PriceChanges)> {
    let mut results = Vec::new();

    for token in tokens {
        if token.token_id.is_empty() {
            continue;
        }

        match provider.price_changes(&token.token_id).await {
            Ok(changes) => results.push((token.clone(), changes)),
            Err(e) => warn!(
                "Skipping {} ({}): price change lookup failed: {}",
                token.ticker,
                provider.name(),
                e
            ),
        }
    }

    results
}
