use super::stored_token_list;
use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::models::{MarketPulse, MoverRow, MoversResponse, TopVolumeRow};
use market_feed::provider::collect_price_changes;
use market_feed::MarketDataProvider;
use posada_common::config::MoversConfig;
use posada_common::rounding::round_dp;
use posada_common::types::{derive_ada_usd, PriceChanges, TokenQuote};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub const MOVERS_CACHE_KEY: &str = "movers_cache";

const NO_TOKEN_DATA: &str = "no token data available";

pub struct MoversService {
    market: Arc<dyn MarketDataProvider>,
    cache: ResponseCache,
    config: MoversConfig,
    ttl: i64,
}

impl MoversService {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        cache: ResponseCache,
        config: MoversConfig,
        ttl: i64,
    ) -> Self {
        Self {
            market,
            cache,
            config,
            ttl,
        }
    }

    /// 상승/하락 상위 종목과 시장 요약
    ///
    /// 저장된 토큰 목록이 하나도 없으면 `Unavailable`.
    pub async fn movers(&self, now: i64) -> Result<MoversResponse, ApiError> {
        let result = self
            .cache
            .get_or_refresh(MOVERS_CACHE_KEY, self.ttl, now, || self.build(now))
            .await;

        match result {
            Ok(Some(hit)) => Ok(hit.data),
            Ok(None) => Err(ApiError::Unavailable(NO_TOKEN_DATA.to_string())),
            Err(e) => Err(ApiError::Unavailable(e.to_string())),
        }
    }

    async fn build(&self, now: i64) -> anyhow::Result<Option<MoversResponse>> {
        let tokens = stored_token_list(&self.cache).await;
        if tokens.is_empty() {
            anyhow::bail!(NO_TOKEN_DATA);
        }

        let changes = collect_price_changes(self.market.as_ref(), &tokens).await;
        let all: Vec<MoverRow> = changes.iter().map(|(t, c)| mover_row(t, c)).collect();
        let (gainers, losers) = rank_movers(&all, self.config.list_size);

        let market = self.market_pulse(&tokens).await;
        let top_volume = self.top_volume().await;

        info!(
            "📈 Movers rebuilt: {} tokens, {} gainers, {} losers",
            all.len(),
            gainers.len(),
            losers.len()
        );

        Ok(Some(MoversResponse {
            gainers,
            losers,
            all,
            market,
            top_volume,
            updated_at: now,
        }))
    }

    async fn market_pulse(&self, tokens: &[TokenQuote]) -> MarketPulse {
        let mut pulse = MarketPulse {
            ada_price: derive_ada_usd(tokens).map(|p| round_dp(p, 4)),
            ..Default::default()
        };

        match self.market.market_stats().await {
            Ok(stats) => {
                pulse.dex_volume = stats.dex_volume();
                pulse.active_addresses = stats.active_addresses;
            }
            Err(e) => warn!("Market stats unavailable: {:#}", e),
        }

        pulse
    }

    async fn top_volume(&self) -> Vec<TopVolumeRow> {
        match self.market.top_volume().await {
            Ok(entries) => entries
                .into_iter()
                .take(self.config.top_volume)
                .map(|entry| TopVolumeRow {
                    ticker: entry.ticker.to_uppercase(),
                    volume: entry.volume.unwrap_or(0.0),
                })
                .collect(),
            Err(e) => {
                warn!("Top volume unavailable: {:#}", e);
                Vec::new()
            }
        }
    }
}

pub fn mover_row(token: &TokenQuote, changes: &PriceChanges) -> MoverRow {
    MoverRow {
        ticker: token.ticker.clone(),
        name: token.name.clone(),
        price_ada: token.price_ada,
        price_usd: token.price_usd,
        chg_1h: changes.h1,
        chg_4h: changes.h4,
        chg_24h: changes.h24,
        chg_7d: changes.d7,
    }
}

/// 24시간 변동률 기준 상승(내림차순), 하락(오름차순) 상위 `size`개
///
/// 변동률이 같으면 원래 순서를 유지한다.
pub fn rank_movers(all: &[MoverRow], size: usize) -> (Vec<MoverRow>, Vec<MoverRow>) {
    let by_change = |a: &MoverRow, b: &MoverRow| {
        a.chg_24h
            .partial_cmp(&b.chg_24h)
            .unwrap_or(Ordering::Equal)
    };

    let mut gainers: Vec<MoverRow> = all
        .iter()
        .filter(|m| m.chg_24h.map_or(false, |c| c > 0.0))
        .cloned()
        .collect();
    gainers.sort_by(|a, b| by_change(b, a));
    gainers.truncate(size);

    let mut losers: Vec<MoverRow> = all
        .iter()
        .filter(|m| m.chg_24h.map_or(false, |c| c < 0.0))
        .cloned()
        .collect();
    losers.sort_by(by_change);
    losers.truncate(size);

    (gainers, losers)
}
