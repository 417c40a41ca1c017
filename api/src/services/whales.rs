use super::{head_chars, stored_token_list, tail_chars};
use crate::cache::ResponseCache;
use crate::models::{WhaleTrade, WhalesResponse};
use anyhow::Context;
use market_feed::MarketDataProvider;
use posada_common::config::WhalesConfig;
use posada_common::rounding::round_dp;
use posada_common::types::SwapEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const WHALES_CACHE_KEY: &str = "whales_cache";

const NO_LATEST_BLOCK: &str = "could not get latest block";

/// 이보다 큰 금액은 lovelace 단위로 간주
const LOVELACE_CUTOFF: f64 = 1_000_000.0;

pub struct WhaleService {
    market: Arc<dyn MarketDataProvider>,
    cache: ResponseCache,
    config: WhalesConfig,
    ttl: i64,
}

impl WhaleService {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        cache: ResponseCache,
        config: WhalesConfig,
        ttl: i64,
    ) -> Self {
        Self {
            market,
            cache,
            config,
            ttl,
        }
    }

    /// 최근 블록 구간의 대형 스왑
    pub async fn whales(&self, now: i64) -> WhalesResponse {
        let result = self
            .cache
            .get_or_refresh(WHALES_CACHE_KEY, self.ttl, now, || self.scan(now))
            .await;

        match result {
            Ok(Some(hit)) => hit.data,
            Ok(None) | Err(_) => WhalesResponse {
                trades: Vec::new(),
                threshold: self.config.threshold_ada,
                block: None,
                updated_at: None,
                error: Some(NO_LATEST_BLOCK.to_string()),
            },
        }
    }

    async fn scan(&self, now: i64) -> anyhow::Result<Option<WhalesResponse>> {
        let latest = self.market.latest_block().await.context(NO_LATEST_BLOCK)?;
        let from = latest.saturating_sub(self.config.block_window);

        let events = match self.market.swap_events(from, latest).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Swap events unavailable for blocks {}..={}: {:#}", from, latest, e);
                Vec::new()
            }
        };

        let tickers: HashMap<String, String> = stored_token_list(&self.cache)
            .await
            .into_iter()
            .filter(|t| !t.token_id.is_empty())
            .map(|t| (t.token_id, t.ticker))
            .collect();

        let trades = whale_trades(&events, &tickers, &self.config, now);
        info!(
            "🐋 {} whale trades in blocks {}..={} ({} events)",
            trades.len(),
            from,
            latest,
            events.len()
        );

        Ok(Some(WhalesResponse {
            trades,
            threshold: self.config.threshold_ada,
            block: Some(latest),
            updated_at: Some(now),
            error: None,
        }))
    }
}

/// 이벤트의 ADA 금액. lovelace로 보이는 값은 ADA로 환산
pub fn ada_amount(event: &SwapEvent) -> f64 {
    let amount = event
        .ada_amount
        .or(event.lovelace)
        .unwrap_or(0.0)
        .abs();

    if amount > LOVELACE_CUTOFF {
        amount / LOVELACE_CUTOFF
    } else {
        amount
    }
}

/// 매수/매도 방향. `type`에 "sell"이 있으면 SELL
pub fn trade_direction(event: &SwapEvent) -> String {
    if let Some(kind) = &event.kind {
        return if kind.to_lowercase().contains("sell") {
            "SELL".to_string()
        } else {
            "BUY".to_string()
        };
    }

    match &event.direction {
        Some(direction) => direction.to_uppercase(),
        None => "BUY".to_string(),
    }
}

/// 임계값 이상인 이벤트를 고래 거래로 변환. 미달이면 None
pub fn to_whale_trade(
    event: &SwapEvent,
    tickers: &HashMap<String, String>,
    threshold: f64,
    now: i64,
) -> Option<WhaleTrade> {
    let amount = ada_amount(event);
    if amount < threshold {
        return None;
    }

    let unit = event.unit();
    let ticker = match tickers.get(unit) {
        Some(ticker) => ticker.clone(),
        None => tail_chars(unit, 8).to_uppercase(),
    };
    let token = if ticker.is_empty() {
        head_chars(unit, 12).to_string()
    } else {
        ticker
    };

    Some(WhaleTrade {
        time: event.event_time().unwrap_or(now),
        tx_hash: event.tx_hash.clone().unwrap_or_default(),
        token,
        ada_amount: round_dp(amount, 0),
        direction: trade_direction(event),
        dex: event.dex.clone().unwrap_or_default(),
    })
}

/// 최신순으로 정렬한 상위 `max_trades`개 고래 거래
pub fn whale_trades(
    events: &[SwapEvent],
    tickers: &HashMap<String, String>,
    config: &WhalesConfig,
    now: i64,
) -> Vec<WhaleTrade> {
    let mut trades: Vec<WhaleTrade> = events
        .iter()
        .filter_map(|event| to_whale_trade(event, tickers, config.threshold_ada, now))
        .collect();

    trades.sort_by(|a, b| b.time.cmp(&a.time));
    trades.truncate(config.max_trades);
    trades
}
