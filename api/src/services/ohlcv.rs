use super::{head_chars, stored_token_list};
use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::models::OhlcvResponse;
use market_feed::MarketDataProvider;
use posada_common::config::BacktestConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::IntErrorKind;
use std::sync::Arc;
use tracing::info;

/// 업스트림이 지원하는 캔들 간격
pub const VALID_INTERVALS: &[&str] = &[
    "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "12h", "1d", "3d", "1w", "1M",
];

/// `/api/backtest` 쿼리 파라미터
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandleQuery {
    pub unit: Option<String>,
    pub ticker: Option<String>,
    pub interval: Option<String>,
    /// 숫자가 아니어도 에러 없이 기본값으로 처리하도록 문자열로 받는다
    pub periods: Option<String>,
}

pub fn normalize_interval(interval: Option<&str>, default: &str) -> String {
    match interval {
        Some(i) if VALID_INTERVALS.contains(&i) => i.to_string(),
        _ => default.to_string(),
    }
}

/// 캔들 개수. 상한은 `max_periods`, 0 이하이거나 숫자가 아니면 기본값.
/// i64 범위를 넘는 정수는 포화시킨다
pub fn normalize_periods(periods: Option<&str>, config: &BacktestConfig) -> i64 {
    let requested = periods
        .and_then(|p| match p.trim().parse::<i64>() {
            Ok(n) => Some(n),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow => Some(i64::MAX),
                IntErrorKind::NegOverflow => Some(i64::MIN),
                _ => None,
            },
        })
        .unwrap_or(config.default_periods)
        .min(config.max_periods);

    if requested <= 0 {
        config.default_periods
    } else {
        requested
    }
}

/// `ohlcv_<티커 또는 unit 앞 20자>_<간격>`. 영숫자와 `_`만 남긴다
pub fn cache_key(ticker: &str, unit: &str, interval: &str) -> String {
    let source = if ticker.is_empty() {
        head_chars(unit, 20)
    } else {
        ticker
    };

    let sanitized: String = source
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    format!("ohlcv_{}_{}", sanitized, interval)
}

pub struct OhlcvService {
    market: Arc<dyn MarketDataProvider>,
    cache: ResponseCache,
    config: BacktestConfig,
    ttl: i64,
}

impl OhlcvService {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        cache: ResponseCache,
        config: BacktestConfig,
        ttl: i64,
    ) -> Self {
        Self {
            market,
            cache,
            config,
            ttl,
        }
    }

    /// 토큰 하나의 캔들 히스토리 (오래된 것부터)
    pub async fn candles(&self, query: &CandleQuery, now: i64) -> Result<OhlcvResponse, ApiError> {
        let interval = normalize_interval(query.interval.as_deref(), &self.config.default_interval);
        let periods = normalize_periods(query.periods.as_deref(), &self.config);
        let requested_ticker = query.ticker.clone().unwrap_or_default();

        let tokens = stored_token_list(&self.cache).await;
        let unit_by_ticker: HashMap<String, String> = tokens
            .iter()
            .filter(|t| !t.token_id.is_empty())
            .map(|t| (t.ticker.to_uppercase(), t.token_id.clone()))
            .collect();
        let ticker_by_unit: HashMap<&str, &str> = tokens
            .iter()
            .filter(|t| !t.token_id.is_empty())
            .map(|t| (t.token_id.as_str(), t.ticker.as_str()))
            .collect();

        let unit = match query.unit.as_deref().filter(|u| !u.is_empty()) {
            Some(unit) => unit.to_string(),
            None => unit_by_ticker
                .get(&requested_ticker.to_uppercase())
                .cloned()
                .unwrap_or_default(),
        };
        if unit.is_empty() {
            return Err(ApiError::BadRequest(
                "missing unit or ticker parameter".to_string(),
            ));
        }

        let ticker = ticker_by_unit
            .get(unit.as_str())
            .map(|t| t.to_string())
            .unwrap_or(requested_ticker);
        let key = cache_key(&ticker, &unit, &interval);

        let result = self
            .cache
            .get_or_refresh(&key, self.ttl, now, || async {
                let mut candles = self.market.ohlcv(&unit, &interval, periods).await?;
                candles.sort_by_key(|c| c.time);

                info!("🕯️ Fetched {} {} candles for {}", candles.len(), interval, unit);
                Ok::<_, anyhow::Error>(Some(OhlcvResponse {
                    ticker: ticker.clone(),
                    unit: unit.clone(),
                    interval: interval.clone(),
                    candles,
                    updated_at: now,
                }))
            })
            .await;

        match result {
            Ok(Some(hit)) => Ok(hit.data),
            Ok(None) => Err(ApiError::NoCandles("invalid response".to_string())),
            Err(e) => Err(ApiError::NoCandles(e.to_string())),
        }
    }
}
