use crate::cache::ResponseCache;
use crate::history::{compute_24h_change, SnapshotHistory, SnapshotPolicy, SnapshotStore};
use crate::models::{TokenRow, TokensResponse};
use market_feed::{MarketDataProvider, TokenListProvider};
use posada_common::config::{CacheConfig, TokensConfig};
use posada_common::rounding::{round_currency, round_dp};
use posada_common::types::{derive_ada_usd, TokenQuote};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const TOKENS_CACHE_KEY: &str = "tokens_cache";
pub const VOLUME_CACHE_KEY: &str = "volume_cache";

/// 스냅샷에 함께 기록하는 USD/ADA 환율 심볼
pub const ADA_USD: &str = "ADA_USD";

const SOURCE: &str = "minswap";

/// 잘 알려진 토큰의 한 줄 설명
pub fn description_for(ticker: &str) -> Option<&'static str> {
    let description = match ticker {
        "ADA" => "Cardano native token - proof-of-stake layer-1 blockchain",
        "SNEK" => "Community memecoin on Cardano - largest by market cap",
        "MIN" => "Minswap DEX governance token - largest Cardano DEX",
        "IAG" => "Iagon decentralised storage and compute marketplace",
        "NIGHT" => "Night DEX token - concentrated liquidity on Cardano",
        "STRIKE" => "Strike Finance lending and borrowing protocol",
        "SUNDAE" => "SundaeSwap DEX governance token",
        "WMTX" => "World Mobile token - decentralised mobile network",
        "INDY" => "Indigo Protocol - synthetic assets on Cardano",
        "FLDT" => "Fluid Tokens - NFT liquidity and lending",
        "MITHR" => "Mithril - stake-based threshold multi-signatures",
        "RISE" => "Infinity Rising - community-driven Cardano project",
        "HOSKY" => "Hosky Token - the original Cardano memecoin",
        "NTX" => "NuNet - decentralised computing framework",
        "IBTC" => "Indigo synthetic Bitcoin on Cardano",
        "SURF" => "Surf Finance - yield aggregator on Cardano",
        "RSERG" => "RealSerg - Cardano community token",
        "LQ" => "Liqwid Finance - DeFi lending protocol",
        "STUFF" => "Stuff token - Cardano ecosystem utility",
        "WMT" => "World Mobile - telecom on blockchain",
        "NVL" => "Nuvola - decentralised cloud computing",
        "PALM" => "Palm NFT ecosystem token",
        "SPLASH" => "Splash Protocol - Cardano DEX token",
        "BTN" => "Butane - Cardano DeFi utility token",
        "SURGE" => "Surge Cardano - DeFi yield protocol",
        "HUNT" => "Hunt token - Cardano gaming and rewards",
        "CSWAP" => "CardSwap DEX - automated market maker",
        "VYFI" => "VyFinance - AI-powered DeFi on Cardano",
        "WRT" => "WingRiders - Cardano DEX governance token",
        "FET" => "Fetch.ai - AI and autonomous agents (bridged)",
        "AGIX" => "SingularityNET - decentralised AI marketplace (bridged)",
        _ => return None,
    };

    Some(description)
}

/// 스냅샷에 기록할 가격: 토큰별 ADA 가격 + `ADA_USD`
pub fn snapshot_prices(tokens: &[TokenQuote]) -> BTreeMap<String, f64> {
    let mut prices: BTreeMap<String, f64> = tokens
        .iter()
        .filter_map(|t| t.price_ada.map(|p| (t.ticker.clone(), p)))
        .collect();

    if let Some(ada_usd) = derive_ada_usd(tokens) {
        prices.insert(ADA_USD.to_string(), ada_usd);
    }

    prices
}

/// 토큰 목록, 24시간 변동률, 거래량을 묶은 `/api/tokens` 응답 생성
pub struct TokenService {
    token_list: Arc<dyn TokenListProvider>,
    market: Arc<dyn MarketDataProvider>,
    cache: ResponseCache,
    history: Arc<SnapshotStore>,
    tokens_config: TokensConfig,
    cache_config: CacheConfig,
}

impl TokenService {
    pub fn new(
        token_list: Arc<dyn TokenListProvider>,
        market: Arc<dyn MarketDataProvider>,
        cache: ResponseCache,
        history: Arc<SnapshotStore>,
        tokens_config: TokensConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            token_list,
            market,
            cache,
            history,
            tokens_config,
            cache_config,
        }
    }

    /// 캐시된 (또는 새로 받아온) 토큰 목록. 업스트림도 캐시도 없으면 빈 목록
    pub async fn token_list(&self, now: i64) -> Vec<TokenQuote> {
        let provider = self.token_list.clone();
        let limit = self.tokens_config.limit;
        let excluded = &self.tokens_config.excluded;

        let result = self
            .cache
            .get_or_refresh(TOKENS_CACHE_KEY, self.cache_config.tokens_ttl_secs, now, || async move {
                let tokens = provider.fetch_tokens(limit, excluded).await?;
                info!("📊 Fetched {} tokens from {}", tokens.len(), provider.name());
                Ok::<_, anyhow::Error>((!tokens.is_empty()).then_some(tokens))
            })
            .await;

        match result {
            Ok(Some(hit)) => hit.data,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("⚠️ Token list unavailable: {:#}", e);
                Vec::new()
            }
        }
    }

    /// 대문자 티커 -> 24시간 거래량 (ADA, 소수 2자리)
    pub async fn volumes(&self, now: i64) -> BTreeMap<String, f64> {
        let market = self.market.clone();

        let result = self
            .cache
            .get_or_refresh(VOLUME_CACHE_KEY, self.cache_config.volume_ttl_secs, now, || async move {
                let volumes: BTreeMap<String, f64> = market
                    .top_volume()
                    .await?
                    .into_iter()
                    .filter_map(|entry| {
                        let ticker = entry.ticker.to_uppercase();
                        let volume = entry.volume?;
                        (!ticker.is_empty()).then(|| (ticker, round_currency(volume)))
                    })
                    .collect();
                Ok::<_, anyhow::Error>((!volumes.is_empty()).then_some(volumes))
            })
            .await;

        match result {
            Ok(Some(hit)) => hit.data,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("⚠️ Volume data unavailable: {:#}", e);
                BTreeMap::new()
            }
        }
    }

    async fn record_history(&self, tokens: &[TokenQuote], now: i64) -> SnapshotHistory {
        let prices = snapshot_prices(tokens);
        if prices.is_empty() {
            return self.history.load().await;
        }

        self.history.update(&prices, now).await
    }

    pub async fn list(&self, now: i64) -> TokensResponse {
        let tokens = self.token_list(now).await;
        let history = self.record_history(&tokens, now).await;
        let volumes = self.volumes(now).await;

        TokensResponse {
            tokens: build_rows(&tokens, &history, &volumes, now, self.history.policy()),
            updated_at: now,
            source: SOURCE.to_string(),
        }
    }
}

/// ADA를 1위로, 나머지는 목록 순서대로 순위를 매긴 행
pub fn build_rows(
    tokens: &[TokenQuote],
    history: &SnapshotHistory,
    volumes: &BTreeMap<String, f64>,
    now: i64,
    policy: &SnapshotPolicy,
) -> Vec<TokenRow> {
    let ada_usd = derive_ada_usd(tokens);
    let ada_change =
        ada_usd.and_then(|price| compute_24h_change(history, ADA_USD, price, now, policy));
    let ada_volume: f64 = volumes.values().sum();

    let mut rows = Vec::with_capacity(tokens.len() + 1);
    rows.push(TokenRow {
        rank: 1,
        ticker: "ADA".to_string(),
        name: "Cardano".to_string(),
        price_ada: Some(1.0),
        price_usd: ada_usd.map(|p| round_dp(p, 4)),
        change_24h: ada_change.map(|c| round_dp(c, 2)),
        volume: (ada_volume > 0.0).then(|| round_currency(ada_volume)),
        description: description_for("ADA").unwrap_or_default().to_string(),
        logo: String::new(),
    });

    for (idx, token) in tokens.iter().enumerate() {
        let change = compute_24h_change(
            history,
            &token.ticker,
            token.price_ada.unwrap_or(0.0),
            now,
            policy,
        );

        rows.push(TokenRow {
            rank: idx + 2,
            ticker: token.ticker.clone(),
            name: token.name.clone(),
            price_ada: token.price_ada,
            price_usd: token.price_usd,
            change_24h: change.map(|c| round_dp(c, 2)),
            volume: volumes.get(&token.ticker).copied(),
            description: description_for(&token.ticker)
                .map(str::to_string)
                .unwrap_or_else(|| token.name.clone()),
            logo: token.logo.clone(),
        });
    }

    rows
}
