use crate::cache::ResponseCache;
use crate::history::{SnapshotPolicy, SnapshotStore};
use crate::repositories::{BlobStore, FileBlobStore, KeyedLocks};
use crate::services::{LeaderboardService, MoversService, OhlcvService, TokenService, WhaleService};
use anyhow::Result;
use market_feed::{MarketDataProvider, MinswapClient, TapToolsClient, TokenListProvider};
use posada_common::AppConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// 핸들러가 공유하는 서비스 묶음
pub struct AppState {
    pub tokens: TokenService,
    pub movers: MoversService,
    pub whales: WhaleService,
    pub ohlcv: OhlcvService,
    pub leaderboard: LeaderboardService,
}

impl AppState {
    /// 주어진 저장소와 업스트림으로 서비스 구성
    ///
    /// 모든 서비스가 같은 키 락 레지스트리를 공유한다.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn BlobStore>,
        token_list: Arc<dyn TokenListProvider>,
        market: Arc<dyn MarketDataProvider>,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let cache = ResponseCache::new(store.clone(), locks.clone());
        let history = Arc::new(SnapshotStore::new(
            store.clone(),
            locks.clone(),
            SnapshotPolicy::from(&config.history),
        ));

        Self {
            tokens: TokenService::new(
                token_list,
                market.clone(),
                cache.clone(),
                history,
                config.tokens.clone(),
                config.cache.clone(),
            ),
            movers: MoversService::new(
                market.clone(),
                cache.clone(),
                config.movers.clone(),
                config.cache.movers_ttl_secs,
            ),
            whales: WhaleService::new(
                market.clone(),
                cache.clone(),
                config.whales.clone(),
                config.cache.whales_ttl_secs,
            ),
            ohlcv: OhlcvService::new(
                market,
                cache,
                config.backtest.clone(),
                config.cache.ohlcv_ttl_secs,
            ),
            leaderboard: LeaderboardService::new(store, locks, config.leaderboard.clone()),
        }
    }

    /// 파일 저장소와 실제 Minswap/TapTools 클라이언트로 구성
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(FileBlobStore::new(&config.storage.data_dir));
        let minswap = Arc::new(MinswapClient::new(&config.upstream, &config.tokens)?);
        let taptools = Arc::new(TapToolsClient::new(&config.upstream)?);

        if config.upstream.taptools_api_key.is_empty() {
            warn!("⚠️ TAPTOOLS_API_KEY is not set; volume, movers, whales and candles will be unavailable");
        }
        info!("💾 Data directory: {}", store.root().display());

        Ok(Self::new(config, store, minswap, taptools))
    }
}
