//! Service configuration.
//!
//! Loaded from a TOML file; every field has a default. A handful of
//! environment variables override the file.

use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub tokens: TokensConfig,
    pub whales: WhalesConfig,
    pub movers: MoversConfig,
    pub backtest: BacktestConfig,
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub minswap_url: String,
    pub taptools_url: String,
    pub taptools_api_key: String,
    pub user_agent: String,
    pub minswap_timeout_secs: u64,
    pub taptools_timeout_secs: u64,
    pub ohlcv_timeout_secs: u64,
    /// 429 응답 후 재시도까지 대기 시간
    pub rate_limit_backoff_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            minswap_url: "https://agg-api.minswap.org/aggregator".to_string(),
            taptools_url: "https://openapi.taptools.io/api/v1".to_string(),
            taptools_api_key: String::new(),
            user_agent: "Posada/1.0".to_string(),
            minswap_timeout_secs: 30,
            taptools_timeout_secs: 15,
            ohlcv_timeout_secs: 20,
            rate_limit_backoff_secs: 5,
        }
    }
}

/// Freshness windows, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub tokens_ttl_secs: i64,
    pub volume_ttl_secs: i64,
    pub movers_ttl_secs: i64,
    pub whales_ttl_secs: i64,
    pub ohlcv_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tokens_ttl_secs: 300,
            volume_ttl_secs: 300,
            movers_ttl_secs: 300,
            whales_ttl_secs: 120,
            ohlcv_ttl_secs: 900,
        }
    }
}

/// Hourly snapshot policy for the 24h change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub snapshot_interval_secs: i64,
    pub retention_secs: i64,
    pub lookback_secs: i64,
    pub tolerance_secs: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 3600,
            retention_secs: 90_000,
            lookback_secs: 86_400,
            tolerance_secs: 7200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    pub limit: usize,
    pub page_size: usize,
    pub max_pages: usize,
    /// Stablecoins and wrapped ADA never appear in the list.
    pub excluded: Vec<String>,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            limit: 31,
            page_size: 20,
            max_pages: 3,
            excluded: ["USDM", "USDA", "DJED", "IUSD", "SHEN", "OADA", "USDC", "USDT", "DAI"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhalesConfig {
    pub threshold_ada: f64,
    pub block_window: u64,
    pub max_trades: usize,
}

impl Default for WhalesConfig {
    fn default() -> Self {
        Self {
            threshold_ada: 5000.0,
            block_window: 50,
            max_trades: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoversConfig {
    pub list_size: usize,
    pub top_volume: usize,
}

impl Default for MoversConfig {
    fn default() -> Self {
        Self {
            list_size: 15,
            top_volume: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub default_interval: String,
    pub default_periods: i64,
    pub max_periods: i64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            default_interval: "1h".to_string(),
            default_periods: 720,
            max_periods: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub max_trades: usize,
    pub board_size: usize,
    pub recent_size: usize,
    pub username_max_len: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            max_trades: 500,
            board_size: 20,
            recent_size: 20,
            username_max_len: 20,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> MarketResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// 설정 파일 로드. 경로가 없으면 기본값 사용
    pub fn load(path: Option<&Path>) -> MarketResult<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    MarketError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply `TAPTOOLS_API_KEY`, `POSADA_BIND`, `POSADA_DATA_DIR` and
    /// `POSADA_LOG` overrides. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        if let Some(key) = var("TAPTOOLS_API_KEY") {
            self.upstream.taptools_api_key = key;
        }
        if let Some(bind) = var("POSADA_BIND") {
            self.server.bind = bind;
        }
        if let Some(dir) = var("POSADA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("POSADA_LOG") {
            self.server.log_level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.history.tolerance_secs, 7200);
        assert_eq!(config.history.retention_secs, 90_000);
        assert_eq!(config.tokens.excluded.len(), 9);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let raw = r#"
            [history]
            tolerance_secs = 3600

            [whales]
            threshold_ada = 10000.0
        "#;

        let config = AppConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.history.tolerance_secs, 3600);
        assert_eq!(config.history.lookback_secs, 86_400);
        assert_eq!(config.whales.threshold_ada, 10000.0);
        assert_eq!(config.whales.block_window, 50);
        assert_eq!(config.cache.whales_ttl_secs, 120);
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config = AppConfig::from_toml_str(include_str!("../../../posada.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = AppConfig::from_toml_str("[history\n");
        assert!(matches!(result, Err(MarketError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TAPTOOLS_API_KEY", "secret"),
            ("POSADA_BIND", "0.0.0.0:8080"),
            ("POSADA_DATA_DIR", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.upstream.taptools_api_key, "secret");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        // blank value ignored
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/posada.toml")));
        assert!(matches!(result, Err(MarketError::Config(_))));
    }
}
