//! 봇 거래 리더보드
//!
//! 거래 보고(`POST`)는 `trades`, `users` 두 blob을 갱신하고, 조회(`GET`)는
//! 저장된 거래 전체를 사용자별 또는 전략별로 집계한다.

use crate::error::ApiError;
use crate::models::{
    is_truthy, LeaderboardResponse, LeaderboardRow, RecentTrade, StrategiesResponse,
    StrategyRow, SubmitResponse, TradeRecord, TradeReport, UserProfile,
};
use crate::repositories::{BlobStore, KeyedLocks};
use posada_common::config::LeaderboardConfig;
use posada_common::crypto::short_tag;
use posada_common::error::MarketResult;
use posada_common::rounding::{round_currency, round_percent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

pub const TRADES_KEY: &str = "trades";
pub const USERS_KEY: &str = "users";

/// 거래/사용자 blob 갱신을 직렬화하는 락 키
const LEADERBOARD_LOCK: &str = "leaderboard";

pub type UserTable = BTreeMap<String, UserProfile>;

/// 등록된 이름이 없으면 `Posada XXX` (고객 ID 해시 앞 3자리)
pub fn display_name(cid: &str, users: &UserTable) -> String {
    match users.get(cid) {
        Some(user) if !user.username.is_empty() => user.username.clone(),
        _ => format!("Posada {}", short_tag(cid, 3)),
    }
}

fn is_exit(event: &str) -> bool {
    matches!(event, "sell" | "sell_half")
}

fn is_entry(event: &str) -> bool {
    matches!(event, "buy" | "add")
}

fn win_rate(wins: u64, losses: u64) -> f64 {
    let decided = wins + losses;
    if decided == 0 {
        return 0.0;
    }
    round_percent(wins as f64 / decided as f64 * 100.0)
}

/// 삽입 순서를 유지하는 카운터. 최댓값이 같으면 먼저 들어온 키
#[derive(Debug, Default)]
struct Tally {
    counts: Vec<(String, u64)>,
}

impl Tally {
    fn bump(&mut self, key: &str) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((key.to_string(), 1)),
        }
    }

    fn most_common(&self) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for (key, count) in &self.counts {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((key.as_str(), *count));
            }
        }
        best.map(|(key, _)| key)
    }
}

#[derive(Debug, Default)]
struct UserStats {
    trades: u64,
    wins: u64,
    losses: u64,
    total_pnl: f64,
    strategies: Tally,
}

#[derive(Debug, Default)]
struct StrategyStats {
    trades: u64,
    wins: u64,
    losses: u64,
    total_pnl: f64,
    tokens: Tally,
}

/// 키의 첫 등장 순서를 유지하는 그룹
struct Groups<T> {
    order: Vec<String>,
    entries: HashMap<String, T>,
}

impl<T: Default> Groups<T> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut T {
        if !self.entries.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.entries.entry(key.to_string()).or_default()
    }

    fn into_ordered(mut self) -> Vec<(String, T)> {
        self.order
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|v| (key, v)))
            .collect()
    }
}

fn by_total_pnl_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// 사용자별 손익 순위 (상위 `size`명)
pub fn build_leaderboard(trades: &[TradeRecord], users: &UserTable, size: usize) -> Vec<LeaderboardRow> {
    let mut groups: Groups<UserStats> = Groups::new();

    for trade in trades {
        let stats = groups.entry(&trade.cid);

        if is_entry(&trade.event) {
            stats.trades += 1;
        }

        if is_exit(&trade.event) {
            let pnl = trade.pnl.unwrap_or(0.0);
            stats.trades += 1;
            stats.total_pnl += pnl;
            if pnl > 0.0 {
                stats.wins += 1;
            } else if pnl < 0.0 {
                stats.losses += 1;
            }
        }

        if !trade.strategy.is_empty() {
            stats.strategies.bump(&trade.strategy);
        }
    }

    let mut board: Vec<LeaderboardRow> = groups
        .into_ordered()
        .into_iter()
        .map(|(cid, stats)| LeaderboardRow {
            username: display_name(&cid, users),
            total_pnl: round_currency(stats.total_pnl),
            trades: stats.trades,
            wins: stats.wins,
            losses: stats.losses,
            win_rate: win_rate(stats.wins, stats.losses),
            fav_strategy: stats
                .strategies
                .most_common()
                .unwrap_or_default()
                .to_uppercase(),
        })
        .collect();

    board.sort_by(|a, b| by_total_pnl_desc(a.total_pnl, b.total_pnl));
    board.truncate(size);
    board
}

/// 청산 거래 기준 전략별 성과
pub fn build_strategy_board(trades: &[TradeRecord]) -> Vec<StrategyRow> {
    let mut groups: Groups<StrategyStats> = Groups::new();

    for trade in trades.iter().filter(|t| is_exit(&t.event)) {
        let name = trade.strategy.to_uppercase();
        if name.is_empty() {
            continue;
        }

        let pnl = trade.pnl.unwrap_or(0.0);
        let stats = groups.entry(&name);
        stats.trades += 1;
        stats.total_pnl += pnl;
        if pnl > 0.0 {
            stats.wins += 1;
        } else if pnl < 0.0 {
            stats.losses += 1;
        }
        if !trade.symbol.is_empty() {
            stats.tokens.bump(&trade.symbol);
        }
    }

    let mut rows: Vec<StrategyRow> = groups
        .into_ordered()
        .into_iter()
        .map(|(name, stats)| StrategyRow {
            name,
            trades: stats.trades,
            wins: stats.wins,
            losses: stats.losses,
            win_rate: win_rate(stats.wins, stats.losses),
            avg_pnl: if stats.trades > 0 {
                round_currency(stats.total_pnl / stats.trades as f64)
            } else {
                0.0
            },
            total_pnl: round_currency(stats.total_pnl),
            top_token: stats.tokens.most_common().unwrap_or_default().to_string(),
        })
        .collect();

    rows.sort_by(|a, b| by_total_pnl_desc(a.total_pnl, b.total_pnl));
    rows
}

/// 최근 거래 `size`건 (최신순)
pub fn recent_trades(trades: &[TradeRecord], users: &UserTable, size: usize) -> Vec<RecentTrade> {
    trades
        .iter()
        .rev()
        .take(size)
        .map(|trade| RecentTrade {
            ts: trade.ts,
            username: display_name(&trade.cid, users),
            event: trade.event.clone(),
            symbol: trade.symbol.clone(),
            strategy: trade.strategy.to_uppercase(),
            pnl: trade.pnl,
            reason: trade.reason.clone(),
        })
        .collect()
}

pub struct LeaderboardService {
    store: Arc<dyn BlobStore>,
    locks: Arc<KeyedLocks>,
    config: LeaderboardConfig,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn BlobStore>, locks: Arc<KeyedLocks>, config: LeaderboardConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// blob 로드. 없거나 깨졌으면 기본값
    async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable {} blob: {}", key, e);
                T::default()
            }),
            Ok(None) => T::default(),
            Err(e) => {
                warn!("Failed to read {} blob: {}", key, e);
                T::default()
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> MarketResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store.put(key, &bytes).await
    }

    /// 거래 보고 처리
    ///
    /// 사용자 정보 갱신과 거래 기록 전체가 하나의 락 안에서 실행된다.
    /// `username`이 비어 있지 않거나 `opt_in` 값이 있으면 (null 제외, `false` 포함)
    /// 사용자 정보를 갱신한다. `opt_in: false`로 참여를 철회할 수 있다.
    pub async fn submit(&self, report: TradeReport, now: i64) -> Result<SubmitResponse, ApiError> {
        let (Some(cid), Some(event)) = (report.customer_key(), report.event_name()) else {
            return Err(ApiError::BadRequest("missing customer_id or event".to_string()));
        };
        let event = event.to_string();

        let _guard = self.locks.lock(LEADERBOARD_LOCK).await;

        let mut users: UserTable = self.load(USERS_KEY).await;
        let username = report.username.as_deref().unwrap_or_default();
        let opt_in = report.opt_in.as_ref().filter(|v| !v.is_null());

        if !username.is_empty() || opt_in.is_some() {
            let user = users.entry(cid.clone()).or_insert_with(|| UserProfile {
                username: String::new(),
                opt_in: false,
                joined: now,
            });
            if !username.is_empty() {
                user.username = username.chars().take(self.config.username_max_len).collect();
            }
            if let Some(value) = opt_in {
                user.opt_in = is_truthy(value);
            }
            self.save(USERS_KEY, &users).await?;
        }

        if !users.get(&cid).map_or(false, |u| u.opt_in) {
            return Ok(SubmitResponse {
                ok: true,
                recorded: false,
                reason: Some("not opted in".to_string()),
            });
        }

        let mut trades: Vec<TradeRecord> = self.load(TRADES_KEY).await;
        trades.push(TradeRecord {
            ts: report.ts.unwrap_or(now),
            cid: cid.clone(),
            event: event.clone(),
            symbol: report.symbol.unwrap_or_default(),
            strategy: report.strategy.unwrap_or_default(),
            cost: report.cost,
            pnl: report.pnl,
            reason: report.reason.unwrap_or_default(),
        });
        if trades.len() > self.config.max_trades {
            let excess = trades.len() - self.config.max_trades;
            trades.drain(..excess);
        }
        self.save(TRADES_KEY, &trades).await?;

        info!("🏆 Trade recorded: {} {} ({} stored)", display_name(&cid, &users), event, trades.len());

        Ok(SubmitResponse {
            ok: true,
            recorded: true,
            reason: None,
        })
    }

    pub async fn leaderboard(&self, now: i64) -> LeaderboardResponse {
        let trades: Vec<TradeRecord> = self.load(TRADES_KEY).await;
        let users: UserTable = self.load(USERS_KEY).await;

        LeaderboardResponse {
            leaderboard: build_leaderboard(&trades, &users, self.config.board_size),
            recent: recent_trades(&trades, &users, self.config.recent_size),
            updated_at: now,
        }
    }

    pub async fn strategies(&self, now: i64) -> StrategiesResponse {
        let trades: Vec<TradeRecord> = self.load(TRADES_KEY).await;

        StrategiesResponse {
            strategies: build_strategy_board(&trades),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryBlobStore;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn trade(cid: &str, event: &str, strategy: &str, symbol: &str, pnl: Option<f64>) -> TradeRecord {
        TradeRecord {
            ts: NOW,
            cid: cid.to_string(),
            event: event.to_string(),
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            cost: None,
            pnl,
            reason: String::new(),
        }
    }

    fn service() -> LeaderboardService {
        LeaderboardService::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(KeyedLocks::new()),
            LeaderboardConfig::default(),
        )
    }

    fn report(value: serde_json::Value) -> TradeReport {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_win_loss_accounting() {
        let trades = vec![
            trade("c1", "sell", "dip", "SNEK", Some(10.0)),
            trade("c1", "sell", "dip", "SNEK", Some(-5.0)),
        ];

        let board = build_leaderboard(&trades, &UserTable::new(), 20);

        assert_eq!(board.len(), 1);
        assert_eq!(board[0].wins, 1);
        assert_eq!(board[0].losses, 1);
        assert_eq!(board[0].total_pnl, 5.0);
        assert_eq!(board[0].win_rate, 50.0);
        assert_eq!(board[0].fav_strategy, "DIP");
    }

    #[test]
    fn test_entries_count_as_trades_only() {
        let trades = vec![
            trade("c1", "buy", "", "SNEK", None),
            trade("c1", "add", "", "SNEK", Some(99.0)),
            trade("c1", "sell_half", "", "SNEK", None),
            trade("c1", "cancel", "", "SNEK", Some(50.0)),
        ];

        let board = build_leaderboard(&trades, &UserTable::new(), 20);

        assert_eq!(board[0].trades, 3);
        assert_eq!(board[0].total_pnl, 0.0);
        assert_eq!(board[0].win_rate, 0.0);
        assert_eq!(board[0].fav_strategy, "");
    }

    #[test]
    fn test_board_sorted_and_named() {
        let mut users = UserTable::new();
        users.insert(
            "c2".to_string(),
            UserProfile {
                username: "whale_hunter".to_string(),
                opt_in: true,
                joined: NOW,
            },
        );
        let trades = vec![
            trade("c1", "sell", "", "SNEK", Some(1.0)),
            trade("c2", "sell", "", "MIN", Some(30.0)),
            trade("c3", "sell", "", "MIN", Some(-2.0)),
        ];

        let board = build_leaderboard(&trades, &users, 2);

        assert_eq!(board.len(), 2);
        assert_eq!(board[0].username, "whale_hunter");
        assert_eq!(board[1].username, format!("Posada {}", short_tag("c1", 3)));
        assert!(board[1].username.starts_with("Posada "));
        assert_eq!(board[1].username.len(), "Posada XXX".len());
    }

    #[test]
    fn test_favourite_strategy_tie_uses_first_seen() {
        let trades = vec![
            trade("c1", "buy", "momentum", "SNEK", None),
            trade("c1", "buy", "dip", "SNEK", None),
            trade("c1", "sell", "dip", "SNEK", Some(1.0)),
            trade("c1", "sell", "momentum", "SNEK", Some(1.0)),
        ];

        let board = build_leaderboard(&trades, &UserTable::new(), 20);

        assert_eq!(board[0].fav_strategy, "MOMENTUM");
    }

    #[test]
    fn test_strategy_board() {
        let trades = vec![
            trade("c1", "sell", "dip", "SNEK", Some(10.0)),
            trade("c2", "sell", "DIP", "MIN", Some(-4.0)),
            trade("c2", "sell", "dip", "MIN", Some(1.0)),
            trade("c1", "buy", "breakout", "SNEK", None),
            trade("c1", "sell", "breakout", "IAG", Some(20.0)),
            trade("c1", "sell", "", "IAG", Some(100.0)),
        ];

        let rows = build_strategy_board(&trades);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "BREAKOUT");
        assert_eq!(rows[0].trades, 1);

        let dip = &rows[1];
        assert_eq!(dip.name, "DIP");
        assert_eq!(dip.trades, 3);
        assert_eq!((dip.wins, dip.losses), (2, 1));
        assert_eq!(dip.win_rate, 66.7);
        assert_eq!(dip.total_pnl, 7.0);
        assert_eq!(dip.avg_pnl, 2.33);
        assert_eq!(dip.top_token, "MIN");
    }

    #[test]
    fn test_recent_trades_newest_first() {
        let trades: Vec<TradeRecord> = (0..25)
            .map(|i| {
                let mut t = trade("c1", "buy", "dip", "SNEK", None);
                t.ts = NOW + i;
                t
            })
            .collect();

        let recent = recent_trades(&trades, &UserTable::new(), 20);

        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].ts, NOW + 24);
        assert_eq!(recent[19].ts, NOW + 5);
        assert_eq!(recent[0].strategy, "DIP");
    }

    #[tokio::test]
    async fn test_submit_requires_identifiers() {
        let service = service();

        let err = service
            .submit(report(json!({"event": "buy"})), NOW)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "missing customer_id or event"));
    }

    #[tokio::test]
    async fn test_submit_without_opt_in_is_not_recorded() {
        let service = service();

        let response = service
            .submit(report(json!({"customer_id": "c1", "event": "buy", "username": "alice"})), NOW)
            .await
            .unwrap();

        assert!(response.ok);
        assert!(!response.recorded);
        assert_eq!(response.reason.as_deref(), Some("not opted in"));
        assert!(service.leaderboard(NOW).await.recent.is_empty());
    }

    #[tokio::test]
    async fn test_opted_in_user_trades_are_recorded() {
        let service = service();

        // Given - 옵트인 후 이름 없이 보고
        service
            .submit(report(json!({"customer_id": "c1", "event": "start", "opt_in": true, "username": "a_very_long_username_indeed"})), NOW)
            .await
            .unwrap();

        // When
        let response = service
            .submit(
                report(json!({"customer_id": "c1", "event": "sell", "symbol": "SNEK", "strategy": "dip", "pnl": 12.5})),
                NOW + 10,
            )
            .await
            .unwrap();

        // Then
        assert!(response.recorded);
        let board = service.leaderboard(NOW + 20).await;
        assert_eq!(board.leaderboard[0].username, "a_very_long_username");
        assert_eq!(board.leaderboard[0].total_pnl, 12.5);
        assert_eq!(board.recent.len(), 2);
        assert_eq!(board.recent[0].ts, NOW + 10);
        assert_eq!(board.updated_at, NOW + 20);
    }

    #[tokio::test]
    async fn test_opt_out_stops_recording() {
        let service = service();

        service
            .submit(report(json!({"customer_id": 7, "event": "buy", "opt_in": 1})), NOW)
            .await
            .unwrap();
        let response = service
            .submit(report(json!({"customer_id": 7, "event": "buy", "opt_in": false})), NOW + 1)
            .await
            .unwrap();

        assert!(!response.recorded);
        assert_eq!(service.leaderboard(NOW).await.recent.len(), 1);
    }

    #[tokio::test]
    async fn test_trade_log_is_capped() {
        let service = LeaderboardService::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(KeyedLocks::new()),
            LeaderboardConfig {
                max_trades: 3,
                ..Default::default()
            },
        );

        for i in 0..5 {
            service
                .submit(report(json!({"customer_id": "c1", "event": "buy", "opt_in": true, "ts": i})), NOW)
                .await
                .unwrap();
        }

        let recent = service.leaderboard(NOW).await.recent;
        let stamps: Vec<i64> = recent.iter().map(|t| t.ts).collect();
        assert_eq!(stamps, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_not_lost() {
        let service = Arc::new(service());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .submit(
                            report(json!({"customer_id": format!("c{}", i), "event": "buy", "opt_in": true})),
                            NOW,
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().recorded);
        }

        assert_eq!(service.leaderboard(NOW).await.recent.len(), 10);
    }
}
