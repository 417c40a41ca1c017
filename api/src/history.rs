//! 시간별 가격 스냅샷과 24시간 변동률 계산
//!
//! 가격 히스토리는 `price_history` blob 하나에 저장된다. 요청이 들어올 때마다
//! 마지막 스냅샷 이후 한 시간이 지났으면 현재 가격을 스냅샷으로 추가하고,
//! 보존 기간(25시간)보다 오래된 스냅샷은 버린다.

use crate::repositories::{BlobStore, KeyedLocks};
use posada_common::config::HistoryConfig;
use posada_common::error::MarketResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 히스토리 blob 키
pub const HISTORY_KEY: &str = "price_history";

/// 특정 시점의 전체 심볼 가격
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "deserialize_prices")]
    pub prices: BTreeMap<String, f64>,
}

/// 스냅샷 목록 (시간순)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHistory {
    #[serde(rename = "last_snapshot", default)]
    pub last_snapshot_time: i64,
    #[serde(default)]
    pub snapshots: Vec<PriceSnapshot>,
}

/// 가격 맵 역직렬화. null 가격은 버리고, 빈 배열(`[]`)은 빈 맵으로 취급
fn deserialize_prices<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;

    let prices = match raw {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(symbol, price)| price.as_f64().map(|p| (symbol, p)))
            .collect(),
        _ => BTreeMap::new(),
    };

    Ok(prices)
}

/// 스냅샷 주기와 매칭 허용 범위 (초)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// 스냅샷 최소 간격
    pub min_interval: i64,
    /// 이보다 오래된 스냅샷은 삭제
    pub retention: i64,
    /// 변동률 비교 대상 시점 (now - lookback)
    pub lookback: i64,
    /// 비교 대상 시점과 스냅샷 사이 최대 허용 거리
    pub tolerance: i64,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for SnapshotPolicy {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            min_interval: config.snapshot_interval_secs,
            retention: config.retention_secs,
            lookback: config.lookback_secs,
            tolerance: config.tolerance_secs,
        }
    }
}

/// 주기가 되었으면 스냅샷을 추가하고 오래된 스냅샷을 정리한다.
///
/// 스냅샷을 추가했으면 true. 마지막 스냅샷 이후 `min_interval`이 지나지
/// 않았으면 히스토리를 건드리지 않는다 (경계값 포함: 정확히 `min_interval`
/// 지났으면 추가).
pub fn record_snapshot_if_due(
    history: &mut SnapshotHistory,
    prices: &BTreeMap<String, f64>,
    now: i64,
    policy: &SnapshotPolicy,
) -> bool {
    if now.saturating_sub(history.last_snapshot_time) < policy.min_interval {
        return false;
    }

    history.snapshots.push(PriceSnapshot {
        timestamp: now,
        prices: prices.clone(),
    });
    history.last_snapshot_time = now;

    let cutoff = now.saturating_sub(policy.retention);
    history.snapshots.retain(|s| s.timestamp >= cutoff);

    true
}

/// 24시간 전 가격 대비 변동률 (%)
///
/// `now - lookback`에 가장 가까운 스냅샷(동률이면 먼저 나온 것)의 가격과
/// 비교한다. 스냅샷이 없거나, 현재 가격이 0 이하이거나, 가장 가까운
/// 스냅샷이 `tolerance`보다 멀거나, 과거 가격이 0 이하이면 None.
pub fn compute_24h_change(
    history: &SnapshotHistory,
    symbol: &str,
    current_price: f64,
    now: i64,
    policy: &SnapshotPolicy,
) -> Option<f64> {
    if history.snapshots.is_empty() || !(current_price > 0.0) {
        return None;
    }

    let target = now.saturating_sub(policy.lookback);
    let mut closest: Option<(i64, f64)> = None;

    for snapshot in &history.snapshots {
        let Some(&price) = snapshot.prices.get(symbol) else {
            continue;
        };

        let distance = snapshot.timestamp.saturating_sub(target).saturating_abs();
        if closest.map_or(true, |(best, _)| distance < best) {
            closest = Some((distance, price));
        }
    }

    let (distance, past_price) = closest?;
    if distance > policy.tolerance || past_price <= 0.0 {
        return None;
    }

    Some((current_price - past_price) / past_price * 100.0)
}

/// 저장소에 보관된 히스토리의 read-modify-write 담당
pub struct SnapshotStore {
    store: Arc<dyn BlobStore>,
    locks: Arc<KeyedLocks>,
    policy: SnapshotPolicy,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn BlobStore>, locks: Arc<KeyedLocks>, policy: SnapshotPolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> &SnapshotPolicy {
        &self.policy
    }

    /// 저장된 히스토리. 없거나 읽을 수 없으면 빈 히스토리
    pub async fn load(&self) -> SnapshotHistory {
        match self.store.get(HISTORY_KEY).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable price history: {}", e);
                SnapshotHistory::default()
            }),
            Ok(None) => SnapshotHistory::default(),
            Err(e) => {
                warn!("Failed to read price history: {}", e);
                SnapshotHistory::default()
            }
        }
    }

    async fn persist(&self, history: &SnapshotHistory) -> MarketResult<()> {
        let bytes = serde_json::to_vec(history)?;
        self.store.put(HISTORY_KEY, &bytes).await
    }

    /// 현재 가격으로 히스토리 갱신 후, 변동률 계산에 쓸 히스토리를 반환
    ///
    /// 저장에 실패하면 이번 스냅샷은 버리고 저장돼 있던 히스토리를 돌려준다.
    /// 다음 요청이 다시 시도한다.
    pub async fn update(&self, prices: &BTreeMap<String, f64>, now: i64) -> SnapshotHistory {
        let _guard = self.locks.lock(HISTORY_KEY).await;

        let stored = self.load().await;
        let mut next = stored.clone();

        if !record_snapshot_if_due(&mut next, prices, now, &self.policy) {
            debug!(
                "Snapshot not due ({}s since last)",
                now.saturating_sub(stored.last_snapshot_time)
            );
            return stored;
        }

        match self.persist(&next).await {
            Ok(()) => {
                info!(
                    "📸 Price snapshot recorded: {} symbols, {} snapshots retained",
                    prices.len(),
                    next.snapshots.len()
                );
                next
            }
            Err(e) => {
                warn!("Failed to persist price snapshot, dropping it: {}", e);
                stored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryBlobStore;
    use async_trait::async_trait;
    use posada_common::error::MarketError;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;

    fn prices(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn history_with(snapshots: Vec<(i64, &[(&str, f64)])>) -> SnapshotHistory {
        let snapshots: Vec<PriceSnapshot> = snapshots
            .into_iter()
            .map(|(timestamp, entries)| PriceSnapshot {
                timestamp,
                prices: prices(entries),
            })
            .collect();

        SnapshotHistory {
            last_snapshot_time: snapshots.last().map(|s| s.timestamp).unwrap_or(0),
            snapshots,
        }
    }

    #[test]
    fn test_change_unavailable_without_snapshots() {
        let history = SnapshotHistory::default();
        let policy = SnapshotPolicy::default();

        assert_eq!(compute_24h_change(&history, "SNEK", 12.0, NOW, &policy), None);
    }

    #[test]
    fn test_change_unavailable_for_non_positive_price() {
        let history = history_with(vec![(NOW - 86_400, &[("SNEK", 10.0)])]);
        let policy = SnapshotPolicy::default();

        for price in [0.0, -1.0, f64::NAN] {
            assert_eq!(compute_24h_change(&history, "SNEK", price, NOW, &policy), None);
        }
    }

    #[test]
    fn test_change_exact_24h_match() {
        let history = history_with(vec![(NOW - 86_400, &[("SNEK", 10.0)])]);
        let policy = SnapshotPolicy::default();

        assert_eq!(
            compute_24h_change(&history, "SNEK", 12.0, NOW, &policy),
            Some(20.0)
        );
    }

    #[test]
    fn test_change_picks_closest_snapshot() {
        // target = NOW - 86400. 90000은 3600초, 86000은 400초 떨어져 있음
        let history = history_with(vec![
            (NOW - 90_000, &[("SNEK", 5.0)]),
            (NOW - 86_000, &[("SNEK", 8.0)]),
        ]);
        let policy = SnapshotPolicy::default();

        assert_eq!(
            compute_24h_change(&history, "SNEK", 10.0, NOW, &policy),
            Some(25.0)
        );
    }

    #[test]
    fn test_change_tolerance_boundary() {
        let policy = SnapshotPolicy::default();

        let too_far = history_with(vec![(NOW - 86_400 - 7201, &[("SNEK", 10.0)])]);
        assert_eq!(compute_24h_change(&too_far, "SNEK", 12.0, NOW, &policy), None);

        let edge = history_with(vec![(NOW - 86_400 + 7200, &[("SNEK", 10.0)])]);
        assert!(compute_24h_change(&edge, "SNEK", 12.0, NOW, &policy).is_some());
    }

    #[test]
    fn test_change_ignores_snapshots_without_symbol() {
        let history = history_with(vec![
            (NOW - 86_400, &[("MIN", 1.0)]),
            (NOW - 84_000, &[("SNEK", 10.0)]),
        ]);
        let policy = SnapshotPolicy::default();

        // SNEK이 있는 스냅샷은 2400초 거리
        assert_eq!(
            compute_24h_change(&history, "SNEK", 11.0, NOW, &policy),
            Some((11.0 - 10.0) / 10.0 * 100.0)
        );
        assert_eq!(compute_24h_change(&history, "IAG", 1.0, NOW, &policy), None);
    }

    #[test]
    fn test_change_tie_uses_first_snapshot() {
        let history = history_with(vec![
            (NOW - 86_400 - 600, &[("SNEK", 10.0)]),
            (NOW - 86_400 + 600, &[("SNEK", 20.0)]),
        ]);
        let policy = SnapshotPolicy::default();

        assert_eq!(
            compute_24h_change(&history, "SNEK", 15.0, NOW, &policy),
            Some(50.0)
        );
    }

    #[test]
    fn test_change_unavailable_for_non_positive_past_price() {
        let history = history_with(vec![(NOW - 86_400, &[("SNEK", 0.0)])]);
        let policy = SnapshotPolicy::default();

        assert_eq!(compute_24h_change(&history, "SNEK", 1.0, NOW, &policy), None);
    }

    #[test]
    fn test_first_snapshot_always_taken() {
        let mut history = SnapshotHistory::default();
        let policy = SnapshotPolicy::default();

        assert!(record_snapshot_if_due(&mut history, &prices(&[("SNEK", 1.0)]), NOW, &policy));
        assert_eq!(history.last_snapshot_time, NOW);
        assert_eq!(history.snapshots.len(), 1);
    }

    #[test]
    fn test_second_snapshot_within_hour_is_noop() {
        let mut history = SnapshotHistory::default();
        let policy = SnapshotPolicy::default();

        record_snapshot_if_due(&mut history, &prices(&[("SNEK", 1.0)]), NOW, &policy);
        let before = history.clone();

        assert!(!record_snapshot_if_due(
            &mut history,
            &prices(&[("SNEK", 2.0)]),
            NOW + 3599,
            &policy
        ));
        assert_eq!(history, before);
    }

    #[test]
    fn test_interval_boundary_inclusive() {
        let mut history = SnapshotHistory::default();
        let policy = SnapshotPolicy::default();

        assert!(record_snapshot_if_due(&mut history, &prices(&[]), NOW, &policy));
        assert!(record_snapshot_if_due(&mut history, &prices(&[]), NOW + 3600, &policy));
        assert_eq!(history.snapshots.len(), 2);
    }

    #[test]
    fn test_pruning_after_thirty_hourly_snapshots() {
        let mut history = SnapshotHistory::default();
        let policy = SnapshotPolicy::default();

        for hour in 0..30 {
            let now = NOW + hour * 3600;
            record_snapshot_if_due(&mut history, &prices(&[("SNEK", 1.0)]), now, &policy);

            assert!(history.snapshots.iter().all(|s| s.timestamp >= now - 90_000));
        }

        // 25시간 + 현재 = 26개
        assert_eq!(history.snapshots.len(), 26);
    }

    #[test]
    fn test_policy_is_configurable() {
        let config = HistoryConfig {
            snapshot_interval_secs: 60,
            retention_secs: 600,
            lookback_secs: 300,
            tolerance_secs: 30,
        };
        let policy = SnapshotPolicy::from(&config);
        let history = history_with(vec![(NOW - 320, &[("SNEK", 4.0)])]);

        assert_eq!(compute_24h_change(&history, "SNEK", 5.0, NOW, &policy), Some(25.0));
        assert_eq!(compute_24h_change(&history, "SNEK", 5.0, NOW + 15, &policy), None);
    }

    #[test]
    fn test_history_json_layout() {
        let json = r#"{
            "last_snapshot": 1700000000,
            "snapshots": [
                {"ts": 1699990000, "prices": {"SNEK": 0.002, "NIGHT": null}},
                {"ts": 1700000000, "prices": []}
            ]
        }"#;

        let history: SnapshotHistory = serde_json::from_str(json).unwrap();

        assert_eq!(history.last_snapshot_time, 1_700_000_000);
        assert_eq!(history.snapshots[0].prices, prices(&[("SNEK", 0.002)]));
        assert!(history.snapshots[1].prices.is_empty());

        let encoded = serde_json::to_value(&history).unwrap();
        assert_eq!(encoded["last_snapshot"], 1_700_000_000);
        assert_eq!(encoded["snapshots"][0]["ts"], 1_699_990_000);
    }

    #[test]
    fn test_missing_fields_default() {
        let history: SnapshotHistory = serde_json::from_str("{}").unwrap();
        assert_eq!(history, SnapshotHistory::default());
    }

    proptest! {
        #[test]
        fn pruning_invariant_holds(gaps in proptest::collection::vec(0i64..10_000, 1..60)) {
            let mut history = SnapshotHistory::default();
            let policy = SnapshotPolicy::default();
            let mut now = NOW;

            for gap in gaps {
                now += gap;
                record_snapshot_if_due(&mut history, &prices(&[("SNEK", 1.0)]), now, &policy);

                prop_assert!(history.snapshots.iter().all(|s| s.timestamp >= history.last_snapshot_time - policy.retention));
                prop_assert!(history.snapshots.windows(2).all(|w| w[1].timestamp - w[0].timestamp >= policy.min_interval));
            }
        }
    }

    /// 쓰기가 항상 실패하는 저장소
    struct ReadOnlyStore(InMemoryBlobStore);

    #[async_trait]
    impl BlobStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }

        async fn put(&self, _key: &str, _blob: &[u8]) -> MarketResult<()> {
            Err(MarketError::Storage("disk full".to_string()))
        }
    }

    fn store_over(blobs: Arc<dyn BlobStore>) -> SnapshotStore {
        SnapshotStore::new(blobs, Arc::new(KeyedLocks::new()), SnapshotPolicy::default())
    }

    #[tokio::test]
    async fn test_store_persists_due_snapshot() {
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let store = store_over(blobs.clone());

        let first = store.update(&prices(&[("SNEK", 1.0)]), NOW).await;
        let second = store.update(&prices(&[("SNEK", 2.0)]), NOW + 60).await;

        assert_eq!(first.snapshots.len(), 1);
        assert_eq!(second, first);
        assert_eq!(store.load().await, first);
    }

    #[tokio::test]
    async fn test_store_discards_update_on_write_failure() {
        let inner = InMemoryBlobStore::new();
        let seeded = history_with(vec![(NOW - 7200, &[("SNEK", 1.0)])]);
        inner
            .put(HISTORY_KEY, &serde_json::to_vec(&seeded).unwrap())
            .await
            .unwrap();
        let store = store_over(Arc::new(ReadOnlyStore(inner)));

        let history = store.update(&prices(&[("SNEK", 2.0)]), NOW).await;

        assert_eq!(history, seeded);
    }

    #[tokio::test]
    async fn test_store_recovers_from_corrupt_blob() {
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        blobs.put(HISTORY_KEY, b"not json").await.unwrap();
        let store = store_over(blobs);

        let history = store.update(&prices(&[("SNEK", 1.0)]), NOW).await;

        assert_eq!(history.snapshots.len(), 1);
        assert_eq!(history.last_snapshot_time, NOW);
    }

    #[tokio::test]
    async fn test_extreme_timestamps_in_stored_blob() {
        let raw = format!(
            r#"{{"last_snapshot": {min}, "snapshots": [{{"ts": {min}, "prices": {{"SNEK": 1.0}}}}]}}"#,
            min = i64::MIN
        );
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        blobs.put(HISTORY_KEY, raw.as_bytes()).await.unwrap();
        let store = store_over(blobs);
        let policy = SnapshotPolicy::default();

        let loaded = store.load().await;
        assert_eq!(loaded.snapshots.len(), 1);
        assert_eq!(compute_24h_change(&loaded, "SNEK", 2.0, NOW, &policy), None);
        assert_eq!(compute_24h_change(&loaded, "SNEK", 2.0, i64::MAX, &policy), None);

        let history = store.update(&prices(&[("SNEK", 2.0)]), NOW).await;

        // 범위 밖 스냅샷은 보존 기간 정리로 사라진다
        assert_eq!(history.snapshots.len(), 1);
        assert_eq!(history.snapshots[0].timestamp, NOW);
        assert_eq!(history.last_snapshot_time, NOW);
    }
}
