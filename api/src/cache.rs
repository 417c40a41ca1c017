//! TTL 기반 응답 캐시
//!
//! 모든 캐시 blob은 `{ "ts": <저장 시각>, "data": <응답> }` 형태로 저장된다.
//! 만료된 항목도 지우지 않고, 업스트림 호출이 실패하면 그대로 내려준다.

use crate::repositories::{BlobStore, KeyedLocks};
use posada_common::error::MarketResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 저장 시각이 붙은 캐시 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    pub ts: i64,
    pub data: T,
}

/// 캐시 응답의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// TTL 이내 캐시 항목
    Fresh,
    /// 방금 업스트림에서 새로 받아온 값
    Refreshed,
    /// 갱신에 실패해 만료된 항목을 그대로 사용
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub data: T,
    pub ts: i64,
    pub freshness: Freshness,
}

impl<T> CacheHit<T> {
    fn from_envelope(envelope: Cached<T>, freshness: Freshness) -> Self {
        Self {
            data: envelope.data,
            ts: envelope.ts,
            freshness,
        }
    }
}

/// blob 저장소 위의 캐시-또는-조회 헬퍼
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn BlobStore>,
    locks: Arc<KeyedLocks>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn BlobStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// 나이와 무관하게 저장된 항목 조회. 없거나 깨졌으면 None
    pub async fn read_any<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn write<T: Serialize>(&self, key: &str, ts: i64, data: &T) -> MarketResult<()> {
        let bytes = serde_json::to_vec(&Cached { ts, data })?;
        self.store.put(key, &bytes).await
    }

    /// TTL 이내면 캐시, 아니면 `fetch` 결과를 저장해서 반환
    ///
    /// 같은 키에 대한 동시 호출은 키 락으로 직렬화되므로 업스트림 호출은
    /// 한 번만 일어난다. `fetch`가 실패하거나 `None`을 돌려주면 만료된
    /// 항목으로 대체하고, 그것도 없으면 에러 또는 None.
    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        key: &str,
        ttl: i64,
        now: i64,
        fetch: F,
    ) -> anyhow::Result<Option<CacheHit<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        let _guard = self.locks.lock(key).await;

        let cached = match self.read_any::<T>(key).await {
            Some(envelope) if now - envelope.ts < ttl => {
                debug!("Cache hit: {} ({}s old)", key, now - envelope.ts);
                return Ok(Some(CacheHit::from_envelope(envelope, Freshness::Fresh)));
            }
            other => other,
        };

        match fetch().await {
            Ok(Some(data)) => {
                if let Err(e) = self.write(key, now, &data).await {
                    warn!("Failed to persist cache entry {}: {}", key, e);
                }
                info!("🔄 Cache refreshed: {}", key);
                Ok(Some(CacheHit {
                    data,
                    ts: now,
                    freshness: Freshness::Refreshed,
                }))
            }
            Ok(None) => {
                if cached.is_some() {
                    warn!("Upstream returned nothing for {}, serving stale entry", key);
                }
                Ok(cached.map(|envelope| CacheHit::from_envelope(envelope, Freshness::Stale)))
            }
            Err(e) => match cached {
                Some(envelope) => {
                    warn!("Refresh of {} failed, serving stale entry: {:#}", key, e);
                    Ok(Some(CacheHit::from_envelope(envelope, Freshness::Stale)))
                }
                None => Err(e),
            },
        }
    }
}
