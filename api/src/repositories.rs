use async_trait::async_trait;
use posada_common::error::{MarketError, MarketResult};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 키-값 blob 저장소 인터페이스
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 저장된 blob 조회. 없으면 None
    async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>>;
    /// blob 저장 (없으면 생성, 있으면 교체)
    async fn put(&self, key: &str, blob: &[u8]) -> MarketResult<()>;
}

/// 키 하나에 JSON 파일 하나를 쓰는 저장소
///
/// 쓰기는 임시 파일에 먼저 기록한 뒤 rename하므로 읽는 쪽은 항상
/// 완전한 이전 버전 또는 새 버전만 본다.
pub struct FileBlobStore {
    root: PathBuf,
    seq: AtomicU64,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> MarketResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if !valid {
            return Err(MarketError::Storage(format!("invalid blob key: {:?}", key)));
        }

        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, blob: &[u8]) -> MarketResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .root
            .join(format!(".{}.json.tmp-{}-{}", key, std::process::id(), seq));

        if let Err(e) = tokio::fs::write(&tmp, blob).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }
}

/// 인메모리 blob 저장소 구현
pub struct InMemoryBlobStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|_| MarketError::Storage("Lock error".to_string()))?;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, blob: &[u8]) -> MarketResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| MarketError::Storage("Lock error".to_string()))?;
        data.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Per-key async locks guarding read-modify-write cycles on a blob.
///
/// Entries nobody holds or waits on are dropped the next time any key is
/// locked.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };

        mutex.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
