use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::error::AppResult;
use std::{future::Future, sync::Arc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub from_address: String,
    // テスト運用時はすべての通知をこの宛先に送る
    pub redirect_to: Option<String>,
    pub cc_contact: bool,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: "calendar@localhost".into(),
            redirect_to: None,
            cc_contact: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedValue<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// Single-value cache with an explicit TTL and an injected clock.
pub struct SettingsCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: RwLock<Option<CachedValue<T>>>,
}

impl<T: Clone> SettingsCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: RwLock::new(None),
        }
    }

    /// 有効期限内の値があれば返す
    pub async fn get(&self) -> Option<T> {
        let now = self.clock.now();
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| now - e.fetched_at < self.ttl)
            .map(|e| e.value.clone())
    }

    pub async fn put(&self, value: T) {
        *self.entry.write().await = Some(CachedValue {
            value,
            fetched_at: self.clock.now(),
        });
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }

    /// キャッシュが古ければ `fetch` で取り直す。取得に失敗した場合はキャッシュを更新しない
    pub async fn get_or_try_fetch<F, Fut>(&self, fetch: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(value) = self.get().await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.put(value.clone()).await;
        Ok(value)
    }
}
