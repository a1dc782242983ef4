use crate::database::ConnectionPool;
use async_trait::async_trait;
use derive_new::new;
use kernel::{
    clock::Clock,
    model::settings::{EmailSettings, SettingsCache},
    repository::settings::SettingsRepository,
};
use shared::error::{AppError, AppResult};
use sqlx::types::Json;
use std::sync::Arc;

const EMAIL_SETTINGS_KEY: &str = "email";

#[derive(new)]
pub struct SettingsRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl SettingsRepository for SettingsRepositoryImpl {
    async fn email_settings(&self) -> AppResult<EmailSettings> {
        let row: Option<(Json<EmailSettings>,)> = sqlx::query_as(
            r#"
                SELECT value FROM app_settings WHERE setting_key = $1
            "#,
        )
        .bind(EMAIL_SETTINGS_KEY)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(|(v,)| v.0).unwrap_or_default())
    }

    async fn save_email_settings(&self, settings: EmailSettings) -> AppResult<()> {
        sqlx::query(
            r#"
                INSERT INTO app_settings (setting_key, value)
                VALUES ($1, $2)
                ON CONFLICT (setting_key)
                DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP(3)
            "#,
        )
        .bind(EMAIL_SETTINGS_KEY)
        .bind(Json(&settings))
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;
        Ok(())
    }
}

/// Serves email settings from a TTL cache in front of another repository.
pub struct CachedSettingsRepository {
    inner: Arc<dyn SettingsRepository>,
    cache: SettingsCache<EmailSettings>,
}

impl CachedSettingsRepository {
    pub fn new(inner: Arc<dyn SettingsRepository>, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: SettingsCache::new(ttl, clock),
        }
    }
}

#[async_trait]
impl SettingsRepository for CachedSettingsRepository {
    async fn email_settings(&self) -> AppResult<EmailSettings> {
        self.cache
            .get_or_try_fetch(|| self.inner.email_settings())
            .await
    }

    async fn save_email_settings(&self, settings: EmailSettings) -> AppResult<()> {
        self.inner.save_email_settings(settings).await?;
        self.cache.invalidate().await;
        Ok(())
    }
}
