use crate::model::settings::EmailSettings;
use async_trait::async_trait;
use shared::error::AppResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    // 未保存の場合はデフォルト値を返す
    async fn email_settings(&self) -> AppResult<EmailSettings>;
    async fn save_email_settings(&self, settings: EmailSettings) -> AppResult<()>;
}
