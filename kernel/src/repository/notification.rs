use crate::model::notification::ReservationNotification;
use async_trait::async_trait;
use shared::error::AppResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &ReservationNotification) -> AppResult<()>;
}
