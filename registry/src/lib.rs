use std::sync::Arc;

use adapter::memory::{
    InMemoryHealthCheckRepository, InMemoryReservationRepository, InMemorySettingsRepository,
    InMemoryUserRepository,
};
use adapter::notifier::TracingNotifier;
use adapter::repository::{
    reservation::ReservationRepositoryImpl,
    settings::{CachedSettingsRepository, SettingsRepositoryImpl},
    user::UserRepositoryImpl,
};
use adapter::{database::ConnectionPool, repository::health::HealthCheckRepositoryImpl};
use kernel::clock::{Clock, SystemClock};
use kernel::model::user::UserRecord;
use kernel::notification::NotificationDispatcher;
use kernel::repository::health::HealthCheckRepository;
use kernel::repository::notification::Notifier;
use kernel::repository::reservation::ReservationRepository;
use kernel::repository::settings::SettingsRepository;
use kernel::repository::user::UserRepository;
use shared::config::{AppConfig, ReviewConfig, SettingsConfig};

#[derive(Clone)]
pub struct AppRegistry {
    health_check_repository: Arc<dyn HealthCheckRepository>,
    reservation_repository: Arc<dyn ReservationRepository>,
    user_repository: Arc<dyn UserRepository>,
    settings_repository: Arc<dyn SettingsRepository>,
    notification_dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    review_config: ReviewConfig,
}

impl AppRegistry {
    pub fn new(pool: ConnectionPool, app_config: &AppConfig) -> Self {
        let health_check_repository = Arc::new(HealthCheckRepositoryImpl::new(pool.clone()));
        let reservation_repository = Arc::new(ReservationRepositoryImpl::new(pool.clone()));
        let user_repository = Arc::new(UserRepositoryImpl::new(pool.clone()));
        let settings_repository = Arc::new(SettingsRepositoryImpl::new(pool.clone()));
        Self::assemble(
            health_check_repository,
            reservation_repository,
            user_repository,
            settings_repository,
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
            app_config.review,
            app_config.settings,
        )
    }

    // データベースを使わない構成。テストと STORAGE_BACKEND=memory で使う
    pub fn in_memory(
        users: Vec<UserRecord>,
        clock: Arc<dyn Clock>,
        review_config: ReviewConfig,
        settings_config: SettingsConfig,
    ) -> Self {
        Self::assemble(
            Arc::new(InMemoryHealthCheckRepository),
            Arc::new(InMemoryReservationRepository::default()),
            Arc::new(InMemoryUserRepository::new(users)),
            Arc::new(InMemorySettingsRepository::default()),
            Arc::new(TracingNotifier),
            clock,
            review_config,
            settings_config,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        health_check_repository: Arc<dyn HealthCheckRepository>,
        reservation_repository: Arc<dyn ReservationRepository>,
        user_repository: Arc<dyn UserRepository>,
        settings_store: Arc<dyn SettingsRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        review_config: ReviewConfig,
        settings_config: SettingsConfig,
    ) -> Self {
        let ttl = chrono::Duration::seconds(settings_config.bounded_ttl_secs());
        let settings_repository: Arc<dyn SettingsRepository> = Arc::new(
            CachedSettingsRepository::new(settings_store, ttl, clock.clone()),
        );
        let notification_dispatcher = NotificationDispatcher::new(
            reservation_repository.clone(),
            settings_repository.clone(),
            notifier,
            clock.clone(),
        );
        Self {
            health_check_repository,
            reservation_repository,
            user_repository,
            settings_repository,
            notification_dispatcher,
            clock,
            review_config,
        }
    }

    pub fn health_check_repository(&self) -> Arc<dyn HealthCheckRepository> {
        self.health_check_repository.clone()
    }

    pub fn reservation_repository(&self) -> Arc<dyn ReservationRepository> {
        self.reservation_repository.clone()
    }

    pub fn user_repository(&self) -> Arc<dyn UserRepository> {
        self.user_repository.clone()
    }

    pub fn settings_repository(&self) -> Arc<dyn SettingsRepository> {
        self.settings_repository.clone()
    }

    pub fn notification_dispatcher(&self) -> &NotificationDispatcher {
        &self.notification_dispatcher
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn review_hold_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.review_config.bounded_hold_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_durations_are_bounded() {
        let registry = AppRegistry::in_memory(
            vec![],
            Arc::new(SystemClock),
            ReviewConfig { hold_minutes: -5 },
            SettingsConfig {
                cache_ttl_secs: u64::MAX,
            },
        );
        assert_eq!(registry.review_hold_duration(), chrono::Duration::minutes(1));

        let registry = AppRegistry::in_memory(
            vec![],
            Arc::new(SystemClock),
            ReviewConfig {
                hold_minutes: i64::MAX,
            },
            SettingsConfig::default(),
        );
        assert_eq!(
            registry.review_hold_duration(),
            chrono::Duration::minutes(ReviewConfig::MAX_HOLD_MINUTES)
        );
    }
}
