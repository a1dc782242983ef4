use crate::{
    clock::Clock,
    model::{
        change::{FieldChange, ValueFormatter},
        notification::{NotificationKind, ReservationNotification},
        reservation::{CommunicationRecord, Reservation},
    },
    repository::{
        notification::Notifier, reservation::ReservationRepository, settings::SettingsRepository,
    },
};
use derive_new::new;
use shared::error::AppResult;
use std::sync::Arc;

/// Sends reservation notifications and records each attempt in the
/// reservation's communication history.
#[derive(new, Clone)]
pub struct NotificationDispatcher {
    reservations: Arc<dyn ReservationRepository>,
    settings: Arc<dyn SettingsRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    /// 通知が無効な場合は何もせず `None` を返す。
    /// 送信に失敗しても履歴には `success: false` として残す
    pub async fn dispatch(
        &self,
        reservation: &Reservation,
        kind: NotificationKind,
        changes: &[FieldChange],
    ) -> AppResult<Option<CommunicationRecord>> {
        let settings = self.settings.email_settings().await?;
        let Some(notification) = ReservationNotification::build(
            reservation,
            kind,
            changes,
            &settings,
            &ValueFormatter::new(),
        ) else {
            return Ok(None);
        };

        let success = match self.notifier.send(&notification).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    reservation_id = %reservation.reservation_id,
                    kind = %kind,
                    error.message = %e,
                    "failed to send reservation notification"
                );
                false
            }
        };

        let record = notification.to_record(success, self.clock.now());
        self.reservations
            .append_communication(reservation.reservation_id, record.clone())
            .await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        model::{
            reservation::fixtures::{sample_reservation, t0},
            settings::EmailSettings,
        },
        repository::{
            notification::MockNotifier, reservation::MockReservationRepository,
            settings::MockSettingsRepository,
        },
    };
    use mockall::predicate::always;
    use shared::error::AppError;

    fn settings(enabled: bool) -> MockSettingsRepository {
        let mut settings = MockSettingsRepository::new();
        settings.expect_email_settings().returning(move || {
            Ok(EmailSettings {
                enabled,
                ..Default::default()
            })
        });
        settings
    }

    #[tokio::test]
    async fn records_failed_delivery_without_failing() -> AppResult<()> {
        let reservation = sample_reservation();
        let id = reservation.reservation_id;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(AppError::ExternalServiceError("smtp down".into())));

        let mut reservations = MockReservationRepository::new();
        reservations
            .expect_append_communication()
            .withf(move |rid, record| *rid == id && !record.success)
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = NotificationDispatcher::new(
            Arc::new(reservations),
            Arc::new(settings(true)),
            Arc::new(notifier),
            Arc::new(ManualClock::new(t0())),
        );
        let record = dispatcher
            .dispatch(&reservation, NotificationKind::Submitted, &[])
            .await?
            .expect("a record is appended");
        assert_eq!(record.timestamp, t0());
        assert_eq!(record.recipients, vec!["requester@example.org"]);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_email_sends_nothing() -> AppResult<()> {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().with(always()).never();
        let mut reservations = MockReservationRepository::new();
        reservations.expect_append_communication().never();

        let dispatcher = NotificationDispatcher::new(
            Arc::new(reservations),
            Arc::new(settings(false)),
            Arc::new(notifier),
            Arc::new(ManualClock::new(t0())),
        );
        let record = dispatcher
            .dispatch(&sample_reservation(), NotificationKind::Approved, &[])
            .await?;
        assert!(record.is_none());
        Ok(())
    }
}
