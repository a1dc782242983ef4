//! In-process document store implementing the repository ports.
//!
//! Every operation runs under one lock, so the check-and-set of a review hold
//! and the version-checked writes are atomic in the same way the conditional
//! `UPDATE`s of the PostgreSQL repositories are.

use async_trait::async_trait;
use kernel::model::{
    id::{ChangeKey, ReservationId},
    reservation::{
        event::{
            AcquireReviewHold, CreateReservation, ReleaseReviewHold, TransitionStatus,
            UpdateReservation,
        },
        review::{HoldAttempt, HoldOutcome, PlannedWrite, UpdateOutcome, VersionConflict},
        CommunicationRecord, Reservation, ReservationListFilter, ReservationRevision,
    },
    settings::EmailSettings,
    user::{event::UpdateUserRole, User, UserRecord},
};
use kernel::repository::{
    health::HealthCheckRepository, reservation::ReservationRepository,
    settings::SettingsRepository, user::UserRepository,
};
use shared::error::{AppError, AppResult};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct ReservationStore {
    reservations: HashMap<ReservationId, Reservation>,
    revisions: HashMap<(ReservationId, ChangeKey), ReservationRevision>,
}

impl ReservationStore {
    fn existing(&self, reservation_id: ReservationId) -> AppResult<&Reservation> {
        self.reservations.get(&reservation_id).ok_or_else(|| {
            AppError::EntityNotFound(format!("予約（{reservation_id}）が見つかりませんでした。"))
        })
    }

    fn version_conflict(
        &self,
        presented: &ChangeKey,
        current: &Reservation,
    ) -> AppResult<UpdateOutcome> {
        let base = self
            .revisions
            .get(&(current.reservation_id, presented.clone()));
        VersionConflict::between(base, current).map(UpdateOutcome::Conflict)
    }

    fn write_planned(&mut self, plan: PlannedWrite) -> AppResult<UpdateOutcome> {
        let current = self.existing(plan.reservation_id)?;
        let reservation = plan.apply_to(current);
        let revision = plan.revision();
        self.revisions.insert(
            (revision.reservation_id, revision.change_key.clone()),
            revision,
        );
        self.reservations
            .insert(reservation.reservation_id, reservation.clone());
        Ok(UpdateOutcome::Updated {
            reservation,
            changes: plan.changes,
        })
    }
}

#[derive(Default)]
pub struct InMemoryReservationRepository {
    store: Mutex<ReservationStore>,
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn create(&self, event: CreateReservation) -> AppResult<Reservation> {
        let (reservation, revision) = event.into_initial()?;
        let mut store = self.store.lock().await;

        if let Some(previous) = reservation.previous_reservation_id {
            store.existing(previous)?;
            if store
                .reservations
                .values()
                .any(|r| r.previous_reservation_id == Some(previous))
            {
                return Err(AppError::UnprocessableEntity(
                    "this reservation has already been resubmitted".into(),
                ));
            }
        }

        store.revisions.insert(
            (revision.reservation_id, revision.change_key.clone()),
            revision,
        );
        store
            .reservations
            .insert(reservation.reservation_id, reservation.clone());
        Ok(reservation)
    }

    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Option<Reservation>> {
        Ok(self
            .store
            .lock()
            .await
            .reservations
            .get(&reservation_id)
            .cloned())
    }

    async fn find_all(&self, filter: ReservationListFilter) -> AppResult<Vec<Reservation>> {
        let store = self.store.lock().await;
        let mut reservations: Vec<Reservation> = store
            .reservations
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }

    async fn acquire_review_hold(&self, event: AcquireReviewHold) -> AppResult<HoldOutcome> {
        let mut store = self.store.lock().await;
        let Some(reservation) = store.reservations.get_mut(&event.reservation_id) else {
            return Err(AppError::EntityNotFound(format!(
                "予約（{}）が見つかりませんでした。",
                event.reservation_id
            )));
        };

        if let HoldAttempt::Conflict(conflict) = event.attempt(reservation.review_hold.as_ref()) {
            return Ok(HoldOutcome::Conflict(conflict));
        }

        let hold = event.hold();
        reservation.review_hold = Some(hold.clone());
        Ok(HoldOutcome::Acquired {
            hold,
            change_key: reservation.change_key.clone(),
        })
    }

    async fn release_review_hold(&self, event: ReleaseReviewHold) -> AppResult<()> {
        let mut store = self.store.lock().await;
        if let Some(reservation) = store.reservations.get_mut(&event.reservation_id) {
            if reservation
                .review_hold
                .as_ref()
                .is_some_and(|h| h.is_held_by(&event.requested_by))
            {
                reservation.review_hold = None;
            }
        }
        Ok(())
    }

    async fn update(&self, event: UpdateReservation) -> AppResult<UpdateOutcome> {
        let mut store = self.store.lock().await;
        let current = store.existing(event.reservation_id)?;
        if current.change_key != event.presented_change_key {
            return store.version_conflict(&event.presented_change_key, current);
        }
        let plan = event.plan(current)?;
        store.write_planned(plan)
    }

    async fn transition_status(&self, event: TransitionStatus) -> AppResult<UpdateOutcome> {
        let mut store = self.store.lock().await;
        let current = store.existing(event.reservation_id)?;
        if current.change_key != event.presented_change_key {
            return store.version_conflict(&event.presented_change_key, current);
        }
        let plan = event.plan(current)?;
        store.write_planned(plan)
    }

    async fn append_communication(
        &self,
        reservation_id: ReservationId,
        record: CommunicationRecord,
    ) -> AppResult<()> {
        let mut store = self.store.lock().await;
        let Some(reservation) = store.reservations.get_mut(&reservation_id) else {
            return Err(AppError::EntityNotFound(format!(
                "予約（{reservation_id}）が見つかりませんでした。"
            )));
        };
        reservation.communication_history.push(record);
        Ok(())
    }
}

pub struct InMemoryUserRepository {
    users: Mutex<Vec<UserRecord>>,
}

impl InMemoryUserRepository {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users: Mutex::new(users),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .map(User::from))
    }

    async fn find_all(&self) -> AppResult<Vec<User>> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .cloned()
            .map(User::from)
            .collect())
    }

    async fn update_role(&self, event: UpdateUserRole) -> AppResult<()> {
        let mut users = self.users.lock().await;
        let Some(user) = users.iter_mut().find(|u| u.user_id == event.user_id) else {
            return Err(AppError::EntityNotFound(format!(
                "ユーザー（{}）が見つかりませんでした。",
                event.user_id
            )));
        };
        user.role = Some(event.role.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    email: Mutex<Option<EmailSettings>>,
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn email_settings(&self) -> AppResult<EmailSettings> {
        Ok(self.email.lock().await.clone().unwrap_or_default())
    }

    async fn save_email_settings(&self, settings: EmailSettings) -> AppResult<()> {
        *self.email.lock().await = Some(settings);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryHealthCheckRepository;

#[async_trait]
impl HealthCheckRepository for InMemoryHealthCheckRepository {
    async fn check_db(&self) -> bool {
        true
    }
}
