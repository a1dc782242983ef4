use super::{
    review::{HoldAttempt, HoldConflict, HoldRelease, PlannedWrite},
    Requester, Reservation, ReservationFields, ReservationRevision, ReservationStatus, ReviewHold,
};
use crate::model::{
    change::{detect_changes, NOTIFIABLE_FIELDS},
    id::{ChangeKey, ReservationId},
};
use chrono::{DateTime, Duration, Utc};
use derive_new::new;
use serde_json::{Map, Value};
use shared::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousRevision {
    pub reservation_id: ReservationId,
    pub revision: i32,
}

#[derive(new)]
pub struct CreateReservation {
    pub fields: ReservationFields,
    pub requester: Requester,
    pub previous: Option<PreviousRevision>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl CreateReservation {
    /// 新規予約のレコードと、その最初の版のスナップショットを作る
    pub fn into_initial(self) -> AppResult<(Reservation, ReservationRevision)> {
        self.fields.validate()?;
        let reservation = Reservation {
            reservation_id: ReservationId::new(),
            change_key: ChangeKey::generate(),
            status: ReservationStatus::Pending,
            fields: self.fields,
            requester: self.requester,
            review_hold: None,
            review_notes: None,
            revision: self.previous.map_or(1, |p| p.revision + 1),
            previous_reservation_id: self.previous.map(|p| p.reservation_id),
            last_modified_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.created_at,
            communication_history: vec![],
        };
        let revision = ReservationRevision {
            reservation_id: reservation.reservation_id,
            change_key: reservation.change_key.clone(),
            fields: reservation.fields.clone(),
            recorded_by: reservation.last_modified_by.clone(),
            recorded_at: reservation.created_at,
        };
        Ok((reservation, revision))
    }
}

#[derive(new)]
pub struct AcquireReviewHold {
    pub reservation_id: ReservationId,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub duration: Duration,
}

impl AcquireReviewHold {
    pub fn hold(&self) -> ReviewHold {
        ReviewHold {
            reviewing_by: self.requested_by.clone(),
            review_expires_at: self.requested_at + self.duration,
        }
    }

    /// ホールドを取得（または延長）できるか。
    /// 無い・期限切れ・本人のもの、のいずれかなら取得できる
    pub fn can_take(&self, current: Option<&ReviewHold>) -> bool {
        current.map_or(true, |h| {
            !h.is_active_at(self.requested_at) || h.is_held_by(&self.requested_by)
        })
    }

    pub fn attempt(&self, current: Option<&ReviewHold>) -> HoldAttempt {
        match current {
            Some(held) if !self.can_take(Some(held)) => {
                HoldAttempt::Conflict(HoldConflict::new(held, self.requested_at))
            }
            _ => HoldAttempt::Available,
        }
    }

    /// 条件付き書き込みが外れ続けたときのエラー
    pub fn retries_exhausted(&self) -> AppError {
        AppError::NoRowsAffectedError(format!(
            "review hold on {} could not be acquired",
            self.reservation_id
        ))
    }
}

#[derive(new)]
pub struct ReleaseReviewHold {
    pub reservation_id: ReservationId,
    pub requested_by: String,
}

#[derive(new)]
pub struct UpdateReservation {
    pub reservation_id: ReservationId,
    pub presented_change_key: ChangeKey,
    pub changes: Map<String, Value>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl UpdateReservation {
    pub fn plan(&self, current: &Reservation) -> AppResult<PlannedWrite> {
        if !current.status.is_editable() {
            return Err(AppError::UnprocessableEntity(format!(
                "a {} reservation cannot be edited",
                current.status
            )));
        }
        let fields = current.fields.apply_changes(&self.changes)?;

        // 送られてきたキーだけを、保存される形に正規化した値で比較する
        let new_doc = fields.to_document()?;
        let sent: Map<String, Value> = self
            .changes
            .keys()
            .map(|k| (k.clone(), new_doc.get(k).cloned().unwrap_or(Value::Null)))
            .collect();
        let changes = detect_changes(
            &current.fields.to_document()?,
            &Value::Object(sent),
            NOTIFIABLE_FIELDS,
        );

        Ok(PlannedWrite {
            reservation_id: current.reservation_id,
            expected_change_key: self.presented_change_key.clone(),
            change_key: ChangeKey::generate(),
            status: current.status,
            fields,
            review_notes: current.review_notes.clone(),
            hold_release: HoldRelease::IfHeldByWriter,
            modified_by: self.updated_by.clone(),
            modified_at: self.updated_at,
            changes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Approve { notes: Option<String> },
    Reject { reason: String },
    Cancel { reason: Option<String> },
}

impl ReviewAction {
    pub fn target_status(&self) -> ReservationStatus {
        match self {
            Self::Approve { .. } => ReservationStatus::Approved,
            Self::Reject { .. } => ReservationStatus::Rejected,
            Self::Cancel { .. } => ReservationStatus::Cancelled,
        }
    }
}

#[derive(new)]
pub struct TransitionStatus {
    pub reservation_id: ReservationId,
    pub presented_change_key: ChangeKey,
    pub action: ReviewAction,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
}

impl TransitionStatus {
    pub fn plan(&self, current: &Reservation) -> AppResult<PlannedWrite> {
        let next = self.action.target_status();
        if !current.status.can_transition_to(next) {
            return Err(AppError::UnprocessableEntity(format!(
                "a {} reservation cannot become {next}",
                current.status
            )));
        }
        let review_notes = match &self.action {
            ReviewAction::Reject { reason } if reason.trim().is_empty() => {
                return Err(AppError::UnprocessableEntity(
                    "a rejection needs a reason".into(),
                ))
            }
            ReviewAction::Reject { reason } => Some(reason.clone()),
            ReviewAction::Approve { notes } | ReviewAction::Cancel { reason: notes } => notes
                .clone()
                .or_else(|| current.review_notes.clone()),
        };

        Ok(PlannedWrite {
            reservation_id: current.reservation_id,
            expected_change_key: self.presented_change_key.clone(),
            change_key: ChangeKey::generate(),
            status: next,
            fields: current.fields.clone(),
            review_notes,
            hold_release: HoldRelease::Always,
            modified_by: self.requested_by.clone(),
            modified_at: self.requested_at,
            changes: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reservation::fixtures::{sample_reservation, t0};
    use serde_json::json;

    fn update(changes: Value, by: &str) -> UpdateReservation {
        UpdateReservation::new(
            ReservationId::new(),
            "A".into(),
            changes.as_object().cloned().unwrap(),
            by.into(),
            t0(),
        )
    }

    #[test]
    fn acquire_allows_free_expired_and_own_holds() {
        let event = AcquireReviewHold::new(
            ReservationId::new(),
            "b@example.org".into(),
            t0(),
            Duration::minutes(15),
        );
        let foreign = ReviewHold {
            reviewing_by: "a@example.org".into(),
            review_expires_at: t0() + Duration::minutes(1),
        };
        let expired = ReviewHold {
            review_expires_at: t0() - Duration::seconds(1),
            ..foreign.clone()
        };
        let own = ReviewHold {
            reviewing_by: "b@example.org".into(),
            ..foreign.clone()
        };
        assert!(event.can_take(None));
        assert!(event.can_take(Some(&expired)));
        assert!(event.can_take(Some(&own)));
        assert!(!event.can_take(Some(&foreign)));
        assert_eq!(event.hold().review_expires_at, t0() + Duration::minutes(15));
    }

    #[test]
    fn attempt_classifies_current_hold() {
        let event = AcquireReviewHold::new(
            ReservationId::new(),
            "B@example.org".into(),
            t0(),
            Duration::minutes(15),
        );
        let foreign = ReviewHold {
            reviewing_by: "a@example.org".into(),
            review_expires_at: t0() + Duration::seconds(90),
        };
        assert_eq!(event.attempt(None), HoldAttempt::Available);
        assert_eq!(
            event.attempt(Some(&foreign)),
            HoldAttempt::Conflict(HoldConflict {
                reviewing_by: "a@example.org".into(),
                review_expires_at: t0() + Duration::seconds(90),
                minutes_remaining: 2,
            })
        );
        // 書き込みと再読込の間に失効したホールドは、もう一度書き込めば取れる
        let lapsed = ReviewHold {
            review_expires_at: t0(),
            ..foreign.clone()
        };
        assert_eq!(event.attempt(Some(&lapsed)), HoldAttempt::Available);
        let own = ReviewHold {
            reviewing_by: "b@example.org".into(),
            ..foreign
        };
        assert_eq!(event.attempt(Some(&own)), HoldAttempt::Available);
    }

    #[test]
    fn hold_columns_need_both_values() {
        let at = t0();
        assert!(ReviewHold::from_columns(Some("a@example.org".into()), Some(at)).is_some());
        assert_eq!(ReviewHold::from_columns(Some("a@example.org".into()), None), None);
        assert_eq!(ReviewHold::from_columns(None, Some(at)), None);
    }

    #[test]
    fn exhausted_retries_map_to_no_rows_affected() {
        let event = AcquireReviewHold::new(
            ReservationId::new(),
            "b@example.org".into(),
            t0(),
            Duration::minutes(15),
        );
        assert!(matches!(
            event.retries_exhausted(),
            AppError::NoRowsAffectedError(msg) if msg.contains(&event.reservation_id.to_string())
        ));
    }

    #[test]
    fn update_plan_reports_changed_fields_only() {
        let current = sample_reservation();
        let plan = update(
            json!({"attendeeCount": "75", "categories": ["meeting"], "startDateTime": "2026-02-18T10:00"}),
            "a@example.org",
        )
        .plan(&current)
        .unwrap();

        assert_ne!(plan.change_key, current.change_key);
        assert_eq!(plan.fields.attendee_count, Some(75));
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].field, "attendeeCount");
        assert_eq!(plan.changes[0].old_value, json!(50));
        assert_eq!(plan.changes[0].new_value, json!(75));
    }

    #[test]
    fn update_releases_only_the_writers_hold() {
        let mut current = sample_reservation();
        current.review_hold = Some(ReviewHold {
            reviewing_by: "a@example.org".into(),
            review_expires_at: t0() + Duration::minutes(10),
        });

        let by_holder = update(json!({"attendeeCount": 60}), "a@example.org")
            .plan(&current)
            .unwrap();
        assert!(by_holder.apply_to(&current).review_hold.is_none());

        let by_other = update(json!({"attendeeCount": 60}), "b@example.org")
            .plan(&current)
            .unwrap();
        assert!(by_other.apply_to(&current).review_hold.is_some());
    }

    #[test]
    fn rejected_reservations_cannot_be_edited() {
        let mut current = sample_reservation();
        current.status = ReservationStatus::Rejected;
        assert!(matches!(
            update(json!({"attendeeCount": 60}), "a@example.org").plan(&current),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn transitions_validate_state_and_reason() {
        let current = sample_reservation();
        let reject = |reason: &str| {
            TransitionStatus::new(
                current.reservation_id,
                "A".into(),
                ReviewAction::Reject {
                    reason: reason.into(),
                },
                "a@example.org".into(),
                t0(),
            )
        };
        assert!(reject("  ").plan(&current).is_err());

        let plan = reject("Room unavailable").plan(&current).unwrap();
        let rejected = plan.apply_to(&current);
        assert_eq!(rejected.status, ReservationStatus::Rejected);
        assert_eq!(rejected.review_notes.as_deref(), Some("Room unavailable"));
        assert_ne!(rejected.change_key, current.change_key);

        assert!(reject("again").plan(&rejected).is_err());
    }

    #[test]
    fn resubmission_starts_a_new_revision() {
        let previous = sample_reservation();
        let (created, revision) = CreateReservation::new(
            previous.fields.clone(),
            previous.requester.clone(),
            Some(PreviousRevision {
                reservation_id: previous.reservation_id,
                revision: previous.revision,
            }),
            "requester@example.org".into(),
            t0(),
        )
        .into_initial()
        .unwrap();
        assert_eq!(created.revision, 2);
        assert_eq!(created.previous_reservation_id, Some(previous.reservation_id));
        assert_eq!(created.status, ReservationStatus::Pending);
        assert_eq!(revision.change_key, created.change_key);
    }
}
