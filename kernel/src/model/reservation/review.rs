use super::{Reservation, ReservationFields, ReservationRevision, ReservationStatus, ReviewHold};
use crate::model::{
    change::{detect_changes, FieldChange, NOTIFIABLE_FIELDS},
    id::{ChangeKey, ReservationId},
};
use chrono::{DateTime, Utc};
use shared::error::AppResult;

/// Result of asking for a review hold. A foreign hold is an expected
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldOutcome {
    Acquired {
        hold: ReviewHold,
        // ホールド取得時点のバージョン。更新時にこの値を提示する
        change_key: ChangeKey,
    },
    Conflict(HoldConflict),
}

/// 現在のホールドに対して取得要求がどうなるか
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldAttempt {
    /// 無い・期限切れ・本人のもの。書き込めば取得できる
    Available,
    Conflict(HoldConflict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldConflict {
    pub reviewing_by: String,
    pub review_expires_at: DateTime<Utc>,
    pub minutes_remaining: i64,
}

impl HoldConflict {
    /// 残り時間はサーバーの時計で計算する（切り上げ、最低 1 分）
    pub fn new(hold: &ReviewHold, now: DateTime<Utc>) -> Self {
        let secs = (hold.review_expires_at - now).num_seconds().max(0);
        Self {
            reviewing_by: hold.reviewing_by.clone(),
            review_expires_at: hold.review_expires_at,
            minutes_remaining: ((secs + 59) / 60).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated {
        reservation: Reservation,
        changes: Vec<FieldChange>,
    },
    Conflict(VersionConflict),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionConflict {
    pub current_change_key: ChangeKey,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
}

impl VersionConflict {
    /// 呼び出し側が読み込んだ版 (`base`) から現在の版までの差分を添えて競合を作る。
    /// 提示されたキーに対応する版が見つからない場合、差分は空になる
    pub fn between(base: Option<&ReservationRevision>, current: &Reservation) -> AppResult<Self> {
        let changes = match base {
            Some(base) => detect_changes(
                &base.fields.to_document()?,
                &current.fields.to_document()?,
                NOTIFIABLE_FIELDS,
            ),
            None => vec![],
        };
        Ok(Self {
            current_change_key: current.change_key.clone(),
            last_modified_by: current.last_modified_by.clone(),
            last_modified_at: current.updated_at,
            changes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldRelease {
    // 書き込んだ本人がホールドしていた場合だけ解除する
    IfHeldByWriter,
    Always,
}

/// A validated business write, ready to be applied with a single
/// compare-and-swap on the presented change key.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub reservation_id: ReservationId,
    pub expected_change_key: ChangeKey,
    pub change_key: ChangeKey,
    pub status: ReservationStatus,
    pub fields: ReservationFields,
    pub review_notes: Option<String>,
    pub hold_release: HoldRelease,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
}

impl PlannedWrite {
    pub fn releases(&self, hold: Option<&ReviewHold>) -> bool {
        match self.hold_release {
            HoldRelease::Always => true,
            HoldRelease::IfHeldByWriter => hold.is_some_and(|h| h.is_held_by(&self.modified_by)),
        }
    }

    pub fn apply_to(&self, current: &Reservation) -> Reservation {
        let review_hold = if self.releases(current.review_hold.as_ref()) {
            None
        } else {
            current.review_hold.clone()
        };
        Reservation {
            change_key: self.change_key.clone(),
            status: self.status,
            fields: self.fields.clone(),
            review_hold,
            review_notes: self.review_notes.clone(),
            last_modified_by: self.modified_by.clone(),
            updated_at: self.modified_at,
            ..current.clone()
        }
    }

    pub fn revision(&self) -> ReservationRevision {
        ReservationRevision {
            reservation_id: self.reservation_id,
            change_key: self.change_key.clone(),
            fields: self.fields.clone(),
            recorded_by: self.modified_by.clone(),
            recorded_at: self.modified_at,
        }
    }
}
