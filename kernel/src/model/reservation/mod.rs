use crate::model::{
    id::{ChangeKey, ReservationId},
    notification::NotificationKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub mod event;
pub mod fields;
pub mod review;

pub use fields::{ContactPerson, ReservationFields};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReservationStatus {
    // 業務フィールドを編集できる状態か
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending | Approved, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub email: String,
    pub display_name: String,
}

/// Advisory review hold. It never blocks reads or writes; it only tells
/// other reviewers that someone is working on the reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHold {
    pub reviewing_by: String,
    pub review_expires_at: DateTime<Utc>,
}

impl ReviewHold {
    /// 保存された 2 列から組み立てる。片方だけ入っている場合はホールド無しとみなす
    pub fn from_columns(
        reviewing_by: Option<String>,
        review_expires_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        match (reviewing_by, review_expires_at) {
            (Some(reviewing_by), Some(review_expires_at)) => Some(Self {
                reviewing_by,
                review_expires_at,
            }),
            _ => None,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.review_expires_at > now
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.reviewing_by.eq_ignore_ascii_case(identity)
    }
}

/// 送信済み通知の記録。追記のみで、更新・削除はしない
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub success: bool,
    pub recipients: Vec<String>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub change_key: ChangeKey,
    pub status: ReservationStatus,
    pub fields: ReservationFields,
    pub requester: Requester,
    pub review_hold: Option<ReviewHold>,
    pub review_notes: Option<String>,
    pub revision: i32,
    pub previous_reservation_id: Option<ReservationId>,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub communication_history: Vec<CommunicationRecord>,
}

impl Reservation {
    /// 期限切れのホールドは存在しないものとして扱う
    pub fn active_hold(&self, now: DateTime<Utc>) -> Option<&ReviewHold> {
        self.review_hold.as_ref().filter(|h| h.is_active_at(now))
    }

    pub fn is_requested_by(&self, identity: &str) -> bool {
        self.requester.email.eq_ignore_ascii_case(identity)
    }
}

/// 書き込みごとに残すフィールドのスナップショット。
/// 競合時に「読み込んだ版から何が変わったか」を求めるのに使う
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationRevision {
    pub reservation_id: ReservationId,
    pub change_key: ChangeKey,
    pub fields: ReservationFields,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReservationListFilter {
    pub status: Option<ReservationStatus>,
}
