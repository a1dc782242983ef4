use chrono::{DateTime, Utc};
use garde::Validate;
use kernel::model::{
    change::{describe_changes, FieldChange, ValueFormatter},
    id::{ChangeKey, ReservationId},
    reservation::{
        review::VersionConflict, CommunicationRecord, Requester, Reservation,
        ReservationFields, ReservationListFilter, ReservationStatus,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReservationListQuery {
    #[garde(skip)]
    pub status: Option<ReservationStatus>,
}

impl From<ReservationListQuery> for ReservationListFilter {
    fn from(value: ReservationListQuery) -> Self {
        let ReservationListQuery { status } = value;
        ReservationListFilter { status }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[garde(length(min = 1, max = 200))]
    pub event_title: String,
    // 残りのフィールドは ReservationFields として検証する
    #[serde(flatten)]
    #[garde(skip)]
    pub rest: Map<String, Value>,
}

impl CreateReservationRequest {
    pub fn into_fields(self) -> Result<ReservationFields, serde_json::Error> {
        let CreateReservationRequest {
            event_title,
            mut rest,
        } = self;
        rest.insert("eventTitle".into(), Value::String(event_title));
        serde_json::from_value(Value::Object(rest))
    }
}

/// 送られたキーだけを更新する。`changeKey` は `If-Match` ヘッダーの代わりに使える
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReservationRequest {
    #[serde(default)]
    pub change_key: Option<ChangeKey>,
    #[serde(flatten)]
    pub changes: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproveReservationRequest {
    #[garde(skip)]
    #[serde(default)]
    pub change_key: Option<ChangeKey>,
    #[garde(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectReservationRequest {
    #[garde(skip)]
    #[serde(default)]
    pub change_key: Option<ChangeKey>,
    #[garde(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationRequest {
    #[garde(skip)]
    #[serde(default)]
    pub change_key: Option<ChangeKey>,
    #[garde(length(max = 2000))]
    #[serde(default)]
    pub reason: Option<String>,
}

/// 却下された予約を再申請する。フィールドの修正は任意
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResubmitReservationRequest {
    #[serde(flatten)]
    pub changes: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHoldResponse {
    pub reviewing_by: String,
    pub review_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub change_key: ChangeKey,
    pub status: ReservationStatus,
    #[serde(flatten)]
    pub fields: ReservationFields,
    pub requester: Requester,
    pub review_hold: Option<ReviewHoldResponse>,
    pub review_notes: Option<String>,
    pub revision: i32,
    pub previous_reservation_id: Option<ReservationId>,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub communication_history: Vec<CommunicationRecord>,
}

impl ReservationResponse {
    /// 期限切れのホールドは返さない
    pub fn new(reservation: Reservation, now: DateTime<Utc>) -> Self {
        let review_hold = reservation
            .active_hold(now)
            .map(|h| ReviewHoldResponse {
                reviewing_by: h.reviewing_by.clone(),
                review_expires_at: h.review_expires_at,
            });
        let Reservation {
            reservation_id,
            change_key,
            status,
            fields,
            requester,
            review_hold: _,
            review_notes,
            revision,
            previous_reservation_id,
            last_modified_by,
            created_at,
            updated_at,
            communication_history,
        } = reservation;
        Self {
            id: reservation_id,
            change_key,
            status,
            fields,
            requester,
            review_hold,
            review_notes,
            revision,
            previous_reservation_id,
            last_modified_by,
            created_at,
            updated_at,
            communication_history,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub items: Vec<ReservationResponse>,
}

impl ReservationsResponse {
    pub fn new(reservations: Vec<Reservation>, now: DateTime<Utc>) -> Self {
        Self {
            items: reservations
                .into_iter()
                .map(|r| ReservationResponse::new(r, now))
                .collect(),
        }
    }
}

/// 変更一覧の 1 件。生の値と表示用の値の両方を返す
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChangeResponse {
    pub field: String,
    pub display_name: String,
    pub old_value: Value,
    pub new_value: Value,
    pub old_display: String,
    pub new_display: String,
}

impl FieldChangeResponse {
    fn new(change: FieldChange, formatter: &ValueFormatter<'_>) -> Self {
        let (old_display, new_display) = formatter.format_change(&change);
        let FieldChange {
            field,
            old_value,
            new_value,
            display_name,
        } = change;
        Self {
            field,
            display_name,
            old_value,
            new_value,
            old_display,
            new_display,
        }
    }

    pub fn from_changes(changes: Vec<FieldChange>) -> Vec<Self> {
        let formatter = ValueFormatter::new();
        changes
            .into_iter()
            .map(|c| Self::new(c, &formatter))
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedReservationResponse {
    pub reservation: ReservationResponse,
    pub changes: Vec<FieldChangeResponse>,
}

/// 409 のレスポンス。読み込んだ版から現在の版までの差分を含む
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConflictResponse {
    pub error: &'static str,
    pub message: String,
    pub current_change_key: ChangeKey,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    pub changes: Vec<FieldChangeResponse>,
}

impl From<VersionConflict> for VersionConflictResponse {
    fn from(value: VersionConflict) -> Self {
        let VersionConflict {
            current_change_key,
            last_modified_by,
            last_modified_at,
            changes,
        } = value;
        let summary = describe_changes(&changes, &ValueFormatter::new());
        let message = if summary.is_empty() {
            format!("This reservation was modified by {last_modified_by}. Reload it before saving.")
        } else {
            format!(
                "This reservation was modified by {last_modified_by} ({summary}). Reload it before saving."
            )
        };
        Self {
            error: "version_conflict",
            message,
            current_change_key,
            last_modified_by,
            last_modified_at,
            changes: FieldChangeResponse::from_changes(changes),
        }
    }
}
