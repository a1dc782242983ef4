use kernel::model::{
    id::{ChangeKey, ReservationId},
    notification::NotificationKind,
    reservation::{
        CommunicationRecord, Requester, Reservation, ReservationFields, ReservationRevision,
        ReservationStatus, ReviewHold,
    },
};
use shared::error::{AppError, AppResult};
use sqlx::types::{
    chrono::{DateTime, Utc},
    Json,
};

// reservations テーブルの 1 行。
// 通知履歴は別テーブルなので into_reservation で受け取る
#[derive(sqlx::FromRow)]
pub struct ReservationRow {
    pub reservation_id: ReservationId,
    pub change_key: ChangeKey,
    pub status: String,
    pub fields: Json<ReservationFields>,
    pub requester: Json<Requester>,
    pub reviewing_by: Option<String>,
    pub review_expires_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub revision: i32,
    pub previous_reservation_id: Option<ReservationId>,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationRow {
    pub fn into_reservation(
        self,
        communication_history: Vec<CommunicationRecord>,
    ) -> AppResult<Reservation> {
        let ReservationRow {
            reservation_id,
            change_key,
            status,
            fields,
            requester,
            reviewing_by,
            review_expires_at,
            review_notes,
            revision,
            previous_reservation_id,
            last_modified_by,
            created_at,
            updated_at,
        } = self;
        let status: ReservationStatus = status.parse().map_err(|_| {
            AppError::ConversionEntityError(format!(
                "unknown reservation status `{status}` ({reservation_id})"
            ))
        })?;
        let review_hold = ReviewHold::from_columns(reviewing_by, review_expires_at);
        Ok(Reservation {
            reservation_id,
            change_key,
            status,
            fields: fields.0,
            requester: requester.0,
            review_hold,
            review_notes,
            revision,
            previous_reservation_id,
            last_modified_by,
            created_at,
            updated_at,
            communication_history,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct RevisionRow {
    pub reservation_id: ReservationId,
    pub change_key: ChangeKey,
    pub fields: Json<ReservationFields>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<RevisionRow> for ReservationRevision {
    fn from(value: RevisionRow) -> Self {
        let RevisionRow {
            reservation_id,
            change_key,
            fields,
            recorded_by,
            recorded_at,
        } = value;
        ReservationRevision {
            reservation_id,
            change_key,
            fields: fields.0,
            recorded_by,
            recorded_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct CommunicationRow {
    pub reservation_id: ReservationId,
    pub sent_at: DateTime<Utc>,
    pub kind: String,
    pub success: bool,
    pub recipients: Json<Vec<String>>,
    pub subject: String,
}

impl TryFrom<CommunicationRow> for CommunicationRecord {
    type Error = AppError;

    fn try_from(value: CommunicationRow) -> Result<Self, Self::Error> {
        let CommunicationRow {
            reservation_id: _,
            sent_at,
            kind,
            success,
            recipients,
            subject,
        } = value;
        let kind: NotificationKind = kind.parse().map_err(|_| {
            AppError::ConversionEntityError(format!("unknown notification kind `{kind}`"))
        })?;
        Ok(CommunicationRecord {
            timestamp: sent_at,
            kind,
            success,
            recipients: recipients.0,
            subject,
        })
    }
}
