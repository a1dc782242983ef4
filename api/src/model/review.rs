use chrono::{DateTime, Utc};
use kernel::model::{
    id::ChangeKey,
    reservation::{review::HoldConflict, ReviewHold},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReviewResponse {
    pub acquired: bool,
    // ホールドの確認ができずにそのまま編集を続ける場合は true
    pub degraded: bool,
    pub reviewing_by: Option<String>,
    pub review_expires_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub change_key: Option<ChangeKey>,
}

impl StartReviewResponse {
    pub fn acquired(hold: ReviewHold, change_key: ChangeKey, duration_minutes: i64) -> Self {
        let ReviewHold {
            reviewing_by,
            review_expires_at,
        } = hold;
        Self {
            acquired: true,
            degraded: false,
            reviewing_by: Some(reviewing_by),
            review_expires_at: Some(review_expires_at),
            duration_minutes,
            change_key: Some(change_key),
        }
    }

    pub fn degraded(duration_minutes: i64) -> Self {
        Self {
            acquired: false,
            degraded: true,
            reviewing_by: None,
            review_expires_at: None,
            duration_minutes,
            change_key: None,
        }
    }
}

/// 423 のレスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldConflictResponse {
    pub error: &'static str,
    pub message: String,
    pub reviewing_by: String,
    pub review_expires_at: DateTime<Utc>,
    pub minutes_remaining: i64,
}

impl From<HoldConflict> for HoldConflictResponse {
    fn from(value: HoldConflict) -> Self {
        let HoldConflict {
            reviewing_by,
            review_expires_at,
            minutes_remaining,
        } = value;
        let unit = if minutes_remaining == 1 { "minute" } else { "minutes" };
        Self {
            error: "review_in_progress",
            message: format!(
                "{reviewing_by} is currently reviewing this reservation ({minutes_remaining} {unit} remaining)."
            ),
            reviewing_by,
            review_expires_at,
            minutes_remaining,
        }
    }
}
