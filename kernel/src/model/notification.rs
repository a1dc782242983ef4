use crate::model::{
    change::{FieldChange, ValueFormatter},
    id::ReservationId,
    reservation::{CommunicationRecord, Reservation},
    settings::EmailSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Submitted,
    Updated,
    Approved,
    Rejected,
    Cancelled,
    Resubmitted,
}

/// 通知メールの変更一覧表の 1 行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRow {
    pub display_name: String,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationNotification {
    pub reservation_id: ReservationId,
    pub kind: NotificationKind,
    pub from_address: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub change_rows: Vec<ChangeRow>,
    pub notes: Option<String>,
}

impl ReservationNotification {
    /// 送信内容を組み立てる。通知が無効、または宛先が無い場合は `None`
    pub fn build(
        reservation: &Reservation,
        kind: NotificationKind,
        changes: &[FieldChange],
        settings: &EmailSettings,
        formatter: &ValueFormatter<'_>,
    ) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let recipients = recipients(reservation, settings);
        if recipients.is_empty() {
            return None;
        }

        let title = &reservation.fields.event_title;
        let subject = match kind {
            NotificationKind::Submitted => format!("Reservation request received: {title}"),
            NotificationKind::Updated => format!("Reservation updated: {title}"),
            NotificationKind::Approved => format!("Reservation approved: {title}"),
            NotificationKind::Rejected => format!("Reservation rejected: {title}"),
            NotificationKind::Cancelled => format!("Reservation cancelled: {title}"),
            NotificationKind::Resubmitted => format!("Reservation resubmitted: {title}"),
        };
        let change_rows = changes
            .iter()
            .map(|c| {
                let (old_value, new_value) = formatter.format_change(c);
                ChangeRow {
                    display_name: c.display_name.clone(),
                    old_value,
                    new_value,
                }
            })
            .collect();

        Some(Self {
            reservation_id: reservation.reservation_id,
            kind,
            from_address: settings.from_address.clone(),
            recipients,
            subject,
            change_rows,
            notes: reservation.review_notes.clone(),
        })
    }

    pub fn to_record(&self, success: bool, sent_at: DateTime<Utc>) -> CommunicationRecord {
        CommunicationRecord {
            timestamp: sent_at,
            kind: self.kind,
            success,
            recipients: self.recipients.clone(),
            subject: self.subject.clone(),
        }
    }
}

fn recipients(reservation: &Reservation, settings: &EmailSettings) -> Vec<String> {
    if let Some(redirect) = settings.redirect_to.as_ref().filter(|r| !r.is_empty()) {
        return vec![redirect.clone()];
    }
    let mut recipients = vec![reservation.requester.email.clone()];
    if settings.cc_contact {
        if let Some(contact) = &reservation.fields.contact {
            if !contact.email.is_empty()
                && !recipients.iter().any(|r| r.eq_ignore_ascii_case(&contact.email))
            {
                recipients.push(contact.email.clone());
            }
        }
    }
    recipients.retain(|r| !r.is_empty());
    recipients
}
