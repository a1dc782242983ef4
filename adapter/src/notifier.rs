use async_trait::async_trait;
use kernel::{model::notification::ReservationNotification, repository::notification::Notifier};
use shared::error::AppResult;

/// Writes rendered notifications to the log instead of a mail transport.
#[derive(Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    fn render(notification: &ReservationNotification) -> String {
        let mut body = notification
            .change_rows
            .iter()
            .map(|row| {
                format!(
                    "{}: {} → {}",
                    row.display_name, row.old_value, row.new_value
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(notes) = &notification.notes {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str("Notes: ");
            body.push_str(notes);
        }
        body
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: &ReservationNotification) -> AppResult<()> {
        tracing::info!(
            reservation_id = %notification.reservation_id,
            kind = %notification.kind,
            from = %notification.from_address,
            to = ?notification.recipients,
            subject = %notification.subject,
            body = %Self::render(notification),
            "reservation notification sent"
        );
        Ok(())
    }
}
