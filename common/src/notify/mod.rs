// Notification sinks and dispatch.
//
// The sink contract is non-throwing: transports swallow and log their own
// errors so the scheduler's per-reminder isolation is a backstop, not the
// primary failure boundary.

pub mod email;
pub mod sms;

pub use email::EmailSender;
pub use sms::SmsSender;

use crate::models::DueReminder;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Outbound notification transport, one method per medium.
///
/// Implementations must not surface recoverable transport errors to the
/// caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str);
    async fn send_sms(&self, phone_number: &str, body: &str);
}

/// Production sink combining the SMTP and Twilio transports
pub struct Notifier {
    email: EmailSender,
    sms: SmsSender,
}

impl Notifier {
    pub fn new(email: EmailSender, sms: SmsSender) -> Self {
        Self { email, sms }
    }
}

#[async_trait]
impl NotificationSink for Notifier {
    async fn send_email(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.email.send(to, subject, body).await {
            warn!(to = to, error = %e, "Email not sent");
        }
    }

    async fn send_sms(&self, phone_number: &str, body: &str) {
        if let Err(e) = self.sms.send(phone_number, body).await {
            warn!(phone_number = phone_number, error = %e, "SMS not sent");
        }
    }
}

/// Build the reminder message body from the joined medication data
pub fn reminder_message(due: &DueReminder) -> String {
    let dosage = due.medication.dosage.as_deref().unwrap_or("");
    let instructions = due.medication.instructions.as_deref().unwrap_or("");
    format!(
        "MediTrack Reminder: Time to take {} {} at {}. {}",
        due.medication.name,
        dosage,
        due.reminder.time_of_day.format("%H:%M"),
        instructions
    )
    .trim_end()
    .to_string()
}

/// Email subject line for a reminder
pub fn reminder_subject(due: &DueReminder) -> String {
    format!("Medication Reminder: {}", due.medication.name)
}

/// Ensure a country-code prefix on outbound SMS numbers
fn format_phone(phone: &str) -> String {
    if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+{}", phone)
    }
}

/// Send a due reminder over its configured channel(s).
///
/// SMS and email are attempted independently; failure or absence of one
/// never suppresses the other. Each send runs under `send_timeout` so a hung
/// transport cannot stall the rest of the batch.
pub async fn dispatch(sink: &dyn NotificationSink, due: &DueReminder, send_timeout: Duration) {
    let message = reminder_message(due);
    let channel = due.reminder.channel;

    if channel.includes_sms() {
        match due.contact.phone_number.as_deref() {
            Some(phone) if !phone.is_empty() => {
                let phone = format_phone(phone);
                if tokio::time::timeout(send_timeout, sink.send_sms(&phone, &message))
                    .await
                    .is_err()
                {
                    warn!(reminder_id = %due.reminder.id, "SMS send timed out");
                }
            }
            _ => {
                warn!(
                    reminder_id = %due.reminder.id,
                    email = %due.contact.email,
                    "User has no phone number configured, SMS not sent"
                );
            }
        }
    }

    if channel.includes_email() {
        let subject = reminder_subject(due);
        if tokio::time::timeout(
            send_timeout,
            sink.send_email(&due.contact.email, &subject, &message),
        )
        .await
        .is_err()
        {
            warn!(reminder_id = %due.reminder.id, "Email send timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Channel, ContactInfo, MedicationInfo, Reminder, ReminderStatus, WeekdaySet,
    };
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct RecordingSink {
        emails: Arc<Mutex<Vec<(String, String, String)>>>,
        texts: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                emails: Arc::new(Mutex::new(Vec::new())),
                texts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_email(&self, to: &str, subject: &str, body: &str) {
            self.emails
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), body.to_string()));
        }

        async fn send_sms(&self, phone_number: &str, body: &str) {
            self.texts
                .lock()
                .await
                .push((phone_number.to_string(), body.to_string()));
        }
    }

    fn due_reminder(channel: Channel, phone: Option<&str>) -> DueReminder {
        let now = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        DueReminder {
            reminder: Reminder {
                id: Uuid::new_v4(),
                medication_id: Uuid::new_v4(),
                time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                days_of_week: WeekdaySet::every_day(),
                channel,
                status: ReminderStatus::Pending,
                last_sent_at: None,
                next_fire_at: Some(now),
                created_at: now,
                updated_at: now,
            },
            medication: MedicationInfo {
                name: "Metformin".to_string(),
                dosage: Some("500mg".to_string()),
                instructions: Some("Take with food".to_string()),
                end_date: None,
            },
            contact: ContactInfo {
                email: "user@example.com".to_string(),
                phone_number: phone.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_reminder_message_includes_medication_details() {
        let due = due_reminder(Channel::Both, Some("15550001111"));
        let message = reminder_message(&due);
        assert_eq!(
            message,
            "MediTrack Reminder: Time to take Metformin 500mg at 08:00. Take with food"
        );
    }

    #[test]
    fn test_reminder_message_without_optional_fields() {
        let mut due = due_reminder(Channel::Email, None);
        due.medication.dosage = None;
        due.medication.instructions = None;
        let message = reminder_message(&due);
        assert!(message.starts_with("MediTrack Reminder: Time to take Metformin"));
        assert!(!message.ends_with(' '));
    }

    #[test]
    fn test_format_phone_adds_prefix_once() {
        assert_eq!(format_phone("15550001111"), "+15550001111");
        assert_eq!(format_phone("+15550001111"), "+15550001111");
    }

    #[tokio::test]
    async fn test_dispatch_both_hits_both_transports() {
        let sink = RecordingSink::new();
        let due = due_reminder(Channel::Both, Some("15550001111"));

        dispatch(&sink, &due, Duration::from_secs(5)).await;

        let emails = sink.emails.lock().await;
        let texts = sink.texts.lock().await;
        assert_eq!(emails.len(), 1);
        assert_eq!(texts.len(), 1);
        assert_eq!(emails[0].0, "user@example.com");
        assert_eq!(texts[0].0, "+15550001111");
    }

    #[tokio::test]
    async fn test_dispatch_sms_only_skips_email() {
        let sink = RecordingSink::new();
        let due = due_reminder(Channel::Sms, Some("+15550001111"));

        dispatch(&sink, &due, Duration::from_secs(5)).await;

        assert_eq!(sink.emails.lock().await.len(), 0);
        assert_eq!(sink.texts.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_missing_phone_still_sends_email() {
        let sink = RecordingSink::new();
        let due = due_reminder(Channel::Both, None);

        dispatch(&sink, &due, Duration::from_secs(5)).await;

        assert_eq!(sink.emails.lock().await.len(), 1);
        assert_eq!(sink.texts.lock().await.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_times_out_hung_transport() {
        struct HungSink;

        #[async_trait]
        impl NotificationSink for HungSink {
            async fn send_email(&self, _to: &str, _subject: &str, _body: &str) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }

            async fn send_sms(&self, _phone_number: &str, _body: &str) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }

        let due = due_reminder(Channel::Both, Some("+15550001111"));
        // Finishes instead of hanging forever; paused time makes this fast.
        dispatch(&HungSink, &due, Duration::from_secs(10)).await;
    }
}
