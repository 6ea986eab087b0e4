// End-to-end scheduler engine tests against in-memory store and sink
// doubles. These cover the full tick flow: due query, expiry handling,
// channel dispatch, recurrence advance, and per-reminder failure isolation.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use common::db::ReminderStore;
use common::errors::DatabaseError;
use common::models::{
    Channel, ContactInfo, DueReminder, MedicationInfo, Reminder, ReminderId, ReminderStatus,
    WeekdaySet,
};
use common::notify::NotificationSink;
use common::scheduler::{Scheduler, SchedulerConfig, SchedulerEngine};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Test doubles
// ============================================================================

/// In-memory reminder store mirroring the Postgres repository's semantics
struct InMemoryStore {
    rows: Mutex<HashMap<ReminderId, DueReminder>>,
    /// Simulate a persistence failure for one reminder
    fail_dispatch_for: Option<ReminderId>,
}

impl InMemoryStore {
    fn new(reminders: Vec<DueReminder>) -> Self {
        let rows = reminders
            .into_iter()
            .map(|r| (r.reminder.id, r))
            .collect::<HashMap<_, _>>();
        Self {
            rows: Mutex::new(rows),
            fail_dispatch_for: None,
        }
    }

    fn failing_on(mut self, id: ReminderId) -> Self {
        self.fail_dispatch_for = Some(id);
        self
    }

    async fn get(&self, id: ReminderId) -> DueReminder {
        self.rows.lock().await.get(&id).cloned().expect("row exists")
    }
}

#[async_trait]
impl ReminderStore for InMemoryStore {
    async fn find_due(&self, now: NaiveDateTime) -> Result<Vec<DueReminder>, DatabaseError> {
        let rows = self.rows.lock().await;
        let mut due: Vec<DueReminder> = rows
            .values()
            .filter(|r| {
                r.reminder.status == ReminderStatus::Pending
                    && r.reminder.next_fire_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.reminder.next_fire_at);
        Ok(due)
    }

    async fn mark_completed(&self, id: ReminderId) -> Result<(), DatabaseError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Reminder {}", id)))?;
        row.reminder.status = ReminderStatus::Completed;
        Ok(())
    }

    async fn record_dispatch(
        &self,
        id: ReminderId,
        sent_at: NaiveDateTime,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        if self.fail_dispatch_for == Some(id) {
            return Err(DatabaseError::QueryFailed("simulated write failure".to_string()));
        }
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Reminder {}", id)))?;
        row.reminder.status = ReminderStatus::Pending;
        row.reminder.last_sent_at = Some(sent_at);
        row.reminder.next_fire_at = Some(next_fire_at);
        Ok(())
    }
}

/// Sink recording every send without ever failing
#[derive(Default)]
struct RecordingSink {
    emails: Mutex<Vec<String>>,
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_email(&self, to: &str, _subject: &str, _body: &str) {
        self.emails.lock().await.push(to.to_string());
    }

    async fn send_sms(&self, phone_number: &str, _body: &str) {
        self.texts.lock().await.push(phone_number.to_string());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

struct ReminderBuilder {
    due: DueReminder,
}

impl ReminderBuilder {
    fn new(next_fire_at: NaiveDateTime) -> Self {
        let created = next_fire_at - Duration::days(1);
        Self {
            due: DueReminder {
                reminder: Reminder {
                    id: Uuid::new_v4(),
                    medication_id: Uuid::new_v4(),
                    time_of_day: next_fire_at.time(),
                    days_of_week: WeekdaySet::every_day(),
                    channel: Channel::Both,
                    status: ReminderStatus::Pending,
                    last_sent_at: None,
                    next_fire_at: Some(next_fire_at),
                    created_at: created,
                    updated_at: created,
                },
                medication: MedicationInfo {
                    name: "Lisinopril".to_string(),
                    dosage: Some("10mg".to_string()),
                    instructions: None,
                    end_date: None,
                },
                contact: ContactInfo {
                    email: "owner@example.com".to_string(),
                    phone_number: Some("+15550001111".to_string()),
                },
            },
        }
    }

    fn time_of_day(mut self, time: NaiveTime) -> Self {
        self.due.reminder.time_of_day = time;
        self
    }

    fn days(mut self, days: &[u8]) -> Self {
        self.due.reminder.days_of_week = WeekdaySet::from_days(days.iter().copied()).unwrap();
        self
    }

    fn channel(mut self, channel: Channel) -> Self {
        self.due.reminder.channel = channel;
        self
    }

    fn end_date(mut self, date: NaiveDate) -> Self {
        self.due.medication.end_date = Some(date);
        self
    }

    fn build(self) -> DueReminder {
        self.due
    }
}

fn engine(store: Arc<InMemoryStore>, sink: Arc<RecordingSink>) -> SchedulerEngine {
    SchedulerEngine::new(SchedulerConfig::default(), store, sink)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn due_reminder_is_dispatched_and_advanced() {
    let fire_at = at(2024, 1, 10, 8, 0);
    let due = ReminderBuilder::new(fire_at).build();
    let id = due.reminder.id;

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let report = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);

    // Both channels attempted for a BOTH reminder.
    assert_eq!(sink.emails.lock().await.as_slice(), ["owner@example.com"]);
    assert_eq!(sink.texts.lock().await.as_slice(), ["+15550001111"]);

    // Daily cadence: after the 08:00 send the next fire is tomorrow 08:00,
    // and the reminder is PENDING again, never stranded in SENT.
    let row = store.get(id).await;
    assert_eq!(row.reminder.status, ReminderStatus::Pending);
    assert_eq!(row.reminder.last_sent_at, Some(fire_at));
    assert_eq!(row.reminder.next_fire_at, Some(at(2024, 1, 11, 8, 0)));
}

#[tokio::test]
async fn weekly_reminder_advances_to_next_member_weekday() {
    // 2024-01-10 is a Wednesday; Mon/Wed/Fri at 09:00.
    let fire_at = at(2024, 1, 10, 9, 0);
    let due = ReminderBuilder::new(fire_at)
        .time_of_day(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
        .days(&[1, 3, 5])
        .build();
    let id = due.reminder.id;

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    engine.run_tick(fire_at).await.unwrap();

    let row = store.get(id).await;
    assert_eq!(row.reminder.next_fire_at, Some(at(2024, 1, 12, 9, 0))); // Friday
}

#[tokio::test]
async fn expired_medication_completes_without_notification() {
    let fire_at = at(2024, 1, 15, 8, 0);
    let due = ReminderBuilder::new(fire_at)
        .end_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .build();
    let id = due.reminder.id;

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let report = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.sent, 0);

    assert!(sink.emails.lock().await.is_empty());
    assert!(sink.texts.lock().await.is_empty());
    assert_eq!(store.get(id).await.reminder.status, ReminderStatus::Completed);
}

#[tokio::test]
async fn end_date_today_still_dispatches() {
    // Expiry is strictly-before-today; the end date itself is still active.
    let fire_at = at(2024, 1, 15, 8, 0);
    let due = ReminderBuilder::new(fire_at)
        .end_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        .build();

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let report = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.completed, 0);
    assert_eq!(sink.emails.lock().await.len(), 1);
}

#[tokio::test]
async fn failing_reminder_does_not_block_batch() {
    let fire_at = at(2024, 1, 10, 8, 0);
    let healthy_a = ReminderBuilder::new(fire_at).build();
    let failing = ReminderBuilder::new(fire_at).build();
    let healthy_b = ReminderBuilder::new(fire_at).build();
    let failing_id = failing.reminder.id;
    let healthy_ids = [healthy_a.reminder.id, healthy_b.reminder.id];

    let store = Arc::new(
        InMemoryStore::new(vec![healthy_a, failing, healthy_b]).failing_on(failing_id),
    );
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let report = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(report.due, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);

    // The healthy reminders were advanced despite the failure.
    for id in healthy_ids {
        let row = store.get(id).await;
        assert_eq!(row.reminder.next_fire_at, Some(at(2024, 1, 11, 8, 0)));
    }

    // The failing reminder kept its prior next_fire_at and stays PENDING,
    // so it is retried on the next tick.
    let row = store.get(failing_id).await;
    assert_eq!(row.reminder.status, ReminderStatus::Pending);
    assert_eq!(row.reminder.next_fire_at, Some(fire_at));
    assert_eq!(row.reminder.last_sent_at, None);
}

#[tokio::test]
async fn second_tick_with_no_newly_due_reminders_is_a_noop() {
    let fire_at = at(2024, 1, 10, 8, 0);
    let due = ReminderBuilder::new(fire_at).build();
    let id = due.reminder.id;

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let first = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(first.sent, 1);
    let after_first = store.get(id).await;

    // Immediate manual re-trigger: nothing is due, nothing changes.
    let second = engine.run_tick(fire_at).await.unwrap();
    assert_eq!(second.due, 0);
    assert_eq!(second.sent, 0);
    assert_eq!(sink.emails.lock().await.len(), 1);
    assert_eq!(sink.texts.lock().await.len(), 1);

    let after_second = store.get(id).await;
    assert_eq!(after_second.reminder.last_sent_at, after_first.reminder.last_sent_at);
    assert_eq!(after_second.reminder.next_fire_at, after_first.reminder.next_fire_at);
}

#[tokio::test]
async fn overdue_backlog_fires_each_reminder_exactly_once() {
    // Simulates a scheduler outage: both reminders are days overdue. One
    // tick fires each exactly once and advances them past "now".
    let now = at(2024, 1, 10, 12, 0);
    let stale_a = ReminderBuilder::new(at(2024, 1, 7, 8, 0)).build();
    let stale_b = ReminderBuilder::new(at(2024, 1, 9, 20, 0)).build();
    let ids = [stale_a.reminder.id, stale_b.reminder.id];

    let store = Arc::new(InMemoryStore::new(vec![stale_a, stale_b]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    let report = engine.run_tick(now).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(sink.emails.lock().await.len(), 2);

    for id in ids {
        let next = store.get(id).await.reminder.next_fire_at.unwrap();
        assert!(next > now, "advanced past now, no catch-up storm");
    }

    // Follow-up tick: backlog is drained.
    let follow_up = engine.run_tick(now).await.unwrap();
    assert_eq!(follow_up.due, 0);
}

#[tokio::test]
async fn sms_only_reminder_never_touches_email() {
    let fire_at = at(2024, 1, 10, 8, 0);
    let due = ReminderBuilder::new(fire_at).channel(Channel::Sms).build();

    let store = Arc::new(InMemoryStore::new(vec![due]));
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store.clone(), sink.clone());

    engine.run_tick(fire_at).await.unwrap();
    assert!(sink.emails.lock().await.is_empty());
    assert_eq!(sink.texts.lock().await.len(), 1);
}
