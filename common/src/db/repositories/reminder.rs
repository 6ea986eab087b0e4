// Reminder repository: the durable store behind the scheduler.
//
// The scheduler only ever touches the store through the narrow
// `ReminderStore` trait; the repository additionally carries the
// creation/edit helpers that the data-management layer uses, both of which
// recompute `next_fire_at` through the recurrence calculator.

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{
    Channel, ContactInfo, DueReminder, MedicationInfo, NewReminder, Reminder, ReminderId,
    ReminderStatus, WeekdaySet,
};
use crate::recurrence;
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Narrow store interface the scheduler engine depends on.
///
/// `record_dispatch` and `mark_completed` are idempotent per reminder id:
/// replaying either write leaves the row in the same state.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// All reminders with `status = PENDING` and `next_fire_at <= now`,
    /// joined with the medication and contact data needed to dispatch.
    /// Deliberately has no lower bound, so an outage longer than one tick
    /// fires every overdue reminder exactly once on the next pass.
    async fn find_due(&self, now: NaiveDateTime) -> Result<Vec<DueReminder>, DatabaseError>;

    /// Terminal transition for reminders of an ended medication.
    async fn mark_completed(&self, id: ReminderId) -> Result<(), DatabaseError>;

    /// Post-dispatch write: stamp `last_sent_at`, advance `next_fire_at`,
    /// and reset status to `PENDING` so the reminder keeps cycling.
    async fn record_dispatch(
        &self,
        id: ReminderId,
        sent_at: NaiveDateTime,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError>;
}

/// PostgreSQL-backed reminder store
pub struct ReminderRepository {
    pool: DbPool,
}

impl ReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a reminder with `status = PENDING` and an initial
    /// `next_fire_at` computed from `now` (today's slot counts when it is
    /// still ahead).
    #[instrument(skip(self, new))]
    pub async fn create(
        &self,
        new: NewReminder,
        now: NaiveDateTime,
    ) -> Result<Reminder, DatabaseError> {
        let id = Uuid::new_v4();
        let next_fire_at = recurrence::from_reference(new.time_of_day, &new.days_of_week, now);

        sqlx::query(
            r#"
            INSERT INTO medication_reminders (
                id, medication_id, time_of_day, days_of_week, channel,
                status, last_sent_at, next_fire_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $8, $8)
            "#,
        )
        .bind(id)
        .bind(new.medication_id)
        .bind(new.time_of_day)
        .bind(new.days_of_week.to_db())
        .bind(new.channel.as_str())
        .bind(ReminderStatus::Pending.as_str())
        .bind(next_fire_at)
        .bind(now)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(reminder_id = %id, next_fire_at = %next_fire_at, "Reminder created");

        Ok(Reminder {
            id,
            medication_id: new.medication_id,
            time_of_day: new.time_of_day,
            days_of_week: new.days_of_week,
            channel: new.channel,
            status: ReminderStatus::Pending,
            last_sent_at: None,
            next_fire_at: Some(next_fire_at),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a user edit to time/days/channel and recompute `next_fire_at`
    /// with the same from-reference rule as creation.
    #[instrument(skip(self, days_of_week))]
    pub async fn reschedule(
        &self,
        id: ReminderId,
        time_of_day: NaiveTime,
        days_of_week: WeekdaySet,
        channel: Channel,
        now: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let next_fire_at = recurrence::from_reference(time_of_day, &days_of_week, now);

        let result = sqlx::query(
            r#"
            UPDATE medication_reminders
            SET time_of_day = $2,
                days_of_week = $3,
                channel = $4,
                status = $5,
                next_fire_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(time_of_day)
        .bind(days_of_week.to_db())
        .bind(channel.as_str())
        .bind(ReminderStatus::Pending.as_str())
        .bind(next_fire_at)
        .bind(now)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Reminder {}", id)));
        }

        tracing::info!(reminder_id = %id, next_fire_at = %next_fire_at, "Reminder rescheduled");
        Ok(())
    }

    fn map_due_row(row: &PgRow) -> Result<DueReminder, DatabaseError> {
        let days: Vec<i16> = row.try_get("days_of_week")?;
        let days_of_week = WeekdaySet::from_db(&days)
            .map_err(|e| DatabaseError::QueryFailed(format!("Corrupt days_of_week: {}", e)))?;

        let status: String = row.try_get("status")?;
        let status: ReminderStatus = status
            .parse()
            .map_err(|e| DatabaseError::QueryFailed(format!("Corrupt status: {}", e)))?;

        let channel: String = row.try_get("channel")?;
        let channel: Channel = channel
            .parse()
            .map_err(|e| DatabaseError::QueryFailed(format!("Corrupt channel: {}", e)))?;

        Ok(DueReminder {
            reminder: Reminder {
                id: row.try_get("id")?,
                medication_id: row.try_get("medication_id")?,
                time_of_day: row.try_get("time_of_day")?,
                days_of_week,
                channel,
                status,
                last_sent_at: row.try_get("last_sent_at")?,
                next_fire_at: row.try_get("next_fire_at")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
            medication: MedicationInfo {
                name: row.try_get("medication_name")?,
                dosage: row.try_get("dosage")?,
                instructions: row.try_get("instructions")?,
                end_date: row.try_get("end_date")?,
            },
            contact: ContactInfo {
                email: row.try_get("email")?,
                phone_number: row.try_get("phone_number")?,
            },
        })
    }
}

#[async_trait]
impl ReminderStore for ReminderRepository {
    #[instrument(skip(self))]
    async fn find_due(&self, now: NaiveDateTime) -> Result<Vec<DueReminder>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.id, r.medication_id, r.time_of_day, r.days_of_week,
                r.channel, r.status, r.last_sent_at, r.next_fire_at,
                r.created_at, r.updated_at,
                m.name AS medication_name, m.dosage, m.instructions, m.end_date,
                u.email, u.phone_number
            FROM medication_reminders r
            JOIN medications m ON m.id = r.medication_id
            JOIN family_members fm ON fm.id = m.family_member_id
            JOIN users u ON u.id = fm.user_id
            WHERE r.status = 'PENDING'
              AND r.next_fire_at IS NOT NULL
              AND r.next_fire_at <= $1
            ORDER BY r.next_fire_at
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await?;

        let mut due = Vec::with_capacity(rows.len());
        for row in &rows {
            due.push(Self::map_due_row(row)?);
        }

        tracing::debug!(count = due.len(), "Found due reminders");
        Ok(due)
    }

    #[instrument(skip(self))]
    async fn mark_completed(&self, id: ReminderId) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE medication_reminders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ReminderStatus::Completed.as_str())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Reminder {}", id)));
        }

        tracing::info!(reminder_id = %id, "Reminder completed (medication ended)");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_dispatch(
        &self,
        id: ReminderId,
        sent_at: NaiveDateTime,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        // SENT is only a transient marker in the state machine; the durable
        // state after a dispatch is PENDING with an advanced next_fire_at.
        let result = sqlx::query(
            r#"
            UPDATE medication_reminders
            SET status = $2,
                last_sent_at = $3,
                next_fire_at = $4,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ReminderStatus::Pending.as_str())
        .bind(sent_at)
        .bind(next_fire_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Reminder {}", id)));
        }

        tracing::debug!(
            reminder_id = %id,
            next_fire_at = %next_fire_at,
            "Dispatch recorded, reminder advanced"
        );
        Ok(())
    }
}
