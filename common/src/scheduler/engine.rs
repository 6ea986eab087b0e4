// Scheduler engine: polls the store for due reminders on a fixed cadence,
// dispatches notifications, and advances each reminder to its next
// occurrence. One bad reminder never aborts the batch.

use crate::db::ReminderStore;
use crate::errors::DatabaseError;
use crate::models::DueReminder;
use crate::notify::{self, NotificationSink};
use crate::recurrence;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the due-reminder pass runs (seconds)
    pub tick_interval_seconds: u64,
    /// Upper bound on a single notification send (seconds)
    pub notify_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            notify_timeout_seconds: 15,
        }
    }
}

/// Outcome counts for one due-reminder pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TickReport {
    /// Reminders returned by the due query
    pub due: usize,
    /// Dispatched and advanced to their next occurrence
    pub sent: usize,
    /// Completed without dispatch because the medication ended
    pub completed: usize,
    /// Failed (logged and skipped); retried on a later tick
    pub failed: usize,
}

/// Scheduler trait for reminder processing operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the periodic tick loop until shutdown is requested
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Request a graceful stop; an in-flight tick drains before exit
    async fn stop(&self);

    /// Run one due-reminder pass at `now`.
    ///
    /// This is both the body of a scheduled tick and the manual trigger;
    /// the two are indistinguishable by design.
    async fn run_tick(&self, now: NaiveDateTime) -> Result<TickReport, DatabaseError>;
}

enum Outcome {
    Dispatched,
    MedicationEnded,
}

/// Main scheduler engine implementation
pub struct SchedulerEngine {
    config: SchedulerConfig,
    store: Arc<dyn ReminderStore>,
    sink: Arc<dyn NotificationSink>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl SchedulerEngine {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn ReminderStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            store,
            sink,
            shutdown_tx,
        }
    }

    fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Process a single due reminder.
    ///
    /// Expired medications transition the reminder to COMPLETED without a
    /// notification; everything else dispatches, then advances the reminder
    /// via the after-send recurrence rule and resets it to PENDING. All
    /// state for one reminder is written in a single store call, so a crash
    /// between reminders never leaves a half-updated row.
    #[instrument(skip(self, due), fields(reminder_id = %due.reminder.id))]
    async fn process_reminder(
        &self,
        due: &DueReminder,
        now: NaiveDateTime,
    ) -> Result<Outcome, DatabaseError> {
        if let Some(end_date) = due.medication.end_date {
            if end_date < now.date() {
                self.store.mark_completed(due.reminder.id).await?;
                debug!(medication = %due.medication.name, "Medication ended, reminder completed");
                return Ok(Outcome::MedicationEnded);
            }
        }

        let send_timeout = Duration::from_secs(self.config.notify_timeout_seconds);
        notify::dispatch(self.sink.as_ref(), due, send_timeout).await;

        let next_fire_at = recurrence::after_send(
            due.reminder.time_of_day,
            &due.reminder.days_of_week,
            now,
        );
        self.store
            .record_dispatch(due.reminder.id, now, next_fire_at)
            .await?;

        debug!(next_fire_at = %next_fire_at, "Reminder dispatched and advanced");
        Ok(Outcome::Dispatched)
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            "Starting reminder scheduler"
        );

        let mut tick = interval(Duration::from_secs(self.config.tick_interval_seconds));
        // An overrunning pass delays the next tick instead of stacking
        // catch-up ticks on top of it.
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Local::now().naive_local();
                    match self.run_tick(now).await {
                        Ok(report) if report.due > 0 => {
                            info!(
                                due = report.due,
                                sent = report.sent,
                                completed = report.completed,
                                failed = report.failed,
                                "Processed due reminders"
                            );
                        }
                        Ok(_) => debug!("No reminders due"),
                        Err(e) => error!(error = %e, "Error processing due reminders"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Reminder scheduler stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    #[instrument(skip(self))]
    async fn run_tick(&self, now: NaiveDateTime) -> Result<TickReport, DatabaseError> {
        let due = self.store.find_due(now).await.map_err(|e| {
            error!(error = %e, "Failed to query due reminders");
            e
        })?;

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for reminder in &due {
            match self.process_reminder(reminder, now).await {
                Ok(Outcome::Dispatched) => report.sent += 1,
                Ok(Outcome::MedicationEnded) => report.completed += 1,
                Err(e) => {
                    // Per-reminder isolation: log with the reminder's id and
                    // keep going. The reminder stays PENDING with its prior
                    // next_fire_at and is picked up again next tick.
                    error!(
                        reminder_id = %reminder.reminder.id,
                        error = %e,
                        "Failed to process reminder"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
