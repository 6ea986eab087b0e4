// Error handling framework

use thiserror::Error;

/// Recurrence calculation and reminder-definition errors.
///
/// These are caller contract violations: they surface at reminder
/// creation/edit time and never reach the scheduler.
#[derive(Error, Debug)]
pub enum RecurrenceError {
    #[error("Invalid time of day {hour:02}:{minute:02}")]
    InvalidTimeOfDay { hour: u32, minute: u32 },

    #[error("Invalid weekday {0}: must be 0 (Sunday) through 6 (Saturday)")]
    InvalidWeekday(u8),
}

/// Validation errors for reminder input fields
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unknown notification channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown reminder status: {0}")]
    UnknownStatus(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Notification transport errors.
///
/// The sinks swallow these internally (log and continue) so that a failing
/// transport never propagates into the scheduler loop; the type exists for
/// the transports' own plumbing and for tests.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email transport failed: {0}")]
    EmailTransport(String),

    #[error("SMS transport failed: {0}")]
    SmsTransport(String),

    #[error("{0} transport is not configured")]
    NotConfigured(&'static str),

    #[error("Missing contact info: {0}")]
    MissingContact(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => DatabaseError::QueryFailed(db_err.message().to_string()),
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}
