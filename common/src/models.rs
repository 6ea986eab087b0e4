use crate::errors::{RecurrenceError, ValidationError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Reminder Models
// ============================================================================

pub type ReminderId = Uuid;

/// Lifecycle status of a reminder.
///
/// A healthy reminder cycles indefinitely through `Pending` with an advancing
/// `next_fire_at`; `Sent` is only a transient marker during dispatch and is
/// never what the poller sees. `Completed` and `Missed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Completed,
    Missed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "PENDING",
            ReminderStatus::Sent => "SENT",
            ReminderStatus::Completed => "COMPLETED",
            ReminderStatus::Missed => "MISSED",
        }
    }
}

impl FromStr for ReminderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReminderStatus::Pending),
            "SENT" => Ok(ReminderStatus::Sent),
            "COMPLETED" => Ok(ReminderStatus::Completed),
            "MISSED" => Ok(ReminderStatus::Missed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification channel configured per reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Sms,
    Email,
    Both,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "SMS",
            Channel::Email => "EMAIL",
            Channel::Both => "BOTH",
        }
    }

    pub fn includes_sms(&self) -> bool {
        matches!(self, Channel::Sms | Channel::Both)
    }

    pub fn includes_email(&self) -> bool {
        matches!(self, Channel::Email | Channel::Both)
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SMS" => Ok(Channel::Sms),
            "EMAIL" => Ok(Channel::Email),
            "BOTH" => Ok(Channel::Both),
            other => Err(ValidationError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of weekday codes on which a reminder fires.
///
/// Codes run 0 (Sunday) through 6 (Saturday). The empty set is a sentinel
/// meaning "every day", not "never".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(BTreeSet<u8>);

impl WeekdaySet {
    /// Empty set: fires every day.
    pub fn every_day() -> Self {
        Self(BTreeSet::new())
    }

    /// Build from weekday codes, rejecting anything outside 0..=6.
    pub fn from_days<I: IntoIterator<Item = u8>>(days: I) -> Result<Self, RecurrenceError> {
        let mut set = BTreeSet::new();
        for day in days {
            if day > 6 {
                return Err(RecurrenceError::InvalidWeekday(day));
            }
            set.insert(day);
        }
        Ok(Self(set))
    }

    pub fn is_every_day(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0.contains(&(weekday.num_days_from_sunday() as u8))
    }

    pub fn days(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Column representation for the `smallint[]` days_of_week column.
    pub fn to_db(&self) -> Vec<i16> {
        self.0.iter().map(|d| *d as i16).collect()
    }

    /// Rebuild from the `smallint[]` column, rejecting corrupt values.
    pub fn from_db(days: &[i16]) -> Result<Self, RecurrenceError> {
        Self::from_days(days.iter().map(|d| *d as u8))
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = RecurrenceError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Validated wall-clock time of day for a reminder.
///
/// Fails fast on out-of-range input instead of clamping; invalid values are
/// a caller contract violation and must never reach the scheduler.
pub fn time_of_day(hour: u32, minute: u32) -> Result<NaiveTime, RecurrenceError> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or(RecurrenceError::InvalidTimeOfDay { hour, minute })
}

/// A recurring medication reminder definition.
///
/// Owned by a medication; mutated only by the scheduler
/// (status/last_sent_at/next_fire_at) or by explicit user edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub medication_id: Uuid,
    /// Wall-clock time with no timezone component; interpreted in the
    /// scheduler's local time.
    pub time_of_day: NaiveTime,
    pub days_of_week: WeekdaySet,
    pub channel: Channel,
    pub status: ReminderStatus,
    pub last_sent_at: Option<NaiveDateTime>,
    /// The sole field the poller filters on. While status is `Pending` this
    /// is non-null and holds the earliest qualifying instant.
    pub next_fire_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input for creating a reminder; the initial `next_fire_at` is computed
/// at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub medication_id: Uuid,
    pub time_of_day: NaiveTime,
    pub days_of_week: WeekdaySet,
    pub channel: Channel,
}

// ============================================================================
// Dispatch Models
// ============================================================================

/// Medication details needed to build a notification and decide expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationInfo {
    pub name: String,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
    /// When set and strictly before today, pending reminders for this
    /// medication complete without dispatching.
    pub end_date: Option<NaiveDate>,
}

/// Contact details of the owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone_number: Option<String>,
}

/// A due reminder joined with enough medication and contact data to
/// dispatch; the exact shape returned by the store's due query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueReminder {
    pub reminder: Reminder,
    pub medication: MedicationInfo,
    pub contact: ContactInfo,
}
