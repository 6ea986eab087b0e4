// Recurrence calculation for reminder definitions.
//
// Pure functions: given a reminder's wall-clock time of day and weekday set,
// compute the next qualifying instant from a reference instant. No I/O.
//
// There are two deliberately distinct daily conventions. `after_send` answers
// "when does a just-fired reminder fire next" and always advances a full day,
// so a reminder can never re-fire in the slot it just fired in.
// `from_reference` answers "when does this definition fire next from an
// arbitrary instant" and may pick today if today's slot has not passed yet.
// Collapsing the two reintroduces a same-day double-fire bug; keep them
// separate.

use crate::models::WeekdaySet;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

/// Next occurrence strictly after a just-fired reminder.
///
/// Daily cadence always lands on `reference.date + 1 day`; weekday sets scan
/// forward for the first member strictly after `reference`.
pub fn after_send(
    time_of_day: NaiveTime,
    days_of_week: &WeekdaySet,
    reference: NaiveDateTime,
) -> NaiveDateTime {
    if days_of_week.is_every_day() {
        return (reference.date() + Duration::days(1)).and_time(time_of_day);
    }
    next_weekly(time_of_day, days_of_week, reference)
}

/// Next occurrence from an arbitrary reference, possibly today.
///
/// Used at reminder creation and edit time: if today's slot is still in the
/// future it is the answer, otherwise roll forward.
pub fn from_reference(
    time_of_day: NaiveTime,
    days_of_week: &WeekdaySet,
    reference: NaiveDateTime,
) -> NaiveDateTime {
    if days_of_week.is_every_day() {
        let today = reference.date().and_time(time_of_day);
        if today > reference {
            return today;
        }
        return (reference.date() + Duration::days(1)).and_time(time_of_day);
    }
    next_weekly(time_of_day, days_of_week, reference)
}

/// Shared weekly scan: first candidate day in the next 7 (today included)
/// whose weekday is in the set and whose instant is strictly after
/// `reference`.
fn next_weekly(
    time_of_day: NaiveTime,
    days_of_week: &WeekdaySet,
    reference: NaiveDateTime,
) -> NaiveDateTime {
    for offset in 0..7 {
        let candidate_date = reference.date() + Duration::days(offset);
        if !days_of_week.contains(candidate_date.weekday()) {
            continue;
        }
        let candidate = candidate_date.and_time(time_of_day);
        if candidate > reference {
            return candidate;
        }
    }

    // Unreachable for a well-formed non-empty set, kept as a guard.
    (reference.date() + Duration::days(7)).and_time(time_of_day)
}
