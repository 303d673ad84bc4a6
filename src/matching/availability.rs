// src/matching/availability.rs - Near-term bookable-slot matching against coarse time preferences

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashSet;

use crate::models::AvailabilitySlot;

const MORNING_START_HOUR: u32 = 8;
const AFTERNOON_START_HOUR: u32 = 12;
const EVENING_START_HOUR: u32 = 17;
const EVENING_END_HOUR: u32 = 21;

/// Coarse time-of-day window requested on the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    Morning,
    Afternoon,
    Evening,
    Weekend,
}

/// Derives the requested windows from free-text bucket labels.
///
/// Returns `None` when the labels impose no constraint: an empty list, an
/// explicit "flexible" answer, or labels we cannot recognize at all (which
/// degrade to "no preference" rather than filtering everything out). A
/// single label may imply more than one window ("Am Wochenende morgens").
pub fn parse_time_windows(labels: &[String]) -> Option<HashSet<TimeWindow>> {
    let mut windows = HashSet::new();
    for label in labels {
        let lowered = label.to_lowercase();
        if lowered.contains("flexib") {
            return None;
        }
        if lowered.contains("morgen") || lowered.contains("vormittag") || lowered.contains("morning")
        {
            windows.insert(TimeWindow::Morning);
        }
        if lowered.contains("mittag") || lowered.contains("afternoon") {
            windows.insert(TimeWindow::Afternoon);
        }
        if lowered.contains("abend") || lowered.contains("evening") {
            windows.insert(TimeWindow::Evening);
        }
        if lowered.contains("wochenend") || lowered.contains("weekend") {
            windows.insert(TimeWindow::Weekend);
        }
    }
    if windows.is_empty() {
        None
    } else {
        Some(windows)
    }
}

/// True iff the therapist has at least one bookable slot within the
/// look-ahead horizon that satisfies any requested window.
///
/// Walks forward day-by-day from tomorrow through `lookahead_days`.
/// Recurring slots occur on their weekday until an optional `end_date`;
/// one-off slots occur only on their `specific_date`. Inactive slots are
/// ignored. With no time preference the answer is immediately true.
pub fn has_matching_slot(
    slots: &[AvailabilitySlot],
    time_slots: Option<&[String]>,
    today: NaiveDate,
    lookahead_days: i64,
) -> bool {
    let requested = match time_slots {
        None => return true,
        Some(labels) if labels.is_empty() => return true,
        Some(labels) => match parse_time_windows(labels) {
            None => return true,
            Some(windows) => windows,
        },
    };

    for offset in 1..=lookahead_days {
        let date = today + Duration::days(offset);
        let weekday = date.weekday().num_days_from_sunday() as u8;
        let is_weekend = weekday == 0 || weekday == 6;

        for slot in slots.iter().filter(|s| s.active) {
            if !slot_occurs_on(slot, date, weekday) {
                continue;
            }
            if slot_satisfies_any(slot, is_weekend, &requested) {
                return true;
            }
        }
    }
    false
}

fn slot_occurs_on(slot: &AvailabilitySlot, date: NaiveDate, weekday: u8) -> bool {
    if slot.is_recurring {
        slot.day_of_week == Some(weekday) && slot.end_date.map_or(true, |end| date <= end)
    } else {
        slot.specific_date == Some(date)
    }
}

fn slot_satisfies_any(
    slot: &AvailabilitySlot,
    is_weekend: bool,
    requested: &HashSet<TimeWindow>,
) -> bool {
    for window in requested {
        let satisfied = match window {
            TimeWindow::Weekend => is_weekend,
            TimeWindow::Morning => hour_in(slot, MORNING_START_HOUR, AFTERNOON_START_HOUR),
            TimeWindow::Afternoon => hour_in(slot, AFTERNOON_START_HOUR, EVENING_START_HOUR),
            TimeWindow::Evening => hour_in(slot, EVENING_START_HOUR, EVENING_END_HOUR),
        };
        if satisfied {
            return true;
        }
    }
    false
}

fn hour_in(slot: &AvailabilitySlot, start: u32, end: u32) -> bool {
    slot.start_hour().is_some_and(|h| h >= start && h < end)
}
