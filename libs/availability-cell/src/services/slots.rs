//! Slot engine: pure transformations over a day's slot list.
//!
//! Everything here is synchronous and side-effect free. The current
//! moment is always an explicit parameter so status computations are
//! deterministic under test.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    BookingRef, DayOfWeek, SchedulingError, SlotStatus, TimeSlot,
};

use crate::models::TimeRange;

pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 30;

/// Convert an `HH:MM` time string to minutes since midnight.
pub fn time_to_minutes(time: &str) -> Result<i32, SchedulingError> {
    let invalid = || SchedulingError::InvalidTimeFormat(time.to_string());

    let (hours_part, minutes_part) = time.split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours_part.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes_part.parse().map_err(|_| invalid())?;

    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok((hours * 60 + minutes) as i32)
}

/// Convert minutes since midnight back to a zero-padded `HH:MM` string.
pub fn minutes_to_time(minutes: i32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn sorted_by_start(slots: Vec<TimeSlot>) -> Result<Vec<TimeSlot>, SchedulingError> {
    let mut keyed = slots
        .into_iter()
        .map(|slot| Ok((time_to_minutes(&slot.start_time)?, slot)))
        .collect::<Result<Vec<_>, SchedulingError>>()?;
    keyed.sort_by_key(|(start, _)| *start);
    Ok(keyed.into_iter().map(|(_, slot)| slot).collect())
}

/// Expand declared time ranges into fixed-duration slots.
///
/// Steps forward from each range start while a whole slot still fits;
/// a trailing remainder shorter than the duration is dropped, not
/// emitted as a partial slot. Overlapping ranges are accepted, but a
/// start time is only emitted once (first range wins) so the
/// uniqueness invariant holds from generation onward.
pub fn generate_slots(
    ranges: &[TimeRange],
    duration_minutes: i32,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let mut slots = Vec::new();
    let mut seen_starts = HashSet::new();

    for range in ranges {
        let start = time_to_minutes(&range.start_time)?;
        let end = time_to_minutes(&range.end_time)?;

        let mut current = start;
        while current + duration_minutes <= end {
            if seen_starts.insert(current) {
                slots.push(TimeSlot::available(
                    minutes_to_time(current),
                    minutes_to_time(current + duration_minutes),
                ));
            }
            current += duration_minutes;
        }
    }

    sorted_by_start(slots)
}

/// Reconcile freshly generated slots with the previously stored list.
///
/// Per unique start time across both lists:
/// 1. a live booking always wins and forces `booked` with its id;
/// 2. otherwise the new slot's bounds are used, carrying forward a
///    previously stored `booked` status and its reference (covers the
///    race where the live-booking map was captured slightly before the
///    stored state);
/// 3. a start time the new ranges no longer cover keeps its old slot
///    untouched, so shrinking declared hours never deletes a slot.
pub fn merge_slots(
    new_slots: &[TimeSlot],
    existing_slots: &[TimeSlot],
    booked_map: &HashMap<String, Uuid>,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let new_by_start: HashMap<&str, &TimeSlot> = new_slots
        .iter()
        .map(|slot| (slot.start_time.as_str(), slot))
        .collect();
    let existing_by_start: HashMap<&str, &TimeSlot> = existing_slots
        .iter()
        .map(|slot| (slot.start_time.as_str(), slot))
        .collect();

    let mut all_starts = BTreeMap::new();
    for slot in new_slots.iter().chain(existing_slots.iter()) {
        all_starts.insert(time_to_minutes(&slot.start_time)?, slot.start_time.as_str());
    }

    let mut merged = Vec::with_capacity(all_starts.len());
    for start in all_starts.into_values() {
        if let Some(appointment_id) = booked_map.get(start) {
            let base = new_by_start
                .get(start)
                .or_else(|| existing_by_start.get(start))
                .copied();
            if let Some(base) = base {
                let mut slot = base.clone();
                slot.status = SlotStatus::Booked;
                slot.appointment_id = Some(*appointment_id);
                merged.push(slot);
            }
        } else if let Some(new_slot) = new_by_start.get(start) {
            let mut slot = (*new_slot).clone();
            if let Some(old) = existing_by_start.get(start) {
                if old.is_booked() {
                    slot.status = SlotStatus::Booked;
                    slot.appointment_id = old.appointment_id;
                }
            }
            merged.push(slot);
        } else if let Some(old) = existing_by_start.get(start) {
            merged.push((*old).clone());
        }
    }

    Ok(merged)
}

/// Next occurrence of `day` on or after `reference` (same day counts).
pub fn next_occurrence(day: DayOfWeek, reference: NaiveDate) -> NaiveDate {
    let days_until = (day.index() + 7 - DayOfWeek::of_date(reference).index()) % 7;
    reference + Days::new(u64::from(days_until))
}

/// Recompute the transient display status of each slot.
///
/// `specific_date` selects date-exact mode; otherwise the target date
/// is projected from `day` and `reference_date` (defaulting to today).
/// The per-slot decision order is load-bearing: a live booking always
/// pre-empts date logic, and the date comparison always pre-empts the
/// time-of-day comparison, so a future date is never downgraded to
/// `past` by the current clock.
pub fn compute_statuses(
    slots: &[TimeSlot],
    day: DayOfWeek,
    appointments: &[BookingRef],
    now: NaiveDateTime,
    reference_date: Option<NaiveDate>,
    specific_date: Option<NaiveDate>,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let today = now.date();
    let reference = reference_date.unwrap_or(today);

    let target_date = match specific_date {
        Some(date) => date,
        None => next_occurrence(day, reference),
    };

    let mut booked_map: HashMap<&str, Uuid> = HashMap::new();
    for appointment in appointments {
        if !appointment.status.is_occupying() {
            continue;
        }
        let relevant = match specific_date {
            Some(date) => appointment.date == date,
            None => {
                DayOfWeek::of_date(appointment.date) == day && appointment.date >= target_date
            }
        };
        if relevant {
            booked_map.insert(appointment.time.as_str(), appointment.id);
        }
    }

    let now_minutes = (now.time().hour() * 60 + now.time().minute()) as i32;

    let mut updated = Vec::with_capacity(slots.len());
    for slot in slots {
        let start_minutes = time_to_minutes(&slot.start_time)?;
        let mut slot = slot.clone();

        if let Some(appointment_id) = booked_map.get(slot.start_time.as_str()) {
            slot.status = SlotStatus::Booked;
            slot.appointment_id = Some(*appointment_id);
        } else if target_date > today {
            // Future date: every non-booked slot is bookable, no
            // time-of-day check whatsoever.
            slot.status = SlotStatus::Available;
            slot.appointment_id = None;
        } else if target_date == today {
            if start_minutes < now_minutes {
                slot.status = SlotStatus::Past;
            } else {
                slot.status = SlotStatus::Available;
            }
            slot.appointment_id = None;
        } else {
            slot.status = SlotStatus::Past;
            slot.appointment_id = None;
        }

        updated.push(slot);
    }

    let available = count_status(&updated, SlotStatus::Available);
    let booked = count_status(&updated, SlotStatus::Booked);
    let past = count_status(&updated, SlotStatus::Past);
    debug!(
        %day,
        %target_date,
        available,
        booked,
        past,
        total = updated.len(),
        "slot statuses computed"
    );

    Ok(updated)
}

fn count_status(slots: &[TimeSlot], status: SlotStatus) -> usize {
    slots.iter().filter(|slot| slot.status == status).count()
}

/// Expand a single range and append any slots whose start time is not
/// already present, keeping the list sorted.
pub fn add_slot(
    existing_slots: &[TimeSlot],
    start_time: &str,
    end_time: &str,
    duration_minutes: i32,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let range = TimeRange {
        start_time: start_time.to_string(),
        end_time: end_time.to_string(),
    };
    let new_slots = generate_slots(std::slice::from_ref(&range), duration_minutes)?;

    let existing_starts: HashSet<&str> = existing_slots
        .iter()
        .map(|slot| slot.start_time.as_str())
        .collect();

    let mut slots = existing_slots.to_vec();
    for slot in new_slots {
        if !existing_starts.contains(slot.start_time.as_str()) {
            slots.push(slot);
        }
    }

    sorted_by_start(slots)
}

/// Remove the slot with the given start time.
///
/// A slot whose stored status is `booked` can never be removed
/// directly; the appointment has to be cancelled first, which frees
/// the slot on the next status recompute.
pub fn remove_slot(
    existing_slots: &[TimeSlot],
    start_time: &str,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let slot = existing_slots
        .iter()
        .find(|slot| slot.start_time == start_time)
        .ok_or_else(|| SchedulingError::SlotNotFound(start_time.to_string()))?;

    if slot.is_booked() {
        return Err(SchedulingError::BookedSlotRemovalRejected(
            start_time.to_string(),
        ));
    }

    Ok(existing_slots
        .iter()
        .filter(|slot| slot.start_time != start_time)
        .cloned()
        .collect())
}

/// Enforce the uniqueness-by-start-time and ordering invariants at the
/// persistence boundary. Duplicate start times keep their first
/// occurrence.
pub fn normalize_slots(slots: Vec<TimeSlot>) -> Result<Vec<TimeSlot>, SchedulingError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(slots.len());
    for slot in slots {
        if seen.insert(slot.start_time.clone()) {
            unique.push(slot);
        }
    }
    sorted_by_start(unique)
}
