use chrono::{Duration, NaiveTime};
use shared_models::scheduling::{BusyInterval, BusySource};

use crate::models::{DaySlot, EffectiveDay};

/// Merges overlapping or touching intervals into maximal disjoint runs,
/// sorted by start. Idempotent on already-merged input.
pub fn merge_busy_intervals(mut busy: Vec<BusyInterval>) -> Vec<BusyInterval> {
    busy.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(busy.len());
    for interval in busy {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Computes one day's candidate slots: fixed-duration intervals inside the
/// work window that clear the break and every busy interval.
///
/// Slots are emitted back to back from the window start; after a busy run
/// the cursor resumes at the run's end, not at the next grid mark. A slot
/// that would not fit whole before the next obstacle is dropped. When
/// `not_before` is set, slots starting earlier are discarded after the walk
/// so the grid stays anchored to the window.
pub fn compute_day_slots(
    day: &EffectiveDay,
    busy: &[BusyInterval],
    not_before: Option<NaiveTime>,
) -> Vec<DaySlot> {
    let duration = Duration::minutes(i64::from(day.slot_duration_minutes));
    if duration <= Duration::zero() || day.work_start >= day.work_end {
        return Vec::new();
    }

    let mut all_busy: Vec<BusyInterval> = Vec::with_capacity(busy.len() + day.blocked.len() + 1);
    all_busy.extend_from_slice(busy);
    all_busy.extend_from_slice(&day.blocked);
    if let (Some(break_start), Some(break_end)) = (day.break_start, day.break_end) {
        if break_start < break_end {
            all_busy.push(BusyInterval::new(break_start, break_end, BusySource::Break));
        }
    }

    // busy time outside the window cannot affect slots inside it
    let clipped: Vec<BusyInterval> = all_busy
        .into_iter()
        .filter_map(|interval| {
            let start = interval.start.max(day.work_start);
            let end = interval.end.min(day.work_end);
            (start < end).then_some(BusyInterval::new(start, end, interval.source))
        })
        .collect();

    let merged = merge_busy_intervals(clipped);

    let mut slots = Vec::new();
    let mut cursor = day.work_start;
    for run in &merged {
        emit_slots(&mut slots, &mut cursor, run.start, duration, day);
        if run.end > cursor {
            cursor = run.end;
        }
    }
    emit_slots(&mut slots, &mut cursor, day.work_end, duration, day);

    if let Some(cutoff) = not_before {
        slots.retain(|slot| slot.start >= cutoff);
    }
    slots
}

fn emit_slots(
    slots: &mut Vec<DaySlot>,
    cursor: &mut NaiveTime,
    limit: NaiveTime,
    duration: Duration,
    day: &EffectiveDay,
) {
    loop {
        let (end, wrapped) = cursor.overflowing_add_signed(duration);
        if wrapped != 0 || end > limit {
            break;
        }
        slots.push(DaySlot {
            start: *cursor,
            end,
            attendance_type: day.attendance_type,
        });
        *cursor = end;
    }
}
