use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// How an appointment or a working day is attended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceType {
    InPerson,
    Remote,
    Hybrid,
    Unavailable,
}

impl AttendanceType {
    /// Whether a request for `self` can be served by a day typed `day_type`.
    /// A hybrid request accepts any bookable day; hybrid days accept any
    /// bookable request.
    pub fn accepts(&self, day_type: AttendanceType) -> bool {
        match self {
            AttendanceType::InPerson => {
                matches!(day_type, AttendanceType::InPerson | AttendanceType::Hybrid)
            }
            AttendanceType::Remote => {
                matches!(day_type, AttendanceType::Remote | AttendanceType::Hybrid)
            }
            AttendanceType::Hybrid => day_type != AttendanceType::Unavailable,
            AttendanceType::Unavailable => false,
        }
    }

    pub fn is_bookable(&self) -> bool {
        *self != AttendanceType::Unavailable
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttendanceType::InPerson => "in_person",
            AttendanceType::Remote => "remote",
            AttendanceType::Hybrid => "hybrid",
            AttendanceType::Unavailable => "unavailable",
        };
        write!(f, "{}", s)
    }
}

/// Origin of a busy interval. `Break` is only ever synthesized inside slot
/// computation and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusySource {
    Booking,
    ExternalCalendar,
    ExceptionBlock,
    Break,
}

/// A wall-clock time range within a single day that cannot host a new slot.
/// Intervals are half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub source: BusySource,
}

impl BusyInterval {
    pub fn new(start: NaiveTime, end: NaiveTime, source: BusySource) -> Self {
        Self { start, end, source }
    }

    /// Half-open overlap: back-to-back intervals do not overlap.
    pub fn overlaps(&self, other: &BusyInterval) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Overlapping or touching ranges can be merged into one.
    pub fn touches_or_overlaps(&self, other: &BusyInterval) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

/// Half-open interval overlap test shared by the slot computer and the
/// booking conflict guard.
pub fn intervals_conflict(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn back_to_back_intervals_do_not_conflict() {
        assert!(!intervals_conflict(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
        assert!(!intervals_conflict(t(10, 0), t(11, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn overlapping_intervals_conflict() {
        assert!(intervals_conflict(t(9, 0), t(10, 30), t(10, 0), t(11, 0)));
        assert!(intervals_conflict(t(10, 0), t(11, 0), t(9, 0), t(10, 30)));
        // containment
        assert!(intervals_conflict(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
        // identical
        assert!(intervals_conflict(t(9, 0), t(10, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn attendance_compatibility_matrix() {
        use AttendanceType::*;
        assert!(InPerson.accepts(InPerson));
        assert!(InPerson.accepts(Hybrid));
        assert!(!InPerson.accepts(Remote));
        assert!(Remote.accepts(Remote));
        assert!(Remote.accepts(Hybrid));
        assert!(!Remote.accepts(InPerson));
        assert!(Hybrid.accepts(InPerson));
        assert!(Hybrid.accepts(Remote));
        assert!(Hybrid.accepts(Hybrid));
        assert!(!Hybrid.accepts(Unavailable));
        assert!(!InPerson.accepts(Unavailable));
        assert!(!Unavailable.accepts(InPerson));
    }

    #[test]
    fn touching_intervals_merge_but_do_not_conflict() {
        let a = BusyInterval::new(t(9, 0), t(10, 0), BusySource::Booking);
        let b = BusyInterval::new(t(10, 0), t(11, 0), BusySource::Booking);
        assert!(!a.overlaps(&b));
        assert!(a.touches_or_overlaps(&b));
    }
}
