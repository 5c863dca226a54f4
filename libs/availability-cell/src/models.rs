use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use shared_database::DbError;
use shared_models::scheduling::{intervals_conflict, AttendanceType, BusyInterval, BusySource};
use thiserror::Error;
use uuid::Uuid;

/// Slots offered when the caller does not ask for a specific number.
pub const DEFAULT_DESIRED_COUNT: usize = 3;
/// Slot length applied when neither the request nor the template sets one.
pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 60;
/// How many days ahead a search scans before giving up.
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// One weekday row of a professional's recurring schedule.
///
/// `day_of_week` follows ISO numbering: 1 is Monday, 7 is Sunday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub day_of_week: u8,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    #[serde(default)]
    pub break_start: Option<NaiveTime>,
    #[serde(default)]
    pub break_end: Option<NaiveTime>,
    pub attendance_type: AttendanceType,
    pub slot_duration_minutes: i32,
    pub active: bool,
}

/// One weekday entry in a template replacement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailabilityEntry {
    pub day_of_week: u8,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    #[serde(default)]
    pub break_start: Option<NaiveTime>,
    #[serde(default)]
    pub break_end: Option<NaiveTime>,
    pub attendance_type: AttendanceType,
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: i32,
}

fn default_slot_duration() -> i32 {
    DEFAULT_SLOT_DURATION_MINUTES
}

impl WeeklyAvailabilityEntry {
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if !(1..=7).contains(&self.day_of_week) {
            return Err(AvailabilityError::Validation(format!(
                "day_of_week must be between 1 (Monday) and 7 (Sunday), got {}",
                self.day_of_week
            )));
        }
        if self.work_start >= self.work_end {
            return Err(AvailabilityError::Validation(
                "work_start must be earlier than work_end".to_string(),
            ));
        }
        match (self.break_start, self.break_end) {
            (None, None) => {}
            (Some(break_start), Some(break_end)) => {
                if break_start >= break_end {
                    return Err(AvailabilityError::Validation(
                        "break_start must be earlier than break_end".to_string(),
                    ));
                }
                if break_start < self.work_start || break_end > self.work_end {
                    return Err(AvailabilityError::Validation(
                        "break must lie inside the work window".to_string(),
                    ));
                }
            }
            _ => {
                return Err(AvailabilityError::Validation(
                    "break_start and break_end must be provided together".to_string(),
                ));
            }
        }
        if self.slot_duration_minutes <= 0 {
            return Err(AvailabilityError::Validation(
                "slot_duration_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplaceWeeklyTemplateRequest {
    pub entries: Vec<WeeklyAvailabilityEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Whole day off, no slots regardless of times.
    Holiday,
    /// Replaces the weekly window with the exception's own time range.
    Custom,
    /// Removes a time range from the day; without times, the whole day.
    Block,
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionKind::Holiday => write!(f, "holiday"),
            ExceptionKind::Custom => write!(f, "custom"),
            ExceptionKind::Block => write!(f, "block"),
        }
    }
}

/// A dated override of the weekly schedule. `professional_id` of `None`
/// means clinic-wide, applying to every professional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleException {
    pub id: Uuid,
    #[serde(default)]
    pub professional_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    pub kind: ExceptionKind,
    #[serde(default)]
    pub reason: Option<String>,
    pub active: bool,
}

impl ScheduleException {
    /// An exception without a complete time range applies to the whole day.
    pub fn covers_whole_day(&self) -> bool {
        self.start_time.is_none() || self.end_time.is_none()
    }

    /// The busy interval a time-ranged block contributes to its day.
    pub fn blocked_interval(&self) -> Option<BusyInterval> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start < end => {
                Some(BusyInterval::new(start, end, BusySource::ExceptionBlock))
            }
            _ => None,
        }
    }

    /// Whether this exception forbids booking the given interval on a
    /// covered date. Custom exceptions reshape the day instead of blocking.
    pub fn blocks(&self, start: NaiveTime, end: NaiveTime) -> bool {
        if !matches!(self.kind, ExceptionKind::Holiday | ExceptionKind::Block) {
            return false;
        }
        if self.covers_whole_day() {
            return true;
        }
        match (self.start_time, self.end_time) {
            (Some(exception_start), Some(exception_end)) => {
                intervals_conflict(start, end, exception_start, exception_end)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExceptionRequest {
    #[serde(default)]
    pub professional_id: Option<Uuid>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    pub kind: ExceptionKind,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CreateExceptionRequest {
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if let Some(end_date) = self.end_date {
            if end_date < self.start_date {
                return Err(AvailabilityError::Validation(
                    "end_date must not precede start_date".to_string(),
                ));
            }
        }
        match (self.start_time, self.end_time) {
            (None, None) => {
                if self.kind == ExceptionKind::Custom {
                    return Err(AvailabilityError::Validation(
                        "custom exceptions require start_time and end_time".to_string(),
                    ));
                }
            }
            (Some(start_time), Some(end_time)) => {
                if start_time >= end_time {
                    return Err(AvailabilityError::Validation(
                        "start_time must be earlier than end_time".to_string(),
                    ));
                }
            }
            _ => {
                return Err(AvailabilityError::Validation(
                    "start_time and end_time must be provided together".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// The working definition of one calendar day once the weekly template and
/// any exception have been reconciled.
#[derive(Debug, Clone)]
pub struct EffectiveDay {
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub attendance_type: AttendanceType,
    pub slot_duration_minutes: i32,
    /// Hard-blocked ranges layered on top of the window by exceptions.
    pub blocked: Vec<BusyInterval>,
}

/// A candidate slot in day-local wall-clock time, before it is stamped
/// with a date and timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub attendance_type: AttendanceType,
}

/// A bookable interval offered to callers. Computed on demand and never
/// persisted; booking re-checks conflicts at write time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySlot {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub attendance_type: AttendanceType,
}

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<DbError> for AvailabilityError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(message) => AvailabilityError::NotFound(message),
            DbError::Conflict(message) => AvailabilityError::Conflict(message),
            other => AvailabilityError::Database(other.to_string()),
        }
    }
}
