use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::scheduling::AttendanceType;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A booked consultation. Times are wall-clock in the clinic timezone;
/// the date column keeps day-scoped queries cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attendance_type: AttendanceType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments hold their time slot against new bookings.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    /// Terminal appointments accept no further transitions. Cancelled is
    /// not terminal: rescheduling revives it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::NoShow)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub client_id: Uuid,
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attendance_type: AttendanceType,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQuery {
    #[serde(default)]
    pub professional_id: Option<Uuid>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct PendingConfirmationQuery {
    #[serde(default)]
    pub professional_id: Option<Uuid>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Booking policy knobs, currently fixed clinic-wide.
#[derive(Debug, Clone)]
pub struct BookingValidationRules {
    pub min_duration_minutes: i64,
    pub max_duration_minutes: i64,
    pub max_advance_days: i64,
    pub allow_same_day: bool,
}

impl Default for BookingValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            max_duration_minutes: 240,
            max_advance_days: 90,
            allow_same_day: true,
        }
    }
}

impl BookingValidationRules {
    /// Checks a booking request against clinic policy. `now` is the current
    /// wall-clock time in the clinic timezone.
    pub fn validate(
        &self,
        request: &CreateAppointmentRequest,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        if request.start_time >= request.end_time {
            return Err(AppointmentError::Validation(
                "start_time must be earlier than end_time".to_string(),
            ));
        }

        let duration = (request.end_time - request.start_time).num_minutes();
        if duration < self.min_duration_minutes || duration > self.max_duration_minutes {
            return Err(AppointmentError::Validation(format!(
                "appointment duration must be between {} and {} minutes",
                self.min_duration_minutes, self.max_duration_minutes
            )));
        }

        if !request.attendance_type.is_bookable() {
            return Err(AppointmentError::Validation(
                "attendance_type must be in_person, remote or hybrid".to_string(),
            ));
        }

        if request.date < now.date()
            || (request.date == now.date() && request.start_time <= now.time())
        {
            return Err(AppointmentError::Validation(
                "appointments must start in the future".to_string(),
            ));
        }
        if request.date == now.date() && !self.allow_same_day {
            return Err(AppointmentError::Validation(
                "same-day booking is not allowed".to_string(),
            ));
        }

        if request.date > now.date() + Duration::days(self.max_advance_days) {
            return Err(AppointmentError::Validation(format!(
                "appointments can be booked at most {} days ahead",
                self.max_advance_days
            )));
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment not found: {0}")]
    NotFound(String),

    #[error("Booking conflict: {0}")]
    Conflict(String),

    #[error("Cannot transition appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn request(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            client_id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            date,
            start_time: start,
            end_time: end,
            attendance_type: AttendanceType::InPerson,
            notes: None,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 14)
            .unwrap()
            .and_time(time(8, 0))
    }

    #[test]
    fn test_active_and_terminal_statuses() {
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::Completed.is_active());

        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::NoShow.is_terminal());
        assert!(!AppointmentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_rules_accept_reasonable_booking() {
        let rules = BookingValidationRules::default();
        let request = request(now().date(), time(10, 0), time(11, 0));
        assert!(rules.validate(&request, now()).is_ok());
    }

    #[test]
    fn test_rules_reject_inverted_times() {
        let rules = BookingValidationRules::default();
        let request = request(now().date(), time(11, 0), time(10, 0));
        assert!(rules.validate(&request, now()).is_err());
    }

    #[test]
    fn test_rules_reject_too_short_and_too_long() {
        let rules = BookingValidationRules::default();
        let short = request(now().date(), time(10, 0), time(10, 10));
        assert!(rules.validate(&short, now()).is_err());
        let long = request(now().date(), time(10, 0), time(14, 30));
        assert!(rules.validate(&long, now()).is_err());
    }

    #[test]
    fn test_rules_reject_past_start() {
        let rules = BookingValidationRules::default();
        let past = request(now().date(), time(7, 0), time(8, 0));
        assert!(rules.validate(&past, now()).is_err());

        let yesterday = request(
            now().date().pred_opt().unwrap(),
            time(10, 0),
            time(11, 0),
        );
        assert!(rules.validate(&yesterday, now()).is_err());
    }

    #[test]
    fn test_rules_reject_beyond_advance_window() {
        let rules = BookingValidationRules::default();
        let far = request(
            now().date() + Duration::days(91),
            time(10, 0),
            time(11, 0),
        );
        assert!(rules.validate(&far, now()).is_err());

        let edge = request(
            now().date() + Duration::days(90),
            time(10, 0),
            time(11, 0),
        );
        assert!(rules.validate(&edge, now()).is_ok());
    }

    #[test]
    fn test_rules_reject_unavailable_attendance() {
        let rules = BookingValidationRules::default();
        let mut bad = request(now().date(), time(10, 0), time(11, 0));
        bad.attendance_type = AttendanceType::Unavailable;
        assert!(rules.validate(&bad, now()).is_err());
    }

    #[test]
    fn test_same_day_policy() {
        let rules = BookingValidationRules {
            allow_same_day: false,
            ..Default::default()
        };
        let today = request(now().date(), time(10, 0), time(11, 0));
        assert!(rules.validate(&today, now()).is_err());

        let tomorrow = request(now().date().succ_opt().unwrap(), time(10, 0), time(11, 0));
        assert!(rules.validate(&tomorrow, now()).is_ok());
    }
}
