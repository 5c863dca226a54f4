use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Enforces the appointment state machine. Completed and no-show are
/// terminal; a cancelled appointment returns to scheduled only through
/// rescheduling, which re-checks conflicts first.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Scheduled],
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_transition(
        &self,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(&next) {
            warn!("Rejected status transition {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }
        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
