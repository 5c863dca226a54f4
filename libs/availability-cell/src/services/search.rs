use calendar_cell::{ExternalCalendarAdapter, HttpCalendarAdapter};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;
use shared_config::AppConfig;
use shared_models::scheduling::{AttendanceType, BusyInterval};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, AvailabilitySlot, DaySlot, EffectiveDay, ExceptionKind, WeeklyAvailability,
    DEFAULT_SLOT_DURATION_MINUTES,
};
use crate::services::exceptions::ExceptionService;
use crate::services::slots::compute_day_slots;
use crate::services::stores::{BookingStore, ExceptionStore, ScheduleTemplateStore, SupabaseBookingStore};
use crate::services::template::WeeklyTemplateService;

#[derive(Debug, Clone)]
pub struct SlotSearchParams {
    pub professional_id: Uuid,
    /// Where the scan starts; slots on this first day that begin earlier
    /// are discarded.
    pub start: DateTime<Tz>,
    pub desired_count: usize,
    /// Overrides the template's slot duration when set.
    pub slot_duration_minutes: Option<i32>,
    pub attendance_type: AttendanceType,
    pub horizon_days: u32,
}

/// Walks the calendar day by day, reconciling the weekly template with
/// exceptions, bookings and the external calendar, until enough open slots
/// are collected or the horizon is exhausted.
pub struct AvailabilitySearchService {
    templates: Arc<dyn ScheduleTemplateStore>,
    exceptions: Arc<dyn ExceptionStore>,
    bookings: Arc<dyn BookingStore>,
    calendar: Arc<dyn ExternalCalendarAdapter>,
    clinic_calendar_id: String,
    timezone: Tz,
}

impl AvailabilitySearchService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Result<Self, AvailabilityError> {
        let timezone = config
            .clinic_timezone
            .parse::<Tz>()
            .map_err(|_| {
                AvailabilityError::Configuration(format!(
                    "Unknown clinic timezone: {}",
                    config.clinic_timezone
                ))
            })?;
        let calendar = HttpCalendarAdapter::new(config)
            .map_err(|e| AvailabilityError::Configuration(e.to_string()))?;

        Ok(Self {
            templates: Arc::new(WeeklyTemplateService::new(config, auth_token)),
            exceptions: Arc::new(ExceptionService::new(config, auth_token)),
            bookings: Arc::new(SupabaseBookingStore::new(config, auth_token)),
            calendar: Arc::new(calendar),
            clinic_calendar_id: config.clinic_calendar_id.clone(),
            timezone,
        })
    }

    /// Wires the service against explicit collaborators.
    pub fn with_collaborators(
        templates: Arc<dyn ScheduleTemplateStore>,
        exceptions: Arc<dyn ExceptionStore>,
        bookings: Arc<dyn BookingStore>,
        calendar: Arc<dyn ExternalCalendarAdapter>,
        clinic_calendar_id: String,
        timezone: Tz,
    ) -> Self {
        Self {
            templates,
            exceptions,
            bookings,
            calendar,
            clinic_calendar_id,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The next open slots for a professional, in chronological order.
    /// Returns fewer than `desired_count` slots, possibly none, when the
    /// horizon runs out first.
    pub async fn find_open_slots(
        &self,
        params: &SlotSearchParams,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        if !params.attendance_type.is_bookable() {
            return Err(AvailabilityError::Validation(
                "attendance_type must be in_person, remote or hybrid".to_string(),
            ));
        }

        let mut found = Vec::new();
        if params.desired_count == 0 || params.horizon_days == 0 {
            return Ok(found);
        }

        let start_date = params.start.date_naive();
        for offset in 0..params.horizon_days {
            let date = start_date + Duration::days(i64::from(offset));
            let Some(mut day) = self
                .resolve_effective_day(params.professional_id, date)
                .await?
            else {
                continue;
            };

            if !params.attendance_type.accepts(day.attendance_type) {
                debug!(
                    "Skipping {}: day offers {} but caller wants {}",
                    date, day.attendance_type, params.attendance_type
                );
                continue;
            }
            if let Some(duration) = params.slot_duration_minutes {
                day.slot_duration_minutes = duration;
            }

            let busy = self
                .assemble_busy_intervals(params.professional_id, date)
                .await?;
            let not_before = (offset == 0).then(|| params.start.time());

            for slot in compute_day_slots(&day, &busy, not_before) {
                let Some(stamped) = self.stamp(date, slot) else {
                    continue;
                };
                found.push(stamped);
                if found.len() == params.desired_count {
                    info!(
                        "Found {} open slots for professional {}",
                        found.len(),
                        params.professional_id
                    );
                    return Ok(found);
                }
            }
        }

        info!(
            "Horizon of {} days exhausted for professional {}, returning {} slots",
            params.horizon_days,
            params.professional_id,
            found.len()
        );
        Ok(found)
    }

    /// Every open slot on a single date.
    pub async fn day_slots(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        slot_duration_minutes: Option<i32>,
        attendance_type: Option<AttendanceType>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let Some(mut day) = self.resolve_effective_day(professional_id, date).await? else {
            return Ok(Vec::new());
        };
        if let Some(requested) = attendance_type {
            if !requested.accepts(day.attendance_type) {
                return Ok(Vec::new());
            }
        }
        if let Some(duration) = slot_duration_minutes {
            day.slot_duration_minutes = duration;
        }

        let busy = self
            .assemble_busy_intervals(professional_id, date)
            .await?;

        Ok(compute_day_slots(&day, &busy, None)
            .into_iter()
            .filter_map(|slot| self.stamp(date, slot))
            .collect())
    }

    /// Reconciles the weekly template with any active exception into the
    /// day's working definition. `None` means the day offers no slots.
    async fn resolve_effective_day(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<EffectiveDay>, AvailabilityError> {
        let day_of_week = date.weekday().number_from_monday() as u8;
        let template = self
            .templates
            .get_weekly_availability(professional_id, day_of_week)
            .await?;
        let exception = self
            .exceptions
            .get_active_exception(professional_id, date)
            .await?;

        let day = match exception {
            Some(exception) => match exception.kind {
                ExceptionKind::Holiday => {
                    debug!("Skipping {}: holiday", date);
                    None
                }
                ExceptionKind::Block => {
                    if exception.covers_whole_day() {
                        debug!("Skipping {}: fully blocked", date);
                        None
                    } else {
                        // a ranged block rides on top of the weekly window
                        template.as_ref().and_then(template_day).map(|mut day| {
                            if let Some(blocked) = exception.blocked_interval() {
                                day.blocked.push(blocked);
                            }
                            day
                        })
                    }
                }
                ExceptionKind::Custom => match (exception.start_time, exception.end_time) {
                    (Some(work_start), Some(work_end)) if work_start < work_end => {
                        let (attendance_type, slot_duration_minutes) = match template.as_ref() {
                            Some(t) if t.attendance_type.is_bookable() => {
                                (t.attendance_type, t.slot_duration_minutes)
                            }
                            _ => (AttendanceType::Hybrid, DEFAULT_SLOT_DURATION_MINUTES),
                        };
                        Some(EffectiveDay {
                            work_start,
                            work_end,
                            break_start: None,
                            break_end: None,
                            attendance_type,
                            slot_duration_minutes,
                            blocked: Vec::new(),
                        })
                    }
                    _ => {
                        warn!(
                            "Custom exception {} has no usable time range, skipping {}",
                            exception.id, date
                        );
                        None
                    }
                },
            },
            None => template.as_ref().and_then(template_day),
        };

        Ok(day)
    }

    /// Bookings and external busy time for one day. A calendar failure is
    /// logged and the day proceeds with booking data only.
    async fn assemble_busy_intervals(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AvailabilityError> {
        let (bookings, external) = futures::join!(
            self.bookings.get_active_appointments(professional_id, date),
            self.calendar
                .get_external_busy_intervals(&self.clinic_calendar_id, date),
        );

        let mut busy = bookings?;
        match external {
            Ok(intervals) => busy.extend(intervals),
            Err(e) => {
                warn!(
                    "External calendar lookup failed for {}, continuing without it: {}",
                    date, e
                );
            }
        }
        Ok(busy)
    }

    /// Stamps a wall-clock slot with its date in the clinic timezone.
    /// Nonexistent local times (DST gaps) are skipped.
    fn stamp(&self, date: NaiveDate, slot: DaySlot) -> Option<AvailabilitySlot> {
        let start = self
            .timezone
            .from_local_datetime(&date.and_time(slot.start))
            .earliest()?;
        let end = self
            .timezone
            .from_local_datetime(&date.and_time(slot.end))
            .earliest()?;
        Some(AvailabilitySlot {
            start,
            end,
            attendance_type: slot.attendance_type,
        })
    }
}

fn template_day(template: &WeeklyAvailability) -> Option<EffectiveDay> {
    if !template.attendance_type.is_bookable() {
        return None;
    }
    Some(EffectiveDay {
        work_start: template.work_start,
        work_end: template.work_end,
        break_start: template.break_start,
        break_end: template.break_end,
        attendance_type: template.attendance_type,
        slot_duration_minutes: template.slot_duration_minutes,
        blocked: Vec::new(),
    })
}
