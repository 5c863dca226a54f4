pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::exceptions::ExceptionService;
pub use services::search::{AvailabilitySearchService, SlotSearchParams};
pub use services::slots::{compute_day_slots, merge_busy_intervals};
pub use services::stores::{BookingStore, ExceptionStore, ScheduleTemplateStore};
pub use services::template::WeeklyTemplateService;
