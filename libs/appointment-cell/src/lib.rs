pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::booking::AppointmentBookingService;
pub use services::conflict::BookingConflictGuard;
pub use services::lifecycle::AppointmentLifecycleService;
