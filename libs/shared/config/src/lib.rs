use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub calendar_api_base_url: String,
    pub calendar_api_token: String,
    pub clinic_calendar_id: String,
    pub calendar_timeout_seconds: u64,
    pub clinic_timezone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            calendar_api_base_url: env::var("CALENDAR_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_API_BASE_URL not set, external calendar lookups disabled");
                    String::new()
                }),
            calendar_api_token: env::var("CALENDAR_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_API_TOKEN not set, using empty value");
                    String::new()
                }),
            clinic_calendar_id: env::var("CLINIC_CALENDAR_ID")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_CALENDAR_ID not set, using empty value");
                    String::new()
                }),
            calendar_timeout_seconds: env::var("CALENDAR_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            clinic_timezone: env::var("CLINIC_TIMEZONE")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_TIMEZONE not set, using default America/Sao_Paulo");
                    "America/Sao_Paulo".to_string()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_calendar_configured(&self) -> bool {
        !self.calendar_api_base_url.is_empty()
            && !self.calendar_api_token.is_empty()
            && !self.clinic_calendar_id.is_empty()
    }
}
