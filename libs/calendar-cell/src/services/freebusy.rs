use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use reqwest::Client;
use tracing::debug;

use shared_config::AppConfig;
use shared_models::scheduling::{BusyInterval, BusySource};

use crate::models::{AdapterError, FreeBusyRequest, FreeBusyResponse};

/// Third-party calendar collaborator. Returns the busy windows of one
/// calendar for one day as wall-clock intervals in the clinic timezone.
#[async_trait]
pub trait ExternalCalendarAdapter: Send + Sync {
    async fn get_external_busy_intervals(
        &self,
        calendar_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AdapterError>;
}

/// HTTP free/busy adapter. Base URL, token and timeout come from injected
/// configuration; handlers never see provider identity.
pub struct HttpCalendarAdapter {
    client: Client,
    base_url: String,
    api_token: String,
    timezone: Tz,
}

impl HttpCalendarAdapter {
    pub fn new(config: &AppConfig) -> Result<Self, AdapterError> {
        let timezone: Tz = config
            .clinic_timezone
            .parse()
            .map_err(|_| {
                AdapterError::Configuration(format!(
                    "unknown timezone: {}",
                    config.clinic_timezone
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.calendar_timeout_seconds))
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.calendar_api_base_url.clone(),
            api_token: config.calendar_api_token.clone(),
            timezone,
        })
    }

    /// Map one provider window onto the requested day, clipping ranges that
    /// start before or end after it. Windows that do not touch the day are
    /// dropped.
    fn window_to_interval(
        &self,
        start: &str,
        end: &str,
        date: NaiveDate,
    ) -> Result<Option<BusyInterval>, AdapterError> {
        let start_local = DateTime::parse_from_rfc3339(start)
            .map_err(|e| AdapterError::InvalidResponse(format!("bad start '{}': {}", start, e)))?
            .with_timezone(&self.timezone);
        let end_local = DateTime::parse_from_rfc3339(end)
            .map_err(|e| AdapterError::InvalidResponse(format!("bad end '{}': {}", end, e)))?
            .with_timezone(&self.timezone);

        if end_local.date_naive() < date || start_local.date_naive() > date {
            return Ok(None);
        }

        let day_start = NaiveTime::MIN;
        let day_end = NaiveTime::from_hms_opt(23, 59, 59).unwrap();

        let start_time = if start_local.date_naive() < date {
            day_start
        } else {
            start_local.time()
        };
        let end_time = if end_local.date_naive() > date {
            day_end
        } else {
            end_local.time()
        };

        if start_time >= end_time {
            return Ok(None);
        }

        Ok(Some(BusyInterval::new(
            start_time,
            end_time,
            BusySource::ExternalCalendar,
        )))
    }
}

#[async_trait]
impl ExternalCalendarAdapter for HttpCalendarAdapter {
    async fn get_external_busy_intervals(
        &self,
        calendar_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AdapterError> {
        if self.base_url.is_empty() || calendar_id.is_empty() {
            return Err(AdapterError::NotConfigured);
        }

        let url = format!("{}/freeBusy", self.base_url);
        debug!("Querying external calendar {} for {}", calendar_id, date);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&FreeBusyRequest {
                calendar_id: calendar_id.to_string(),
                date,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout
                } else {
                    AdapterError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let free_busy: FreeBusyResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        let mut intervals = Vec::with_capacity(free_busy.busy.len());
        for window in &free_busy.busy {
            if let Some(interval) = self.window_to_interval(&window.start, &window.end, date)? {
                intervals.push(interval);
            }
        }

        debug!(
            "External calendar returned {} busy intervals for {}",
            intervals.len(),
            date
        );
        Ok(intervals)
    }
}
