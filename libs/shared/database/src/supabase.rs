use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Typed failure modes of the PostgREST layer. `Conflict` carries rejections
/// from unique/exclusion constraints (HTTP 409) so the booking guard can
/// translate them; `Serialization` carries transient snapshot failures
/// (SQLSTATE 40001/40P01) that the write path may retry once.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient serialization failure: {0}")]
    Serialization(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, prefer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }

        if let Some(prefer_value) = prefer {
            headers.insert("Prefer", HeaderValue::from_str(prefer_value).unwrap());
        }

        headers
    }

    fn map_error(status: reqwest::StatusCode, error_text: String) -> DbError {
        match status.as_u16() {
            401 | 403 => DbError::Auth(error_text),
            404 => DbError::NotFound(error_text),
            409 => DbError::Conflict(error_text),
            _ if error_text.contains("\"40001\"")
                || error_text.contains("\"40P01\"")
                || error_text.contains("could not serialize access") =>
            {
                DbError::Serialization(error_text)
            }
            code => DbError::Api {
                status: code,
                message: error_text,
            },
        }
    }

    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token, prefer);

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(Self::map_error(status, error_text));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.send(method, path, auth_token, body, None).await
    }

    /// POST returning the inserted rows (Prefer: return=representation).
    /// Constraint rejections surface as `DbError::Conflict`.
    pub async fn insert<T>(
        &self,
        path: &str,
        auth_token: Option<&str>,
        body: Value,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.send(
            Method::POST,
            path,
            auth_token,
            Some(body),
            Some("return=representation"),
        )
        .await
    }

    /// PATCH returning the updated rows (Prefer: return=representation).
    pub async fn update<T>(
        &self,
        path: &str,
        auth_token: Option<&str>,
        body: Value,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.send(
            Method::PATCH,
            path,
            auth_token,
            Some(body),
            Some("return=representation"),
        )
        .await
    }

    /// Request where the response body is irrelevant (DELETE, bare PATCH).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(), DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token, None);

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(Self::map_error(status, error_text));
        }

        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
