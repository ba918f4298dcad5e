use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Supabase is not configured")]
    NotConfigured,

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// PostgREST `Prefer` header variants used by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    ReturnRepresentation,
    ReturnMinimal,
    /// Insert-or-merge on the primary key, returning the stored row.
    Upsert,
}

impl Prefer {
    fn header_value(self) -> &'static str {
        match self {
            Prefer::ReturnRepresentation => "return=representation",
            Prefer::ReturnMinimal => "return=minimal",
            Prefer::Upsert => "resolution=merge-duplicates,return=representation",
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, prefer: Option<Prefer>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer.header_value()));
        }

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        prefer: Option<Prefer>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let text = self.send(method, path, body, prefer).await?;
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    /// Issues a request whose response body is not needed.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), DatabaseError> {
        self.send(method, path, body, Some(Prefer::ReturnMinimal)).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        prefer: Option<Prefer>,
    ) -> Result<String, DatabaseError> {
        if self.base_url.is_empty() {
            return Err(DatabaseError::NotConfigured);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url)
            .headers(self.get_headers(prefer)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("API error ({}): {}", status, text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DatabaseError::Auth(text),
                StatusCode::NOT_FOUND => DatabaseError::NotFound(text),
                StatusCode::CONFLICT => DatabaseError::Conflict(text),
                _ => DatabaseError::Api { status: status.as_u16(), body: text },
            });
        }

        Ok(text)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// Builds a PostgREST path such as `/rest/v1/appointments?status=eq.Pending`.
pub fn rest_path(table: &str, filters: &[(&str, String)]) -> String {
    let mut path = format!("/rest/v1/{}", table);
    for (i, (column, condition)) in filters.iter().enumerate() {
        path.push(if i == 0 { '?' } else { '&' });
        path.push_str(column);
        path.push('=');
        path.push_str(&urlencoding::encode(condition));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filtered_paths() {
        let path = rest_path(
            "appointments",
            &[("therapist_username", "eq.drkhan".into()), ("time", "eq.2:00 PM".into())],
        );
        assert_eq!(path, "/rest/v1/appointments?therapist_username=eq.drkhan&time=eq.2%3A00%20PM");
        assert_eq!(rest_path("messages", &[]), "/rest/v1/messages");
    }
}
