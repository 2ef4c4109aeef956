//! Remote presence API — trait + Microsoft Graph client.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::config::Config;

// ── Error type ──

/// Presence API failures, classified by how the poll loop should react.
#[derive(Debug)]
pub enum ApiError {
    /// The request did not finish within the fetch timeout.
    Timeout(String),
    /// Connection-level failure (DNS, refused, reset, TLS).
    Network(String),
    /// HTTP 429. `retry_after` is the server's hint, if any.
    RateLimited { retry_after: Option<Duration> },
    /// HTTP 5xx.
    Server(u16),
    /// HTTP 401/403: the credential was refused.
    Unauthorized(u16),
    /// Any other non-success status.
    Status(u16),
    /// The body was not the JSON shape we expect.
    Malformed(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Timeout(e) => write!(f, "Presence request timed out: {e}"),
            ApiError::Network(e) => write!(f, "Presence request failed: {e}"),
            ApiError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "Rate limited (retry after {}s)", d.as_secs()),
            ApiError::RateLimited { retry_after: None } => write!(f, "Rate limited"),
            ApiError::Server(s) => write!(f, "Presence service error (HTTP {s})"),
            ApiError::Unauthorized(s) => write!(f, "Credential rejected (HTTP {s})"),
            ApiError::Status(s) => write!(f, "Unexpected presence response (HTTP {s})"),
            ApiError::Malformed(e) => write!(f, "Malformed presence response: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ApiError::Unauthorized(status),
            429 => ApiError::RateLimited { retry_after },
            500..=599 => ApiError::Server(status),
            _ => ApiError::Status(status),
        }
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn map_transport(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else if e.is_decode() {
        ApiError::Malformed(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Parse a `Retry-After` header given in seconds. HTTP-date values are
/// ignored.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ── Domain types ──

/// Presence exactly as the service reports it, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawPresence {
    pub availability: String,
    #[serde(default)]
    pub activity: Option<String>,
}

/// Signed-in user, for the startup greeting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

pub fn parse_presence_body(body: &str) -> Result<RawPresence, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

pub fn parse_profile_body(body: &str) -> Result<UserProfile, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

// ── Trait ──

/// Token-keyed access to the signed-in user's presence and profile.
pub trait PresenceApi {
    fn presence(&self, token: &str) -> Result<RawPresence, ApiError>;
    fn profile(&self, token: &str) -> Result<UserProfile, ApiError>;
}

// ── Graph client ──

/// Microsoft Graph client (`/me/presence`, `/me`).
pub struct GraphClient {
    client: Client,
    base_url: String,
}

impl GraphClient {
    /// Build a client whose requests are bounded by the configured fetch
    /// timeout.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let timeout = config.fetch_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("HTTP client: {e}")))?;
        log::debug!("[presence] request timeout {timeout:?}");
        Ok(GraphClient {
            client,
            base_url: config.graph_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str, token: &str) -> Result<String, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(map_transport)?;
        let status = resp.status();
        log::debug!("[presence] GET {path} -> {status}");
        if !status.is_success() {
            let retry_after = parse_retry_after(
                resp.headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(ApiError::from_status(status.as_u16(), retry_after));
        }
        resp.text().map_err(map_transport)
    }
}

impl PresenceApi for GraphClient {
    fn presence(&self, token: &str) -> Result<RawPresence, ApiError> {
        parse_presence_body(&self.get("/me/presence", token)?)
    }

    fn profile(&self, token: &str) -> Result<UserProfile, ApiError> {
        parse_profile_body(&self.get("/me", token)?)
    }
}
