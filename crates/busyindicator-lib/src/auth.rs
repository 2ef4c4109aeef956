//! Access credentials and the OAuth 2.0 device-code provider.
//!
//! [`AuthProvider`] is the seam the presence source talks to. The shipped
//! implementation, [`DeviceCodeAuth`], signs the user in once through the
//! Microsoft identity platform device-code flow and afterwards renews the
//! access token with the in-memory refresh token.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::poll::StopSignal;

/// Timeout for identity platform requests. These are rare (startup and
/// expiry) so they get a longer budget than presence polls.
const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Added to the polling interval when the server answers `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Polling interval used when the device-code response omits one.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on any server-supplied lifetime (token or device code).
const MAX_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

// ── Credential ──

/// Bearer token plus the instant it stops being valid.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Credential {
            token: token.into(),
            expires_at: Instant::now() + lifetime.min(MAX_LIFETIME),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Whether the token is still good for at least `margin`.
    pub fn is_usable(&self, margin: Duration) -> bool {
        self.remaining() > margin
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("remaining", &self.remaining())
            .finish()
    }
}

// ── Error type ──

/// Failures obtaining or refreshing a credential.
#[derive(Debug)]
pub enum AuthError {
    /// Transport failure talking to the identity platform.
    Request(String),
    /// The identity platform returned an OAuth error.
    Rejected { code: String, description: String },
    /// The user declined the sign-in request.
    Declined,
    /// The device code expired before sign-in completed.
    Expired,
    /// The presence API rejected a freshly issued token (HTTP status).
    CredentialRejected(u16),
    /// Unparseable identity platform response.
    Malformed(String),
    /// Stop was requested while waiting for the user to sign in.
    Cancelled,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Request(e) => write!(f, "Sign-in request failed: {e}"),
            AuthError::Rejected { code, description } => {
                write!(f, "Sign-in rejected ({code}): {description}")
            }
            AuthError::Declined => write!(f, "Sign-in was declined"),
            AuthError::Expired => write!(f, "Sign-in code expired before it was used"),
            AuthError::CredentialRejected(status) => {
                write!(f, "Access token rejected by the presence API (HTTP {status})")
            }
            AuthError::Malformed(e) => write!(f, "Unexpected sign-in response: {e}"),
            AuthError::Cancelled => write!(f, "Sign-in cancelled"),
        }
    }
}

impl std::error::Error for AuthError {}

// ── Trait ──

/// Source of access credentials.
///
/// Implementations may block for a long time (an interactive sign-in can
/// take tens of seconds); callers should only ask when their current
/// credential is missing, expiring, or rejected.
pub trait AuthProvider {
    fn access_token(&mut self) -> Result<Credential, AuthError>;
}

impl<F> AuthProvider for F
where
    F: FnMut() -> Result<Credential, AuthError>,
{
    fn access_token(&mut self) -> Result<Credential, AuthError> {
        self()
    }
}

// ── Wire types ──

/// What the user needs to complete sign-in on another device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodePrompt {
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl DeviceCodePrompt {
    /// Server-provided instructions, or a fallback built from the code.
    pub fn instructions(&self) -> String {
        match &self.message {
            Some(m) if !m.trim().is_empty() => m.clone(),
            _ => format!(
                "To sign in, open {} and enter the code {}",
                self.verification_uri, self.user_code
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(flatten)]
    prompt: DeviceCodePrompt,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Outcome of one token-endpoint call.
#[derive(Debug)]
enum TokenPoll {
    Granted(TokenResponse),
    Pending,
    SlowDown,
    Failed(AuthError),
}

/// Classify a token-endpoint reply.
///
/// Only an OAuth error body counts as a refusal. Server errors, throttling
/// and non-JSON bodies (proxies, gateways) are transport failures, so the
/// caller keeps its refresh token and tries again later.
fn classify_token_response(status: u16, body: &str) -> TokenPoll {
    if (200..300).contains(&status) {
        return match serde_json::from_str::<TokenResponse>(body) {
            Ok(t) => TokenPoll::Granted(t),
            Err(e) => TokenPoll::Failed(AuthError::Malformed(format!("token response: {e}"))),
        };
    }
    if status == 429 || status >= 500 {
        return TokenPoll::Failed(AuthError::Request(format!(
            "identity platform returned HTTP {status}"
        )));
    }
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match err.error.as_str() {
            "authorization_pending" => TokenPoll::Pending,
            "slow_down" => TokenPoll::SlowDown,
            "authorization_declined" | "access_denied" => TokenPoll::Failed(AuthError::Declined),
            "expired_token" => TokenPoll::Failed(AuthError::Expired),
            _ => TokenPoll::Failed(AuthError::Rejected {
                description: err.error_description.unwrap_or_default(),
                code: err.error,
            }),
        },
        Err(_) => TokenPoll::Failed(AuthError::Request(format!(
            "HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        ))),
    }
}

/// `scope` form value: configured scopes plus `offline_access` so the
/// server issues a refresh token.
fn scope_param(scopes: &[String]) -> String {
    let mut scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
    if !scopes.iter().any(|s| s.eq_ignore_ascii_case("offline_access")) {
        scopes.push("offline_access");
    }
    scopes.join(" ")
}

// ── Device-code provider ──

type PromptFn = Box<dyn Fn(&DeviceCodePrompt) + Send>;

/// OAuth 2.0 device authorization grant against the Microsoft identity
/// platform, with refresh-token renewal.
pub struct DeviceCodeAuth {
    client: Client,
    device_code_url: String,
    token_url: String,
    client_id: String,
    scope: String,
    refresh_token: Option<String>,
    prompt: PromptFn,
    stop: StopSignal,
}

impl DeviceCodeAuth {
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(AUTH_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Request(format!("HTTP client: {e}")))?;
        let base = format!(
            "{}/{}/oauth2/v2.0",
            config.authority.trim_end_matches('/'),
            config.tenant.trim()
        );
        Ok(DeviceCodeAuth {
            client,
            device_code_url: format!("{base}/devicecode"),
            token_url: format!("{base}/token"),
            client_id: config.app_id.trim().to_string(),
            scope: scope_param(&config.scope_list()),
            refresh_token: None,
            prompt: Box::new(|p| log::warn!("[auth] {}", p.instructions())),
            stop: StopSignal::new(),
        })
    }

    /// Replace how sign-in instructions are shown to the user.
    pub fn with_prompt(mut self, prompt: impl Fn(&DeviceCodePrompt) + Send + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    /// Abandon a pending device-code sign-in once `stop` is raised.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<(u16, String), AuthError> {
        let resp = self
            .client
            .post(url)
            .form(form)
            .send()
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| AuthError::Request(format!("reading response: {e}")))?;
        Ok((status, body))
    }

    fn accept(&mut self, token: TokenResponse) -> Credential {
        if token.refresh_token.is_some() {
            self.refresh_token = token.refresh_token;
        }
        log::info!("[auth] access token valid for {}s", token.expires_in);
        Credential::new(token.access_token, Duration::from_secs(token.expires_in))
    }

    fn refresh(&mut self, refresh_token: &str) -> Result<Credential, AuthError> {
        log::debug!("[auth] refreshing access token");
        let (status, body) = self.post_form(
            &self.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("refresh_token", refresh_token),
                ("scope", &self.scope),
            ],
        )?;
        match classify_token_response(status, &body) {
            TokenPoll::Granted(t) => Ok(self.accept(t)),
            TokenPoll::Failed(e) => Err(e),
            TokenPoll::Pending | TokenPoll::SlowDown => Err(AuthError::Malformed(
                "refresh grant answered with a device-code status".into(),
            )),
        }
    }

    fn device_code_flow(&mut self) -> Result<Credential, AuthError> {
        let (status, body) = self.post_form(
            &self.device_code_url,
            &[("client_id", &self.client_id), ("scope", &self.scope)],
        )?;
        if !(200..300).contains(&status) {
            return match classify_token_response(status, &body) {
                TokenPoll::Failed(e) => Err(e),
                _ => Err(AuthError::Malformed(format!(
                    "device code request returned HTTP {status}"
                ))),
            };
        }
        let code: DeviceCodeResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Malformed(format!("device code response: {e}")))?;

        (self.prompt)(&code.prompt);

        let deadline = Instant::now() + Duration::from_secs(code.expires_in).min(MAX_LIFETIME);
        let mut interval = code
            .interval
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        loop {
            if self.stop.wait(interval) {
                log::info!("[auth] sign-in cancelled");
                return Err(AuthError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(AuthError::Expired);
            }
            let (status, body) = self.post_form(
                &self.token_url,
                &[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                    ("client_id", &self.client_id),
                    ("device_code", &code.device_code),
                ],
            )?;
            match classify_token_response(status, &body) {
                TokenPoll::Granted(t) => return Ok(self.accept(t)),
                TokenPoll::Pending => {}
                TokenPoll::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    log::debug!("[auth] server asked to slow down, polling every {interval:?}");
                }
                TokenPoll::Failed(e) => return Err(e),
            }
        }
    }
}

impl AuthProvider for DeviceCodeAuth {
    /// Renew with the refresh token when one is held. A refresh the server
    /// rejects falls back to a new device-code sign-in; a transport failure
    /// is returned as is.
    fn access_token(&mut self) -> Result<Credential, AuthError> {
        if let Some(refresh_token) = self.refresh_token.take() {
            match self.refresh(&refresh_token) {
                Ok(credential) => return Ok(credential),
                Err(AuthError::Rejected { code, description }) => {
                    log::warn!("[auth] refresh rejected ({code}: {description}), signing in again");
                }
                Err(e) => {
                    self.refresh_token = Some(refresh_token);
                    return Err(e);
                }
            }
        }
        self.device_code_flow()
    }
}
