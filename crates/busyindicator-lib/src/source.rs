//! Presence source — credential-backed presence fetch with failure
//! classification.
//!
//! [`GraphPresenceSource`] owns the current [`Credential`] and turns every
//! fetch into a [`PollResult`] the poll loop can act on without inspecting
//! HTTP details. It never retries on its own, except for the single
//! re-authentication allowed when the API refuses the credential.

use std::time::Duration;

use crate::auth::{AuthError, AuthProvider, Credential};
use crate::graph::{ApiError, PresenceApi, UserProfile};
use crate::presence::PresenceState;

/// Refresh the credential when it has less than this left.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Outcome of one presence fetch.
#[derive(Debug)]
pub enum PollResult {
    /// A presence value to show. Malformed payloads arrive here as `Unknown`.
    Success(PresenceState),
    /// Transient failure; try again later.
    Retryable(ApiError),
    /// No usable credential; the loop cannot continue.
    Fatal(AuthError),
}

/// Anything that can produce one [`PollResult`] per call.
pub trait PresenceSource {
    fn fetch_presence(&mut self) -> PollResult;
}

impl<T: PresenceSource + ?Sized> PresenceSource for Box<T> {
    fn fetch_presence(&mut self) -> PollResult {
        (**self).fetch_presence()
    }
}

/// Presence source backed by an [`AuthProvider`] and a [`PresenceApi`].
pub struct GraphPresenceSource<A: AuthProvider, P: PresenceApi> {
    auth: A,
    api: P,
    credential: Option<Credential>,
    refresh_margin: Duration,
}

impl<A: AuthProvider, P: PresenceApi> GraphPresenceSource<A, P> {
    pub fn new(auth: A, api: P) -> Self {
        GraphPresenceSource {
            auth,
            api,
            credential: None,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn api(&self) -> &P {
        &self.api
    }

    /// Current credential, if one has been obtained.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Token that is good for at least the refresh margin, obtaining a new
    /// credential if needed.
    fn valid_token(&mut self) -> Result<String, AuthError> {
        if let Some(c) = &self.credential
            && c.is_usable(self.refresh_margin)
        {
            return Ok(c.token().to_string());
        }
        if self.credential.is_some() {
            log::info!("[auth] access token expiring, renewing");
        }
        self.credential = None;
        let fresh = self.auth.access_token()?;
        let token = fresh.token().to_string();
        self.credential = Some(fresh);
        Ok(token)
    }

    /// Obtain a credential up front (startup sign-in).
    pub fn sign_in(&mut self) -> Result<(), AuthError> {
        self.valid_token().map(|_| ())
    }

    /// Fetch the signed-in user's profile.
    pub fn profile(&mut self) -> crate::error::Result<UserProfile> {
        let token = self.valid_token()?;
        Ok(self.api.profile(&token)?)
    }

    /// Renewal that never reached the identity platform is retried; anything
    /// the platform itself refused ends the loop.
    fn auth_failure(error: AuthError) -> PollResult {
        match error {
            AuthError::Request(e) => {
                log::warn!("[auth] token renewal failed, will retry: {e}");
                PollResult::Retryable(ApiError::Network(e))
            }
            other => PollResult::Fatal(other),
        }
    }

    fn classify(error: ApiError) -> PollResult {
        match error {
            ApiError::Malformed(e) => {
                log::warn!("[presence] malformed response, showing unknown: {e}");
                PollResult::Success(PresenceState::Unknown)
            }
            ApiError::Status(s) => {
                log::warn!("[presence] unexpected HTTP {s}, will retry");
                PollResult::Retryable(ApiError::Status(s))
            }
            ApiError::Unauthorized(s) => PollResult::Fatal(AuthError::CredentialRejected(s)),
            other => PollResult::Retryable(other),
        }
    }
}

impl<A: AuthProvider, P: PresenceApi> PresenceSource for GraphPresenceSource<A, P> {
    fn fetch_presence(&mut self) -> PollResult {
        let token = match self.valid_token() {
            Ok(t) => t,
            Err(e) => return Self::auth_failure(e),
        };

        match self.api.presence(&token) {
            Ok(raw) => PollResult::Success(PresenceState::from_availability(&raw.availability)),
            Err(ApiError::Unauthorized(status)) => {
                log::warn!("[auth] presence API refused the token (HTTP {status}), signing in again");
                self.credential = None;
                let token = match self.valid_token() {
                    Ok(t) => t,
                    Err(e) => return Self::auth_failure(e),
                };
                match self.api.presence(&token) {
                    Ok(raw) => {
                        PollResult::Success(PresenceState::from_availability(&raw.availability))
                    }
                    Err(e) => Self::classify(e),
                }
            }
            Err(e) => Self::classify(e),
        }
    }
}

// ── Test doubles ──

/// Scripted sources and APIs for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::graph::RawPresence;
    use crate::poll::StopSignal;

    /// One scripted fetch.
    pub enum Step {
        Result(PollResult),
        /// Sleep, then return the result (simulates a slow request).
        Slow(Duration, PollResult),
        /// Trigger `stop` during the fetch, then return the result.
        StopDuring(StopSignal, PollResult),
    }

    /// Replays a fixed list of results; returns `Success(Unknown)` once the
    /// script runs out.
    pub struct ScriptedSource {
        steps: VecDeque<Step>,
        pub calls: usize,
    }

    impl ScriptedSource {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            ScriptedSource {
                steps: steps.into_iter().collect(),
                calls: 0,
            }
        }

        pub fn results(results: impl IntoIterator<Item = PollResult>) -> Self {
            Self::new(results.into_iter().map(Step::Result))
        }

        pub fn remaining(&self) -> usize {
            self.steps.len()
        }
    }

    impl PresenceSource for ScriptedSource {
        fn fetch_presence(&mut self) -> PollResult {
            self.calls += 1;
            match self.steps.pop_front() {
                Some(Step::Result(r)) => r,
                Some(Step::Slow(d, r)) => {
                    std::thread::sleep(d);
                    r
                }
                Some(Step::StopDuring(stop, r)) => {
                    stop.stop();
                    r
                }
                None => PollResult::Success(PresenceState::Unknown),
            }
        }
    }

    /// Presence API answering from a queue; records the tokens it saw.
    #[derive(Default)]
    pub struct MockApi {
        pub responses: RefCell<VecDeque<Result<RawPresence, ApiError>>>,
        pub tokens: RefCell<Vec<String>>,
    }

    impl MockApi {
        pub fn new(responses: impl IntoIterator<Item = Result<RawPresence, ApiError>>) -> Self {
            MockApi {
                responses: RefCell::new(responses.into_iter().collect()),
                tokens: RefCell::new(Vec::new()),
            }
        }

        pub fn availability(value: &str) -> Result<RawPresence, ApiError> {
            Ok(RawPresence {
                availability: value.to_string(),
                activity: None,
            })
        }
    }

    impl PresenceApi for MockApi {
        fn presence(&self, token: &str) -> Result<RawPresence, ApiError> {
            self.tokens.borrow_mut().push(token.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("mock: script exhausted".into())))
        }

        fn profile(&self, token: &str) -> Result<UserProfile, ApiError> {
            self.tokens.borrow_mut().push(token.to_string());
            Ok(UserProfile {
                display_name: "Test User".into(),
                user_principal_name: None,
            })
        }
    }
}
