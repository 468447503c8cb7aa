//! Session state for in-flight ceremonies and signed-in users.
//!
//! Everything here is plain data plus transition methods; loading and saving
//! a [`SessionState`] is done through a [`SessionStore`] at the HTTP boundary.
//! Core operations receive the state as `&mut SessionState` and the boundary
//! persists it once they return.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{
    CoreError, Credential, IssuedChallenge, RegisteringUser, User, UserRef,
};

// ---

/// Redirect target used when nothing was captured before sign-in.
pub const DEFAULT_RETURN_TO: &str = "/";

/// Entry point unauthenticated callers are sent to.
pub const LOGIN_PATH: &str = "/login";

// ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthState {
    pub return_to: String,
}

/// A registration ceremony waiting for the authenticator's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteringState {
    // ---
    pub registering_user: RegisteringUser,
    pub ceremony: IssuedChallenge,
    pub issued_at: DateTime<Utc>,
}

impl RegisteringState {
    pub fn challenge(&self) -> &str {
        &self.ceremony.challenge
    }
}

/// An authentication ceremony waiting for the authenticator's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatingState {
    // ---
    /// Present only when the caller named a resolvable username.
    pub authenticating_user: Option<UserRef>,
    pub ceremony: IssuedChallenge,
    pub issued_at: DateTime<Utc>,
}

impl AuthenticatingState {
    pub fn challenge(&self) -> &str {
        &self.ceremony.challenge
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedState {
    // ---
    pub user: UserRef,
    /// ID of the credential used to sign in.
    pub active_credential: String,
    pub authenticated_at: DateTime<Utc>,
}

/// Everything kept for one session cookie.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    // ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pre_auth: Option<PreAuthState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registering: Option<RegisteringState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authenticating: Option<AuthenticatingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authenticated: Option<AuthenticatedState>,
}

impl SessionState {
    // ---

    /// Records where to send the caller after sign-in.
    ///
    /// Only same-site absolute paths are kept; anything that could leave the
    /// site (`https://…`, `//host`) is ignored.
    pub fn capture_pre_auth_state(&mut self, return_to: Option<&str>) {
        // ---
        if let Some(target) = return_to.filter(|t| is_local_path(t)) {
            self.pre_auth = Some(PreAuthState {
                return_to: target.to_string(),
            });
        }
    }

    /// Stores a registration ceremony; any pending authentication is dropped.
    pub fn begin_registration(
        &mut self,
        registering_user: RegisteringUser,
        ceremony: IssuedChallenge,
    ) {
        // ---
        self.authenticating = None;
        self.registering = Some(RegisteringState {
            registering_user,
            ceremony,
            issued_at: Utc::now(),
        });
    }

    /// Stores an authentication ceremony; any pending registration is dropped.
    pub fn begin_authentication(
        &mut self,
        ceremony: IssuedChallenge,
        known_user: Option<UserRef>,
    ) {
        // ---
        self.registering = None;
        self.authenticating = Some(AuthenticatingState {
            authenticating_user: known_user,
            ceremony,
            issued_at: Utc::now(),
        });
    }

    /// Marks the session signed in and clears every pre-auth leftover.
    pub fn complete_sign_in(&mut self, user: &User, credential: &Credential) {
        // ---
        self.authenticated = Some(AuthenticatedState {
            user: user.user_ref(),
            active_credential: credential.id.clone(),
            authenticated_at: Utc::now(),
        });
        self.registering = None;
        self.authenticating = None;
        self.pre_auth = None;
    }

    pub fn return_to(&self) -> String {
        // ---
        self.pre_auth
            .as_ref()
            .map(|p| p.return_to.clone())
            .unwrap_or_else(|| DEFAULT_RETURN_TO.to_string())
    }

    pub fn registration_state(&self) -> Option<&RegisteringState> {
        self.registering.as_ref()
    }

    pub fn authentication_state(&self) -> Option<&AuthenticatingState> {
        self.authenticating.as_ref()
    }

    /// Removes the pending registration so it can be completed at most once.
    pub fn take_registration_state(&mut self) -> Option<RegisteringState> {
        self.registering.take()
    }

    /// Removes the pending authentication so it can be completed at most once.
    pub fn take_authentication_state(&mut self) -> Option<AuthenticatingState> {
        self.authenticating.take()
    }

    pub fn authenticated(&self) -> Option<&AuthenticatedState> {
        self.authenticated.as_ref()
    }

    /// Drops the signed-in identity, e.g. when its user no longer exists.
    pub fn forget_identity(&mut self) {
        self.authenticated = None;
    }

    /// Destroys everything held for this session.
    pub fn sign_out(&mut self) {
        *self = SessionState::default();
    }

    /// Guard for pages that need a signed-in user.
    ///
    /// # Errors
    /// [`CoreError::Unauthorized`] carrying the login URL, with `current_url`
    /// as its `returnTo` parameter.
    pub fn require_authentication(
        &self,
        current_url: &str,
    ) -> Result<&AuthenticatedState, CoreError> {
        // ---
        self.authenticated
            .as_ref()
            .ok_or_else(|| CoreError::Unauthorized {
                login_url: login_url(current_url),
            })
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionState::default()
    }
}

/// Builds the login URL carrying `return_to` (URL-encoded).
pub fn login_url(return_to: &str) -> String {
    format!("{LOGIN_PATH}?returnTo={}", urlencoding::encode(return_to))
}

/// True when a ceremony issued at `issued_at` is older than `ttl`.
pub fn is_stale(issued_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - issued_at > ttl
}

/// Same-site absolute path, safe to redirect to.
pub fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

// ---

/// Server-side storage of session values, keyed by the opaque cookie value.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    // ---
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()>;

    async fn destroy(&self, session_id: &str) -> Result<()>;

    /// Connectivity check used by `GET /health?mode=full`.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Type alias for any backend that implements SessionStore.
pub type SessionStorePtr = Arc<dyn SessionStore>;
