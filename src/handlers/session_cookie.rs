//! Session cookie handling.
//!
//! The cookie carries a random opaque id; the [`SessionState`] it names is
//! kept in the configured [`SessionStore`](crate::session::SessionStore).
//! Handlers take a [`CurrentSession`], hand `&mut session.state` to the core
//! operation, then call [`CurrentSession::finish`] so the state is written
//! back whatever the outcome was.

use anyhow::Result;
use axum::extract::FromRequestParts;
use std::convert::Infallible;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use rand::RngCore;
use uuid::Uuid;

use super::shared_types::ApiError;
use crate::account::SessionContext;
use crate::app_state::AppState;
use crate::config::SessionConfig;
use crate::domain::encode_base64url;
use crate::session::SessionState;

/// The caller's session, loaded from the store.
pub struct CurrentSession {
    // ---
    /// Id of a session that exists in the store.
    id: Option<String>,
    /// The request presented a session cookie, known or not.
    had_cookie: bool,
    /// Signed-in user at load time; a change means the id gets rotated.
    loaded_identity: Option<Uuid>,
    pub state: SessionState,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        app: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // ---
        let cookie = parse_cookie(&parts.headers, &app.session_config().cookie_name);
        let had_cookie = cookie.is_some();

        let (id, mut state) = match cookie {
            Some(id) => match app.sessions().load(&id).await? {
                Some(state) => (Some(id), state),
                None => {
                    tracing::debug!("Unknown or expired session cookie");
                    (None, SessionState::default())
                }
            },
            None => (None, SessionState::default()),
        };

        if let Some(auth) = state.authenticated() {
            if app.identities().find_user_by_id(auth.user.id).await?.is_none() {
                tracing::warn!(
                    "Session user '{}' ({}) no longer exists; signing out",
                    auth.user.username,
                    auth.user.id
                );
                state.forget_identity();
            }
        }

        Ok(Self {
            id,
            had_cookie,
            loaded_identity: state.authenticated().map(|a| a.user.id),
            state,
        })
    }
}

/// The signed-in user and active passkey, if any. Never rejects; the
/// session is read but not written back.
pub struct Viewer(pub Option<SessionContext>);

impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        app: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // ---
        let session = match CurrentSession::from_request_parts(parts, app).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Session could not be loaded: {}", err.0);
                return Ok(Self(None));
            }
        };
        match app.account().authenticate(&session.state).await {
            Ok(context) => Ok(Self(context)),
            Err(err) => {
                tracing::warn!("Signed-in identity could not be refreshed: {err}");
                Ok(Self(None))
            }
        }
    }
}

impl CurrentSession {
    // ---

    /// Persists the session and turns `outcome` into the response, with the
    /// `Set-Cookie` header it needs.
    pub async fn finish(self, app: &AppState, outcome: Result<Response, ApiError>) -> Response {
        // ---
        let mut response = outcome.unwrap_or_else(IntoResponse::into_response);
        match self.persist(app).await {
            Ok(Some(cookie)) => {
                response.headers_mut().append(SET_COOKIE, cookie);
                response
            }
            Ok(None) => response,
            Err(err) => ApiError::from(err).into_response(),
        }
    }

    async fn persist(self, app: &AppState) -> Result<Option<HeaderValue>> {
        // ---
        let config = app.session_config();
        let sessions = app.sessions();

        if self.state.is_empty() {
            if let Some(id) = &self.id {
                sessions.destroy(id).await?;
            }
            if !self.had_cookie {
                return Ok(None);
            }
            return Ok(Some(clear_session_cookie(config)?));
        }

        let signed_in_as = self.state.authenticated().map(|a| a.user.id);
        let rotate = signed_in_as.is_some() && signed_in_as != self.loaded_identity;

        let id = match self.id {
            Some(id) if !rotate => id,
            previous => {
                if let Some(previous) = previous {
                    sessions.destroy(&previous).await?;
                }
                new_session_id()
            }
        };

        sessions.save(&id, &self.state).await?;
        Ok(Some(session_cookie(config, &id)?))
    }
}

/// 32 random bytes, base64url encoded.
fn new_session_id() -> String {
    // ---
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_base64url(bytes)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    // ---
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

fn session_cookie(config: &SessionConfig, id: &str) -> Result<HeaderValue> {
    // ---
    let mut cookie = format!(
        "{}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name,
        config.ttl.as_secs()
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    Ok(HeaderValue::from_str(&cookie)?)
}

fn clear_session_cookie(config: &SessionConfig) -> Result<HeaderValue> {
    // ---
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    Ok(HeaderValue::from_str(&cookie)?)
}

/// Path and query of the request, used as a `returnTo` target.
pub fn current_url(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}
