//! Entry points around the ceremonies: the login and register pages, which
//! remember where to go afterwards, and sign-out.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::session_cookie::CurrentSession;
use super::shared_types::{found, ApiError, ApiOk, Empty};
use crate::app_state::AppState;
use crate::session::{is_local_path, DEFAULT_RETURN_TO};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnToQuery {
    return_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthPage {
    page: &'static str,
    return_to: String,
}

async fn auth_page(
    page: &'static str,
    state: AppState,
    mut session: CurrentSession,
    query: ReturnToQuery,
) -> Response {
    // ---
    if session.state.authenticated().is_some() {
        let target = query
            .return_to
            .filter(|t| is_local_path(t))
            .unwrap_or_else(|| DEFAULT_RETURN_TO.to_string());
        return session.finish(&state, Ok(found(&target))).await;
    }

    session.state.capture_pre_auth_state(query.return_to.as_deref());
    let body = AuthPage {
        page,
        return_to: session.state.return_to(),
    };
    session
        .finish(&state, Ok(ApiOk::new(body).into_response()))
        .await
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    session: CurrentSession,
    Query(query): Query<ReturnToQuery>,
) -> Response {
    auth_page("login", state, session, query).await
}

/// GET /register
pub async fn register_page(
    State(state): State<AppState>,
    session: CurrentSession,
    Query(query): Query<ReturnToQuery>,
) -> Response {
    auth_page("register", state, session, query).await
}

/// POST /signout
pub async fn sign_out(State(state): State<AppState>, mut session: CurrentSession) -> Response {
    // ---
    if let Some(auth) = session.state.authenticated() {
        tracing::info!("User '{}' signed out", auth.user.username);
    }
    session.state.sign_out();
    session
        .finish(&state, Ok::<_, ApiError>(ApiOk::new(Empty {}).into_response()))
        .await
}
