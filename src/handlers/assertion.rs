//! Passkey sign-in endpoints.
//!
//! 1. `assertion_options` - issue a challenge for `navigator.credentials.get()`
//! 2. `assertion_result` - verify the assertion and sign the caller in

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::attestation::ReturnTo;
use super::session_cookie::CurrentSession;
use super::shared_types::{ApiError, ApiOk};
use crate::app_state::AppState;
use crate::ceremony::AuthenticationOptionsRequest;
use crate::domain::AuthenticationResult;

/// POST /assertion/options
///
/// With a `username` the challenge lists that user's passkeys; without one
/// the browser offers any discoverable passkey for this site.
pub async fn assertion_options(
    State(state): State<AppState>,
    mut session: CurrentSession,
    body: Result<Json<AuthenticationOptionsRequest>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let Json(request) = body?;
        let options = state
            .orchestrator()
            .begin_authentication_options(&mut session.state, request)
            .await?;
        Ok::<_, ApiError>(ApiOk::new(options).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /assertion/result
///
/// Failures after the challenge check all answer with the same generic
/// message.
pub async fn assertion_result(
    State(state): State<AppState>,
    mut session: CurrentSession,
    body: Result<Json<AuthenticationResult>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let Json(result) = body?;
        let return_to = state
            .orchestrator()
            .complete_authentication(&mut session.state, result)
            .await?;
        Ok::<_, ApiError>(ApiOk::new(ReturnTo { return_to }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}
