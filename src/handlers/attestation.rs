//! Passkey registration endpoints.
//!
//! 1. `attestation_options` - issue a challenge for `navigator.credentials.create()`
//! 2. `attestation_result` - verify the attestation and sign the caller in

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::session_cookie::CurrentSession;
use super::shared_types::{ApiError, ApiOk};
use crate::app_state::AppState;
use crate::ceremony::RegistrationOptionsRequest;
use crate::domain::RegistrationResult;

/// Where the client should navigate after a completed ceremony.
#[derive(Debug, Serialize)]
pub struct ReturnTo {
    pub return_to: String,
}

/// POST /attestation/options
///
/// Anonymous callers register a new account under `username`; a signed-in
/// caller adds another passkey to their own account.
pub async fn attestation_options(
    State(state): State<AppState>,
    mut session: CurrentSession,
    body: Result<Json<RegistrationOptionsRequest>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let Json(request) = body?;
        let options = state
            .orchestrator()
            .begin_registration_options(&mut session.state, request)
            .await?;
        Ok::<_, ApiError>(ApiOk::new(options).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /attestation/result
pub async fn attestation_result(
    State(state): State<AppState>,
    mut session: CurrentSession,
    body: Result<Json<RegistrationResult>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let Json(result) = body?;
        let return_to = state
            .orchestrator()
            .complete_registration(&mut session.state, result)
            .await?;
        Ok::<_, ApiError>(ApiOk::new(ReturnTo { return_to }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}
