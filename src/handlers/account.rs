//! Signed-in account endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::session_cookie::CurrentSession;
use super::shared_types::{ApiError, ApiOk, Empty};
use crate::account::UpdateProfileRequest;
use crate::app_state::AppState;

const ACCOUNT_PATH: &str = "/account";

/// GET /account
pub async fn get_account(State(state): State<AppState>, session: CurrentSession) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(ACCOUNT_PATH)?;
        let profile = state.account().profile(auth).await?;
        Ok::<_, ApiError>(ApiOk::new(profile).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// PUT /account/profile
pub async fn update_profile(
    State(state): State<AppState>,
    session: CurrentSession,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(ACCOUNT_PATH)?;
        let Json(request) = body?;
        let profile = state
            .account()
            .update_display_name(auth, &request.display_name)
            .await?;
        Ok::<_, ApiError>(ApiOk::new(profile).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// DELETE /account/credentials/{id}
pub async fn delete_credential(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(credential_id): Path<String>,
) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(ACCOUNT_PATH)?;
        state.account().remove_credential(auth, &credential_id).await?;
        Ok::<_, ApiError>(ApiOk::new(Empty {}).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}
