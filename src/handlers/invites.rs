//! Invite endpoints.
//!
//! Listing and creating need a signed-in administrator; anyone may look at an
//! invite link, and claiming it sends anonymous callers to sign in first.

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::session_cookie::{current_url, CurrentSession};
use super::shared_types::{found, ApiError, ApiOk};
use super::views::InviteView;
use crate::app_state::AppState;
use crate::domain::CoreError;
use crate::entitlements::CreateInviteRequest;

const INVITES_PATH: &str = "/invites";

/// Where a freshly claimed invite sends its claimer.
const AFTER_INVITE_CLAIM: &str = "/account";

#[derive(Debug, Serialize)]
pub struct InviteList {
    invites: Vec<InviteView>,
}

#[derive(Debug, Serialize)]
pub struct InviteCreated {
    invite: InviteView,
}

/// Optional body of `POST /invites/{id}` and `POST /shares/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: Option<String>,
}

/// Parses a JSON body that may be left out entirely.
pub fn optional_json<T>(body: &Bytes) -> Result<T, CoreError>
where
    T: serde::de::DeserializeOwned + Default,
{
    // ---
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| CoreError::Validation(format!("Invalid request body: {e}")))
}

/// Only `claim` is supported, and it is also the default.
pub fn require_claim_action(body: &Bytes) -> Result<(), CoreError> {
    // ---
    let request: ActionRequest = optional_json(body)?;
    match request.action.as_deref() {
        None | Some("claim") => Ok(()),
        Some(other) => Err(CoreError::Validation(format!("Unsupported action: {other}"))),
    }
}

/// Ids that do not parse are reported like ids that do not exist.
pub fn parse_id(id: &str) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(id).map_err(|_| CoreError::NotFound)
}

/// GET /invites
pub async fn list_invites(State(state): State<AppState>, session: CurrentSession) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(INVITES_PATH)?;
        let invites = state.entitlements().invites_created_by(&auth.user).await?;
        let invites = invites
            .iter()
            .map(|invite| InviteView::new(invite, Some(auth.user.id)))
            .collect();
        Ok::<_, ApiError>(ApiOk::new(InviteList { invites }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /invites
pub async fn create_invite(
    State(state): State<AppState>,
    session: CurrentSession,
    body: Bytes,
) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(INVITES_PATH)?;
        let request: CreateInviteRequest = optional_json(&body)?;
        let invite = state
            .entitlements()
            .create_invite(&auth.user, request.is_admin)
            .await?;
        let invite = InviteView::new(&invite, Some(auth.user.id));
        Ok::<_, ApiError>(ApiOk::new(InviteCreated { invite }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// GET /invites/{id}
pub async fn get_invite(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Response {
    // ---
    let outcome = async {
        let id = parse_id(&id)?;
        let viewer = session.state.authenticated().map(|auth| &auth.user);
        let access = state.entitlements().view_invite(id, viewer, Utc::now()).await?;
        Ok::<_, ApiError>(ApiOk::new(InviteView::from(access)).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /invites/{id}
///
/// Claims the invite for the signed-in caller, then redirects.
pub async fn claim_invite(
    State(state): State<AppState>,
    session: CurrentSession,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(&current_url(&uri))?;
        require_claim_action(&body)?;
        let id = parse_id(&id)?;
        state
            .entitlements()
            .accept_invite(id, &auth.user, Utc::now())
            .await?;
        Ok::<_, ApiError>(found(AFTER_INVITE_CLAIM))
    }
    .await;

    session.finish(&state, outcome).await
}
