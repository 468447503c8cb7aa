//! Share endpoints.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::invites::{parse_id, require_claim_action};
use super::session_cookie::{current_url, CurrentSession};
use super::shared_types::{found, ApiError, ApiOk};
use super::views::ShareView;
use crate::app_state::AppState;
use crate::entitlements::CreateShareRequest;

const SHARES_PATH: &str = "/shares";

#[derive(Debug, Serialize)]
pub struct ShareList {
    shares: Vec<ShareView>,
}

#[derive(Debug, Serialize)]
pub struct ShareCreated {
    share: ShareView,
}

/// GET /shares
///
/// Shares the caller created or claimed, newest first.
pub async fn list_shares(State(state): State<AppState>, session: CurrentSession) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(SHARES_PATH)?;
        let shares = state.entitlements().shares_for(&auth.user).await?;
        let shares = shares
            .iter()
            .map(|share| ShareView::new(share, Some(auth.user.id)))
            .collect();
        Ok::<_, ApiError>(ApiOk::new(ShareList { shares }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /shares
pub async fn create_share(
    State(state): State<AppState>,
    session: CurrentSession,
    body: Result<Json<CreateShareRequest>, JsonRejection>,
) -> Response {
    // ---
    let outcome = async {
        let auth = session.state.require_authentication(SHARES_PATH)?;
        let Json(request) = body?;
        let share = state.entitlements().create_share(&auth.user, request).await?;
        let share = ShareView::new(&share, Some(auth.user.id));
        Ok::<_, ApiError>(ApiOk::new(ShareCreated { share }).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// GET /shares/{id}
pub async fn get_share(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Response {
    // ---
    let outcome = async {
        let id = parse_id(&id)?;
        let viewer = session.state.authenticated().map(|auth| &auth.user);
        let access = state.entitlements().view_share(id, viewer, Utc::now()).await?;
        Ok::<_, ApiError>(ApiOk::new(ShareView::from(access)).into_response())
    }
    .await;

    session.finish(&state, outcome).await
}

/// POST /shares/{id}
///
/// Claims the share for the signed-in caller and redirects to the listing.
pub async fn claim_share(
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
            .accept_share(id, &auth.user, Utc::now())
            .await?;
        Ok::<_, ApiError>(found(SHARES_PATH))
    }
    .await;

    session.finish(&state, outcome).await
}
