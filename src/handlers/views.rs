//! JSON shapes of invites and shares as seen by one viewer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{format_iso_duration, Entitlement, Invite, RegisterableSource, Share};
use crate::entitlements::Access;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    // ---
    pub id: Uuid,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
    pub created_by: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    /// Whether the viewer is the one who claimed it.
    pub is_claimed: bool,
}

impl SourceView {
    fn new(source: &RegisterableSource, is_claimed: bool) -> Self {
        Self {
            id: source.id,
            is_admin: source.is_admin,
            created: source.created,
            created_by: source.created_by.username.clone(),
            claimed_at: source.claim.as_ref().map(|c| c.at),
            claimed_by: source.claimed_by().map(|by| by.username.clone()),
            is_claimed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InviteView {
    #[serde(flatten)]
    pub source: SourceView,
}

impl InviteView {
    pub fn new(invite: &Invite, viewer: Option<Uuid>) -> Self {
        let is_claimed = viewer.is_some_and(|id| invite.source.is_claimed_by(id));
        Self {
            source: SourceView::new(&invite.source, is_claimed),
        }
    }
}

impl From<Access<Invite>> for InviteView {
    fn from(access: Access<Invite>) -> Self {
        Self {
            source: SourceView::new(&access.record.source, access.is_claimed),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareView {
    // ---
    #[serde(flatten)]
    pub source: SourceView,
    pub backing_url: String,
    pub document_title: String,
    pub document_type: String,
    pub to_username: Option<String>,
    /// ISO-8601, e.g. `P1D`.
    pub expire_duration: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ShareView {
    pub fn new(share: &Share, viewer: Option<Uuid>) -> Self {
        let is_claimed = viewer.is_some_and(|id| share.source.is_claimed_by(id));
        Self::with_claim(share, is_claimed)
    }

    fn with_claim(share: &Share, is_claimed: bool) -> Self {
        // ---
        Self {
            source: SourceView::new(&share.source, is_claimed),
            backing_url: share.backing_url.clone(),
            document_title: share.document_title.clone(),
            document_type: share.document_type.clone(),
            to_username: share.to_username.clone(),
            expire_duration: share.expire_duration.map(format_iso_duration),
            expires_at: share.expires_at(),
        }
    }
}

impl From<Access<Share>> for ShareView {
    fn from(access: Access<Share>) -> Self {
        Self::with_claim(&access.record, access.is_claimed)
    }
}
