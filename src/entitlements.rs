//! Invite and share lifecycle: creation, single claim, and per-viewer
//! visibility.
//!
//! Visibility answers are asymmetric. A creator is told why a
//! record is out of reach ("claimed by @bob"), a previous claimer is told it
//! expired, and everyone else gets `NotFound` whether or not the record
//! exists.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{
    parse_iso_duration, validate_username, ClaimOutcome, CoreError, DocumentCatalogPtr,
    Entitlement, EntitlementStorePtr, IdentityStorePtr, Invite, MetricsPtr, RegisterableSource,
    Share, SourceType, UserRef,
};

/// A record the viewer may see, and whether they are the one who claimed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access<E> {
    pub record: E,
    pub is_claimed: bool,
}

/// Body of `POST /shares`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    // ---
    #[serde(default)]
    pub backing_url: String,
    #[serde(default)]
    pub to_username: Option<String>,
    /// ISO-8601 duration such as `P1D` or `PT12H`.
    #[serde(default)]
    pub expire_duration: Option<String>,
}

/// Body of `POST /invites`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub is_admin: bool,
}

/// Decides what `viewer` may see of `record` at `now`.
///
/// The checks run in a fixed order: expiry, then a claim by someone else,
/// then a restriction to another username.
pub fn resolve_access<E: Entitlement>(
    viewer: Option<&UserRef>,
    record: E,
    now: DateTime<Utc>,
) -> Result<Access<E>, CoreError> {
    // ---
    let source = record.source();
    let is_claimer = viewer.is_some_and(|v| source.is_claimed_by(v.id));
    let is_creator = viewer.is_some_and(|v| source.is_created_by(v.id));

    let hidden_unless_creator = |reason: String| {
        if is_creator {
            CoreError::forbidden(reason)
        } else {
            CoreError::NotFound
        }
    };

    if let Some(expires_at) = record.expires_at() {
        if now > expires_at {
            return Err(if is_claimer {
                CoreError::forbidden("expired")
            } else {
                CoreError::NotFound
            });
        }
    }

    match source.claimed_by() {
        Some(by) if !is_claimer => {
            return Err(hidden_unless_creator(format!("claimed by @{}", by.username)));
        }
        Some(_) => {}
        None => {
            if let Some(intended) = record.intended_for() {
                if viewer.map(|v| v.username.as_str()) != Some(intended) {
                    return Err(hidden_unless_creator(format!("intended for @{intended}")));
                }
            }
        }
    }

    Ok(Access {
        record,
        is_claimed: is_claimer,
    })
}

/// Creates, claims and gates invites and shares.
#[derive(Clone)]
pub struct EntitlementEngine {
    // ---
    entitlements: EntitlementStorePtr,
    identities: IdentityStorePtr,
    documents: DocumentCatalogPtr,
    metrics: MetricsPtr,
}

impl EntitlementEngine {
    // ---
    pub fn new(
        entitlements: EntitlementStorePtr,
        identities: IdentityStorePtr,
        documents: DocumentCatalogPtr,
        metrics: MetricsPtr,
    ) -> Self {
        // ---
        Self {
            entitlements,
            identities,
            documents,
            metrics,
        }
    }

    // ========================================================================
    // Invites
    // ========================================================================

    /// Only administrators may hand out invites.
    pub async fn create_invite(&self, by: &UserRef, is_admin: bool) -> Result<Invite, CoreError> {
        // ---
        let creator = self
            .identities
            .find_user_by_id(by.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("invite creator {} no longer exists", by.id))?;
        if !creator.is_admin {
            tracing::warn!("Non-admin '{}' tried to create an invite", creator.username);
            return Err(CoreError::forbidden("only administrators can create invites"));
        }

        let invite = Invite::new(creator.user_ref(), is_admin);
        self.entitlements.insert_invite(&invite).await?;

        tracing::info!(
            "Invite {} created by '{}' (admin: {})",
            invite.source.id,
            creator.username,
            is_admin
        );
        Ok(invite)
    }

    pub async fn find_invite(&self, id: Uuid) -> Result<Invite, CoreError> {
        self.entitlements
            .find_invite(id)
            .await?
            .ok_or(CoreError::NotFound)
    }

    /// Claims an invite for `claimer`. A claimed admin invite makes the
    /// claimer an administrator.
    pub async fn claim_invite(&self, id: Uuid, claimer: &UserRef) -> Result<Invite, CoreError> {
        // ---
        self.claim(SourceType::Invite, id, claimer).await?;
        let invite = self.find_invite(id).await?;

        if invite.source.is_admin {
            let mut user = self
                .identities
                .find_user_by_id(claimer.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("claimer {} no longer exists", claimer.id))?;
            if !user.is_admin {
                user.is_admin = true;
                self.identities.update_user(&user).await?;
                tracing::info!("User '{}' promoted to administrator", user.username);
            }
        }
        Ok(invite)
    }

    /// Visibility check followed by a claim, for the viewer following an
    /// invite link.
    pub async fn accept_invite(
        &self,
        id: Uuid,
        claimer: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Access<Invite>, CoreError> {
        // ---
        let access = resolve_access(Some(claimer), self.find_invite(id).await?, now)?;
        if access.is_claimed {
            return Ok(access);
        }
        Ok(Access {
            record: self.claim_invite(id, claimer).await?,
            is_claimed: true,
        })
    }

    pub async fn view_invite(
        &self,
        id: Uuid,
        viewer: Option<&UserRef>,
        now: DateTime<Utc>,
    ) -> Result<Access<Invite>, CoreError> {
        resolve_access(viewer, self.find_invite(id).await?, now)
    }

    pub async fn invites_created_by(&self, user: &UserRef) -> Result<Vec<Invite>, CoreError> {
        Ok(self.entitlements.invites_created_by(user.id).await?)
    }

    // ========================================================================
    // Shares
    // ========================================================================

    pub async fn create_share(
        &self,
        by: &UserRef,
        request: CreateShareRequest,
    ) -> Result<Share, CoreError> {
        // ---
        let backing_url = request.backing_url.trim();
        if backing_url.is_empty() {
            return Err(CoreError::Validation("backingUrl is required".to_string()));
        }

        let to_username = match request.to_username.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => {
                validate_username(name)?;
                Some(name.to_string())
            }
        };

        let expire_duration = match request.expire_duration.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(parse_iso_duration(text)?),
        };

        let document = self.documents.resolve(backing_url).await?.ok_or_else(|| {
            CoreError::Validation(format!("No document found at {backing_url}"))
        })?;

        let share = Share {
            source: RegisterableSource::new(SourceType::Share, by.clone(), false),
            backing_url: document.backing_url,
            document_title: document.title,
            document_type: document.document_type,
            to_username,
            expire_duration,
        };
        self.entitlements.insert_share(&share).await?;

        tracing::info!(
            "Share {} of {} created by '{}'",
            share.source.id,
            share.backing_url,
            by.username
        );
        Ok(share)
    }

    pub async fn find_share(&self, id: Uuid) -> Result<Share, CoreError> {
        self.entitlements
            .find_share(id)
            .await?
            .ok_or(CoreError::NotFound)
    }

    pub async fn claim_share(&self, id: Uuid, claimer: &UserRef) -> Result<Share, CoreError> {
        // ---
        self.claim(SourceType::Share, id, claimer).await?;
        self.find_share(id).await
    }

    /// Visibility check followed by a claim, for the viewer following a
    /// share link.
    pub async fn accept_share(
        &self,
        id: Uuid,
        claimer: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Access<Share>, CoreError> {
        // ---
        let access = resolve_access(Some(claimer), self.find_share(id).await?, now)?;
        if access.is_claimed {
            return Ok(access);
        }
        Ok(Access {
            record: self.claim_share(id, claimer).await?,
            is_claimed: true,
        })
    }

    pub async fn view_share(
        &self,
        id: Uuid,
        viewer: Option<&UserRef>,
        now: DateTime<Utc>,
    ) -> Result<Access<Share>, CoreError> {
        resolve_access(viewer, self.find_share(id).await?, now)
    }

    /// Shares the user created or claimed, newest first.
    pub async fn shares_for(&self, user: &UserRef) -> Result<Vec<Share>, CoreError> {
        Ok(self.entitlements.shares_for_user(user.id).await?)
    }

    // ---

    async fn claim(
        &self,
        source_type: SourceType,
        id: Uuid,
        claimer: &UserRef,
    ) -> Result<(), CoreError> {
        // ---
        let now = Utc::now();
        let outcome = match source_type {
            SourceType::Invite => self.entitlements.claim_invite(id, claimer, now).await?,
            SourceType::Share => self.entitlements.claim_share(id, claimer, now).await?,
        };

        match outcome {
            ClaimOutcome::Claimed => {
                tracing::info!(
                    "{} {} claimed by '{}'",
                    source_type.as_str(),
                    id,
                    claimer.username
                );
                self.metrics.record_claim(source_type.as_str());
                Ok(())
            }
            ClaimOutcome::AlreadyClaimed => {
                tracing::warn!(
                    "'{}' tried to claim already claimed {} {}",
                    claimer.username,
                    source_type.as_str(),
                    id
                );
                Err(CoreError::AlreadyClaimed)
            }
            ClaimOutcome::NotFound => Err(CoreError::NotFound),
        }
    }
}
