use super::entitlement::{Invite, Share};
use super::identity::{Credential, User, UserRef};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Result of inserting a brand new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInsert {
    Inserted,
    UsernameTaken,
}

/// Result of removing one of a user's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialRemoval {
    Removed,
    NotFound,
    /// Refused: the user would be left without any credential.
    LastCredential,
}

/// Result of recording a credential use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    Updated,
    /// Refused: the stored signature counter is already higher, or the
    /// credential is gone.
    Stale,
}

/// Result of a compare-and-set claim against the "unclaimed" precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
    NotFound,
}

/// Abstraction for user and passkey persistence.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    // ---
    /// Create a user together with its first credential, atomically.
    async fn insert_user_with_credential(
        &self,
        user: &User,
        credential: &Credential,
    ) -> Result<UserInsert>;

    /// Get user by ID.
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Get user by username.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Update the mutable fields of a user (display name, admin flag).
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Save an additional credential for an existing user.
    async fn insert_credential(&self, credential: &Credential) -> Result<()>;

    /// Get a specific credential by its ID.
    async fn find_credential(&self, credential_id: &str) -> Result<Option<Credential>>;

    /// Get a credential only if it belongs to `user_id`.
    async fn find_user_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<Option<Credential>>;

    /// Get all credentials for a user, oldest first.
    async fn credentials_for_user(&self, user_id: Uuid) -> Result<Vec<Credential>>;

    /// Update an existing credential (counter, backup state, last use).
    ///
    /// Applied only while the stored counter is not above the new one, so
    /// the counter never decreases even under concurrent sign-ins.
    async fn update_credential(&self, credential: &Credential) -> Result<CounterUpdate>;

    /// Delete a credential unless it is the user's last one.
    async fn delete_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<CredentialRemoval>;
}

/// Abstraction for invite and share persistence.
#[async_trait::async_trait]
pub trait EntitlementStore: Send + Sync {
    // ---
    async fn insert_invite(&self, invite: &Invite) -> Result<()>;

    async fn find_invite(&self, id: Uuid) -> Result<Option<Invite>>;

    /// Set the claim on an unclaimed invite. Must be a compare-and-set so that
    /// at most one of several concurrent claimers wins.
    async fn claim_invite(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    async fn invites_created_by(&self, user_id: Uuid) -> Result<Vec<Invite>>;

    async fn insert_share(&self, share: &Share) -> Result<()>;

    async fn find_share(&self, id: Uuid) -> Result<Option<Share>>;

    /// Same compare-and-set contract as [`EntitlementStore::claim_invite`].
    async fn claim_share(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// Shares the user created or claimed, newest first.
    async fn shares_for_user(&self, user_id: Uuid) -> Result<Vec<Share>>;
}

/// Type alias for any backend that implements IdentityStore.
pub type IdentityStorePtr = Arc<dyn IdentityStore>;

/// Type alias for any backend that implements EntitlementStore.
pub type EntitlementStorePtr = Arc<dyn EntitlementStore>;
