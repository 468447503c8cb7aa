//! Signed-in account management: profile, display name, passkey removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    validate_display_name, CoreError, Credential, CredentialRemoval, IdentityStorePtr, User,
};
use crate::session::{AuthenticatedState, SessionState};

/// A passkey as shown on the account page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeySummary {
    // ---
    pub id: String,
    pub device_type: String,
    pub backed_up: bool,
    pub transports: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<&Credential> for PasskeySummary {
    fn from(c: &Credential) -> Self {
        Self {
            id: c.id.clone(),
            device_type: c.device_type.clone(),
            backed_up: c.backed_up,
            transports: c.transports.clone(),
            created: c.created,
            last_used: c.last_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    // ---
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
    /// The passkey this session signed in with.
    pub active_credential: PasskeySummary,
    pub other_credentials: Vec<PasskeySummary>,
}

/// Body of `PUT /account/profile`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: String,
}

/// Signed-in identity, re-read from the identity store.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: User,
    pub active_credential: Credential,
}

#[derive(Clone)]
pub struct AccountService {
    identities: IdentityStorePtr,
}

impl AccountService {
    // ---
    pub fn new(identities: IdentityStorePtr) -> Self {
        Self { identities }
    }

    /// The session's user and active credential as currently stored.
    ///
    /// `None` when nobody is signed in or either record has since been
    /// deleted.
    pub async fn authenticate(
        &self,
        session: &SessionState,
    ) -> Result<Option<SessionContext>, CoreError> {
        // ---
        let Some(auth) = session.authenticated() else {
            return Ok(None);
        };
        let Some(user) = self.identities.find_user_by_id(auth.user.id).await? else {
            return Ok(None);
        };
        let credential = self
            .identities
            .find_user_credential(user.id, &auth.active_credential)
            .await?;

        Ok(credential.map(|active_credential| SessionContext {
            user,
            active_credential,
        }))
    }

    pub async fn profile(&self, auth: &AuthenticatedState) -> Result<Profile, CoreError> {
        // ---
        let user = self.user(auth).await?;
        let credentials = self.identities.credentials_for_user(user.id).await?;

        let (active, others): (Vec<&Credential>, Vec<&Credential>) = credentials
            .iter()
            .partition(|c| c.id == auth.active_credential);
        let active = active.first().ok_or_else(|| {
            anyhow::anyhow!(
                "active credential {} of '{}' is gone",
                auth.active_credential,
                user.username
            )
        })?;

        Ok(Profile {
            username: user.username,
            display_name: user.display_name,
            is_admin: user.is_admin,
            active_credential: PasskeySummary::from(*active),
            other_credentials: others.into_iter().map(PasskeySummary::from).collect(),
        })
    }

    /// A blank display name falls back to the username.
    pub async fn update_display_name(
        &self,
        auth: &AuthenticatedState,
        display_name: &str,
    ) -> Result<Profile, CoreError> {
        // ---
        let mut user = self.user(auth).await?;
        let display_name = match display_name.trim() {
            "" => user.username.clone(),
            name => name.to_string(),
        };
        validate_display_name(&display_name)?;

        user.display_name = display_name;
        self.identities.update_user(&user).await?;
        tracing::info!("User '{}' changed display name", user.username);

        self.profile(auth).await
    }

    /// Removes one of the caller's passkeys. The passkey the session signed
    /// in with, and the last remaining passkey, are kept.
    pub async fn remove_credential(
        &self,
        auth: &AuthenticatedState,
        credential_id: &str,
    ) -> Result<(), CoreError> {
        // ---
        if credential_id == auth.active_credential {
            return Err(CoreError::Validation(
                "The passkey you signed in with cannot be removed".to_string(),
            ));
        }

        match self
            .identities
            .delete_credential(auth.user.id, credential_id)
            .await?
        {
            CredentialRemoval::Removed => {
                tracing::info!(
                    "User '{}' removed credential {}",
                    auth.user.username,
                    credential_id
                );
                Ok(())
            }
            CredentialRemoval::NotFound => Err(CoreError::NotFound),
            CredentialRemoval::LastCredential => Err(CoreError::Validation(
                "You cannot remove your only passkey".to_string(),
            )),
        }
    }

    async fn user(&self, auth: &AuthenticatedState) -> Result<User, CoreError> {
        // ---
        Ok(self
            .identities
            .find_user_by_id(auth.user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("signed-in user {} no longer exists", auth.user.id))?)
    }
}
