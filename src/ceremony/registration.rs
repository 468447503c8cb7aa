//! Registration ceremony: `Idle -> Offered -> Verified | Failed`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{issue_failure, sign_in, user_handle, CeremonyOrchestrator, CredentialDescriptor, RelyingParty};
use crate::domain::{
    validate_display_name, validate_username, AttestationConveyance, AuthenticatorSelection,
    CoreError, RegisteringUser, RegistrationResult, User, UserInsert,
};
use crate::session::SessionState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /attestation/options`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptionsRequest {
    // ---
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub authenticator_selection: AuthenticatorSelection,
    #[serde(default)]
    pub attestation: AttestationConveyance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// Parameters for `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    // ---
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationConveyance,
}

// ============================================================================
// Ceremony
// ============================================================================

impl CeremonyOrchestrator {
    // ---

    /// Issues a registration challenge and stores it in the session.
    ///
    /// A signed-in caller is enrolling an additional passkey: the registering
    /// user is the session user and their existing credentials are excluded.
    /// Anyone else is creating a new account, which fails with
    /// [`CoreError::Conflict`] when the username is taken.
    pub async fn begin_registration_options(
        &self,
        session: &mut SessionState,
        request: RegistrationOptionsRequest,
    ) -> Result<RegistrationOptions, CoreError> {
        // ---
        let (registering_user, excluded) = match session.authenticated() {
            Some(auth) => {
                let user = self
                    .identities
                    .find_user_by_id(auth.user.id)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("signed-in user {} no longer exists", auth.user.id)
                    })?;
                let credentials = self.identities.credentials_for_user(user.id).await?;
                (RegisteringUser::from(&user), credentials)
            }
            None => (self.new_account(&request).await?, Vec::new()),
        };

        let mut selection = request.authenticator_selection;
        selection.user_verification = self.enforced_user_verification(selection.user_verification)?;

        let exclude_ids: Vec<String> = excluded.iter().map(|c| c.id.clone()).collect();
        let issued = self
            .verifier
            .issue_registration(&registering_user, &exclude_ids)
            .map_err(issue_failure)?;

        let options = RegistrationOptions {
            challenge: issued.challenge.clone(),
            rp: self.relying_party.clone(),
            user: UserEntity {
                id: user_handle(registering_user.id),
                name: registering_user.username.clone(),
                display_name: registering_user.display_name.clone(),
            },
            exclude_credentials: excluded.iter().map(CredentialDescriptor::from).collect(),
            authenticator_selection: selection,
            attestation: request.attestation,
        };

        tracing::info!(
            "Registration started for user: {} (additional passkey: {})",
            registering_user.username,
            registering_user.existing
        );

        session.begin_registration(registering_user, issued);
        Ok(options)
    }

    /// Verifies the authenticator's attestation and stores the new credential.
    ///
    /// The pending registration is consumed whether or not this succeeds.
    /// Returns where the caller should go next.
    pub async fn complete_registration(
        &self,
        session: &mut SessionState,
        result: RegistrationResult,
    ) -> Result<String, CoreError> {
        // ---
        let pending = session
            .take_registration_state()
            .ok_or(CoreError::NoActiveRegistration)?;

        if self.is_expired(pending.issued_at) {
            tracing::warn!(
                "Registration challenge expired for user: {}",
                pending.registering_user.username
            );
            return Err(CoreError::NoActiveRegistration);
        }

        result.validate()?;
        let client_data = result.client_data()?;
        if client_data.challenge != pending.challenge() {
            tracing::warn!(
                "Registration result for user {} answers a different challenge",
                pending.registering_user.username
            );
            return Err(CoreError::NoActiveRegistration);
        }

        let verified = self
            .verifier
            .verify_registration(&pending.ceremony, &pending.registering_user, &result)
            .map_err(|e| {
                tracing::warn!(
                    "Credential verification failed for user '{}' ({}): {}",
                    pending.registering_user.username,
                    pending.registering_user.id,
                    e
                );
                self.metrics.record_ceremony("registration", "rejected");
                CoreError::RegistrationFailed
            })?;

        if self.identities.find_credential(&verified.id).await?.is_some() {
            tracing::warn!(
                "User '{}' tried to register already known credential {}",
                pending.registering_user.username,
                verified.id
            );
            self.metrics.record_ceremony("registration", "rejected");
            return Err(CoreError::RegistrationFailed);
        }

        let registering = pending.registering_user;
        let (user, credential) = if registering.existing {
            // ---
            let signed_in = session
                .authenticated()
                .map(|auth| auth.user.id)
                .filter(|id| *id == registering.id)
                .ok_or(CoreError::NoActiveRegistration)?;

            let user = self
                .identities
                .find_user_by_id(signed_in)
                .await?
                .ok_or_else(|| anyhow::anyhow!("signed-in user {signed_in} no longer exists"))?;
            let credential = verified.into_credential(user.id);
            self.identities.insert_credential(&credential).await?;
            (user, credential)
        } else {
            // ---
            let user = User {
                id: registering.id,
                created: chrono::Utc::now(),
                username: registering.username,
                display_name: registering.display_name,
                is_admin: false,
            };
            let credential = verified.into_credential(user.id);
            match self
                .identities
                .insert_user_with_credential(&user, &credential)
                .await?
            {
                UserInsert::Inserted => (user, credential),
                UserInsert::UsernameTaken => {
                    tracing::warn!("Username '{}' was taken mid-registration", user.username);
                    return Err(username_taken());
                }
            }
        };

        tracing::info!(
            "Registration completed for user: {} (credential: {})",
            user.username,
            credential.id
        );
        self.metrics.record_ceremony("registration", "verified");

        Ok(sign_in(session, &user, &credential))
    }

    async fn new_account(
        &self,
        request: &RegistrationOptionsRequest,
    ) -> Result<RegisteringUser, CoreError> {
        // ---
        let username = request.username.trim();
        validate_username(username)?;

        // A blank display name falls back to the username.
        let display_name = match request.display_name.trim() {
            "" => username,
            name => name,
        };
        validate_display_name(display_name)?;

        if self
            .identities
            .find_user_by_username(username)
            .await?
            .is_some()
        {
            return Err(username_taken());
        }

        Ok(RegisteringUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            existing: false,
        })
    }
}

fn username_taken() -> CoreError {
    CoreError::Conflict("Username is already taken".to_string())
}
