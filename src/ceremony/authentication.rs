//! Authentication ceremony: `Idle -> Offered -> Verified | Failed`.
//!
//! Every way a sign-in can fail after the challenge check (unknown
//! credential, credential of another account, bad signature, counter going
//! backwards) surfaces as the same [`CoreError::SignInFailed`]. Only the log
//! says which one it was.

use serde::{Deserialize, Serialize};

use super::{issue_failure, sign_in, user_handle, CeremonyOrchestrator, CredentialDescriptor};
use crate::domain::{
    AuthenticationResult, CoreError, CounterUpdate, Credential, UserVerification,
};
use crate::session::SessionState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /assertion/options`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptionsRequest {
    // ---
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_verification: Option<UserVerification>,
}

/// Parameters for `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    // ---
    pub challenge: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerification,
}

// ============================================================================
// Ceremony
// ============================================================================

impl CeremonyOrchestrator {
    // ---

    /// Issues an authentication challenge and stores it in the session.
    ///
    /// With a username, the challenge is bound to that user and lists their
    /// credentials; without one, the allow-list is empty and the
    /// authenticator picks a discoverable credential.
    pub async fn begin_authentication_options(
        &self,
        session: &mut SessionState,
        request: AuthenticationOptionsRequest,
    ) -> Result<AuthenticationOptions, CoreError> {
        // ---
        if session.authenticated().is_some() {
            return Err(CoreError::AlreadySignedIn);
        }

        let policy =
            self.enforced_user_verification(request.user_verification.unwrap_or_default())?;
        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let (known_user, credentials) = match username {
            Some(name) => {
                let user = self
                    .identities
                    .find_user_by_username(name)
                    .await?
                    .ok_or_else(|| {
                        tracing::warn!("Authentication attempt for non-existent user: {}", name);
                        CoreError::SignInFailed
                    })?;

                let credentials = self.identities.credentials_for_user(user.id).await?;
                if credentials.is_empty() {
                    return Err(anyhow::anyhow!(
                        "user '{}' ({}) has no registered credentials",
                        user.username,
                        user.id
                    )
                    .into());
                }
                (Some(user.user_ref()), credentials)
            }
            None => (None, Vec::new()),
        };

        let issued = self
            .verifier
            .issue_authentication(&credentials)
            .map_err(issue_failure)?;

        let options = AuthenticationOptions {
            challenge: issued.challenge.clone(),
            allow_credentials: credentials.iter().map(CredentialDescriptor::from).collect(),
            user_verification: policy,
        };

        match &known_user {
            Some(user) => tracing::info!("Generated auth challenge for user: {}", user.username),
            None => tracing::info!("Generated discoverable auth challenge"),
        }

        session.begin_authentication(issued, known_user);
        Ok(options)
    }

    /// Verifies the authenticator's assertion and signs the session in.
    ///
    /// The pending authentication is consumed on every call, successful or
    /// not, so a captured assertion cannot be replayed against it. Returns
    /// where the caller should go next.
    pub async fn complete_authentication(
        &self,
        session: &mut SessionState,
        result: AuthenticationResult,
    ) -> Result<String, CoreError> {
        // ---
        let pending = session
            .take_authentication_state()
            .ok_or(CoreError::NoActiveAuthentication)?;

        if self.is_expired(pending.issued_at) {
            tracing::warn!("Authentication challenge expired");
            return Err(CoreError::NoActiveAuthentication);
        }

        result.validate()?;
        let client_data = result.client_data()?;
        if client_data.challenge != pending.challenge() {
            tracing::warn!("Authentication result answers a different challenge");
            return Err(CoreError::NoActiveAuthentication);
        }

        let credential = self
            .identities
            .find_credential(&result.id)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Sign-in with unknown credential {}", result.id);
                self.failed()
            })?;

        if let Some(bound) = &pending.authenticating_user {
            if bound.id != credential.user_id {
                tracing::warn!(
                    "Credential {} of user {} presented for sign-in as '{}' ({})",
                    credential.id,
                    credential.user_id,
                    bound.username,
                    bound.id
                );
                return Err(self.failed());
            }
        }

        if let Some(handle) = result.response.user_handle.as_deref() {
            if !handle.is_empty() && handle != user_handle(credential.user_id) {
                tracing::warn!(
                    "User handle mismatch for credential {} of user {}",
                    credential.id,
                    credential.user_id
                );
                return Err(self.failed());
            }
        }

        let assertion = self
            .verifier
            .verify_authentication(&pending.ceremony, &credential, &result)
            .map_err(|e| {
                tracing::warn!(
                    "Authentication verification failed for user {} (credential {}): {}",
                    credential.user_id,
                    credential.id,
                    e
                );
                self.failed()
            })?;

        // Counters may stay at zero for authenticators that do not keep one,
        // but must never go backwards.
        if assertion.counter < credential.counter {
            tracing::error!(
                "Counter replay attack detected for user {}: stored={}, provided={}",
                credential.user_id,
                credential.counter,
                assertion.counter
            );
            return Err(self.failed());
        }

        let user = self
            .identities
            .find_user_by_id(credential.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("credential {} has no owner", credential.id))?;

        let updated = Credential {
            counter: assertion.counter,
            backed_up: assertion.backed_up,
            public_key: assertion
                .public_key
                .unwrap_or_else(|| credential.public_key.clone()),
            last_used: Some(chrono::Utc::now()),
            ..credential
        };
        if self.identities.update_credential(&updated).await? == CounterUpdate::Stale {
            tracing::error!(
                "Counter of credential {} moved past {} during sign-in of user {}",
                updated.id,
                updated.counter,
                updated.user_id
            );
            return Err(self.failed());
        }

        tracing::info!("User '{}' authenticated successfully", user.username);
        self.metrics.record_ceremony("authentication", "verified");

        Ok(sign_in(session, &user, &updated))
    }

    fn failed(&self) -> CoreError {
        self.metrics.record_ceremony("authentication", "rejected");
        CoreError::SignInFailed
    }
}
