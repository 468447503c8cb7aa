//! Passkey ceremony orchestration.
//!
//! Drives the two-phase WebAuthn flows:
//! 1. registration - `begin_registration_options` / `complete_registration`
//! 2. authentication - `begin_authentication_options` / `complete_authentication`
//!
//! Each phase reads and writes the caller's [`SessionState`], calls the
//! [`Verifier`](crate::domain::Verifier) only after its own state checks pass,
//! and touches the identity store only after the verifier has answered.

mod authentication;
mod registration;

use chrono::Duration;
use serde::Serialize;

use crate::domain::{
    encode_base64url, CoreError, Credential, IdentityStorePtr, MetricsPtr, UserVerification,
    VerifierError, VerifierPtr,
};
use crate::session::{is_stale, SessionState};

pub use authentication::{AuthenticationOptions, AuthenticationOptionsRequest};
pub use registration::{RegistrationOptions, RegistrationOptionsRequest};

// ---

/// Relying party identity advertised in registration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

/// A credential named in `excludeCredentials` / `allowCredentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialDescriptor {
    // ---
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            kind: "public-key",
            id: credential.id.clone(),
            transports: credential.transports.clone(),
        }
    }
}

/// Runs registration and authentication ceremonies against the injected
/// identity store and verifier.
///
/// Cheap to clone; every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct CeremonyOrchestrator {
    // ---
    identities: IdentityStorePtr,
    verifier: VerifierPtr,
    metrics: MetricsPtr,
    relying_party: RelyingParty,
    challenge_ttl: Duration,
}

impl CeremonyOrchestrator {
    // ---
    pub fn new(
        identities: IdentityStorePtr,
        verifier: VerifierPtr,
        metrics: MetricsPtr,
        relying_party: RelyingParty,
        challenge_ttl: std::time::Duration,
    ) -> Self {
        // ---
        Self {
            identities,
            verifier,
            metrics,
            relying_party,
            challenge_ttl: Duration::from_std(challenge_ttl)
                .unwrap_or_else(|_| Duration::seconds(300)),
        }
    }

    fn is_expired(&self, issued_at: chrono::DateTime<chrono::Utc>) -> bool {
        is_stale(issued_at, self.challenge_ttl, chrono::Utc::now())
    }

    /// The policy the verifier will actually enforce for `requested`.
    fn enforced_user_verification(
        &self,
        requested: UserVerification,
    ) -> Result<UserVerification, CoreError> {
        // ---
        self.verifier
            .user_verification_for(requested)
            .ok_or_else(|| {
                let name = serde_json::to_value(requested)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                CoreError::Validation(format!("Unsupported userVerification: {name}"))
            })
    }
}

/// The WebAuthn user handle for a user id.
pub fn user_handle(user_id: uuid::Uuid) -> String {
    encode_base64url(user_id.as_bytes())
}

/// Failures to *issue* a challenge are ours, not the client's.
fn issue_failure(err: VerifierError) -> CoreError {
    CoreError::Internal(anyhow::anyhow!("verifier could not issue a challenge: {err}"))
}

/// Reads the post-login destination, then signs the session in.
fn sign_in(
    session: &mut SessionState,
    user: &crate::domain::User,
    credential: &Credential,
) -> String {
    // ---
    let return_to = session.return_to();
    session.complete_sign_in(user, credential);
    return_to
}
