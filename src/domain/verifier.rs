use super::ceremony::{AuthenticationResult, RegistrationResult, UserVerification};
use super::identity::{Credential, RegisteringUser, VerifiedCredential};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A challenge handed to the client plus whatever the verifier needs to check
/// the answer later. `state` is opaque to everything but the verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    /// Random challenge, base64url without padding.
    pub challenge: String,
    pub state: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    // ---
    /// The client's ceremony result did not verify.
    #[error("ceremony rejected: {0}")]
    Rejected(String),

    /// The verifier could not produce or read its own state.
    #[error("verifier failure: {0}")]
    Internal(String),
}

/// Outcome of a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    // ---
    pub counter: u32,
    pub backed_up: bool,
    /// Replacement key material when the verifier tracks state inside it.
    pub public_key: Option<String>,
}

/// Cryptographic verification of WebAuthn ceremonies.
///
/// The orchestrator never inspects signatures or attestation itself; it only
/// calls into this capability after its own state checks pass.
pub trait Verifier: Send + Sync {
    // ---
    /// The user-verification policy enforced when `requested` is asked for,
    /// or `None` when it cannot be honoured. Options sent to the client
    /// advertise the returned policy.
    fn user_verification_for(&self, requested: UserVerification) -> Option<UserVerification> {
        Some(requested)
    }

    fn issue_registration(
        &self,
        user: &RegisteringUser,
        exclude_credentials: &[String],
    ) -> Result<IssuedChallenge, VerifierError>;

    fn verify_registration(
        &self,
        issued: &IssuedChallenge,
        user: &RegisteringUser,
        result: &RegistrationResult,
    ) -> Result<VerifiedCredential, VerifierError>;

    /// An empty `allow_credentials` means a discoverable-credential ceremony.
    fn issue_authentication(
        &self,
        allow_credentials: &[Credential],
    ) -> Result<IssuedChallenge, VerifierError>;

    /// `credential` carries the expected owner and prior signature counter.
    fn verify_authentication(
        &self,
        issued: &IssuedChallenge,
        credential: &Credential,
        result: &AuthenticationResult,
    ) -> Result<VerifiedAssertion, VerifierError>;
}

/// Type alias for any backend that implements Verifier.
pub type VerifierPtr = Arc<dyn Verifier>;
