//! Shared fixtures for unit tests: a deterministic verifier and a harness
//! wiring the ceremony orchestrator to in-memory stores.

use rand::RngCore;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ceremony::{CeremonyOrchestrator, RegistrationOptionsRequest, RelyingParty};
use crate::domain::{
    encode_base64url, AssertionResponse, AttestationResponse, AuthenticationResult, Credential,
    IdentityStorePtr, IssuedChallenge, RegisteringUser, RegistrationResult, User,
    UserVerification, VerifiedAssertion, VerifiedCredential, Verifier, VerifierError,
};
use crate::infrastructure::{create_noop_metrics, MemoryStore};
use crate::session::SessionState;

/// Accepts every well-formed result unless told to reject the next one.
///
/// The signature counter of an assertion is read from `authenticatorData`
/// as a big-endian `u32`.
#[derive(Default)]
pub struct StubVerifier {
    verify_calls: AtomicUsize,
    reject_next: Mutex<Option<String>>,
    /// Behave like webauthn-rs: always require user verification.
    uv_required: bool,
}

impl StubVerifier {
    // ---
    pub fn requiring_user_verification() -> Self {
        Self {
            uv_required: true,
            ..Self::default()
        }
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn reject_next(&self, reason: &str) {
        *self.reject_next.lock().unwrap() = Some(reason.to_string());
    }

    fn verdict(&self) -> Result<(), VerifierError> {
        // ---
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.reject_next.lock().unwrap().take() {
            Some(reason) => Err(VerifierError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn issue() -> IssuedChallenge {
        // ---
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        IssuedChallenge {
            challenge: encode_base64url(bytes),
            state: json!({ "stub": true }),
        }
    }
}

impl Verifier for StubVerifier {
    // ---
    fn user_verification_for(&self, requested: UserVerification) -> Option<UserVerification> {
        match (self.uv_required, requested) {
            (false, policy) => Some(policy),
            (true, UserVerification::Discouraged) => None,
            (true, _) => Some(UserVerification::Required),
        }
    }

    fn issue_registration(
        &self,
        _user: &RegisteringUser,
        _exclude_credentials: &[String],
    ) -> Result<IssuedChallenge, VerifierError> {
        Ok(Self::issue())
    }

    fn verify_registration(
        &self,
        _issued: &IssuedChallenge,
        _user: &RegisteringUser,
        result: &RegistrationResult,
    ) -> Result<VerifiedCredential, VerifierError> {
        // ---
        self.verdict()?;
        Ok(VerifiedCredential {
            id: result.id.clone(),
            public_key: encode_base64url(format!("pk-{}", result.id)),
            counter: 0,
            aaguid: uuid::Uuid::nil(),
            device_type: "singleDevice".to_string(),
            backed_up: false,
            transports: result.response.transports.clone(),
        })
    }

    fn issue_authentication(
        &self,
        _allow_credentials: &[Credential],
    ) -> Result<IssuedChallenge, VerifierError> {
        Ok(Self::issue())
    }

    fn verify_authentication(
        &self,
        _issued: &IssuedChallenge,
        _credential: &Credential,
        result: &AuthenticationResult,
    ) -> Result<VerifiedAssertion, VerifierError> {
        // ---
        self.verdict()?;
        let data = base64::Engine::decode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            &result.response.authenticator_data,
        )
        .map_err(|e| VerifierError::Rejected(e.to_string()))?;
        let counter: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| VerifierError::Rejected("authenticator data too short".into()))?;
        Ok(VerifiedAssertion {
            counter: u32::from_be_bytes(counter),
            backed_up: false,
            public_key: None,
        })
    }
}

/// The credential id a test label stands for.
pub fn cred_id(label: &str) -> String {
    encode_base64url(label)
}

fn client_data(kind: &str, challenge: &str) -> String {
    encode_base64url(
        json!({ "type": kind, "challenge": challenge, "origin": "http://localhost:8080" })
            .to_string(),
    )
}

pub fn registration_result(challenge: &str, label: &str) -> RegistrationResult {
    // ---
    let id = cred_id(label);
    RegistrationResult {
        id: id.clone(),
        raw_id: id,
        kind: Some("public-key".to_string()),
        response: AttestationResponse {
            client_data_json: client_data("webauthn.create", challenge),
            attestation_object: encode_base64url("attestation"),
            transports: vec!["internal".to_string()],
        },
    }
}

pub fn authentication_result(challenge: &str, label: &str, counter: u32) -> AuthenticationResult {
    // ---
    let id = cred_id(label);
    AuthenticationResult {
        id: id.clone(),
        raw_id: id,
        kind: Some("public-key".to_string()),
        response: AssertionResponse {
            client_data_json: client_data("webauthn.get", challenge),
            authenticator_data: encode_base64url(counter.to_be_bytes()),
            signature: "c2ln".to_string(),
            user_handle: None,
        },
    }
}

/// Orchestrator over a fresh in-memory store and the stub verifier.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub identities: IdentityStorePtr,
    pub verifier: Arc<StubVerifier>,
    pub orchestrator: CeremonyOrchestrator,
}

impl Harness {
    // ---
    pub fn new() -> Self {
        Self::build(StubVerifier::default(), Duration::from_secs(300))
    }

    pub fn with_verifier(verifier: StubVerifier) -> Self {
        Self::build(verifier, Duration::from_secs(300))
    }

    /// Challenges expire this long after they were issued.
    pub fn with_challenge_ttl(challenge_ttl: Duration) -> Self {
        Self::build(StubVerifier::default(), challenge_ttl)
    }

    fn build(verifier: StubVerifier, challenge_ttl: Duration) -> Self {
        // ---
        let store = Arc::new(MemoryStore::new());
        let identities: IdentityStorePtr = store.clone();
        let verifier = Arc::new(verifier);
        let orchestrator = CeremonyOrchestrator::new(
            identities.clone(),
            verifier.clone(),
            create_noop_metrics().unwrap(),
            RelyingParty {
                id: "localhost".to_string(),
                name: "Test".to_string(),
            },
            challenge_ttl,
        );
        Self {
            store,
            identities,
            verifier,
            orchestrator,
        }
    }

    /// Registers a new account with one credential and returns its signed-in
    /// session.
    pub async fn register(&self, username: &str, label: &str) -> (User, SessionState) {
        // ---
        let mut session = SessionState::default();
        let options = self
            .orchestrator
            .begin_registration_options(
                &mut session,
                RegistrationOptionsRequest {
                    username: username.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        self.orchestrator
            .complete_registration(&mut session, registration_result(&options.challenge, label))
            .await
            .unwrap();
        let user = self
            .identities
            .find_user_by_username(username)
            .await
            .unwrap()
            .unwrap();
        (user, session)
    }
}
