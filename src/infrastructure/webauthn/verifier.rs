//! [`Verifier`] backed by `webauthn-rs`.
//!
//! webauthn-rs generates its own challenges and keeps the expected values in
//! a ceremony state object. That object is serialized into
//! [`IssuedChallenge::state`] and travels in the session until the result
//! comes back. Stored credentials carry the full `Passkey` as base64url JSON
//! in `public_key`, because webauthn-rs needs more than the raw COSE key to
//! verify an assertion.
//!
//! The passkey ceremonies of webauthn-rs always require user verification,
//! so `preferred` is advertised as `required` and `discouraged` is refused.
//! Attestation is not requested, which leaves no authenticator AAGUID to
//! record; credentials are stored with the nil AAGUID.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use webauthn_rs::prelude::{
    CredentialID, DiscoverableAuthentication, DiscoverableKey, Passkey, PasskeyAuthentication,
    PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential, Webauthn,
};

use crate::domain::{
    encode_base64url, AuthenticationResult, Credential, IssuedChallenge, RegisteringUser,
    RegistrationResult, UserVerification, VerifiedAssertion, VerifiedCredential, Verifier,
    VerifierError,
};

/// What webauthn-rs needs back to finish a ceremony.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "lowercase")]
enum CeremonyState {
    Registration(PasskeyRegistration),
    Passkey(PasskeyAuthentication),
    Discoverable(DiscoverableAuthentication),
}

pub struct WebauthnVerifier {
    webauthn: Arc<Webauthn>,
}

impl WebauthnVerifier {
    // ---
    pub fn new(webauthn: Arc<Webauthn>) -> Self {
        Self { webauthn }
    }
}

fn internal(context: &str, err: impl std::fmt::Display) -> VerifierError {
    VerifierError::Internal(format!("{context}: {err}"))
}

fn rejected(err: impl std::fmt::Display) -> VerifierError {
    VerifierError::Rejected(err.to_string())
}

/// Pulls `publicKey.challenge` out of a serialized challenge response.
fn challenge_of(response: &impl Serialize) -> Result<String, VerifierError> {
    // ---
    let value = serde_json::to_value(response).map_err(|e| internal("challenge response", e))?;
    value["publicKey"]["challenge"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VerifierError::Internal("challenge response has no challenge".into()))
}

fn issued(challenge: String, state: CeremonyState) -> Result<IssuedChallenge, VerifierError> {
    // ---
    let state = serde_json::to_value(state).map_err(|e| internal("ceremony state", e))?;
    Ok(IssuedChallenge { challenge, state })
}

fn restore(issued: &IssuedChallenge) -> Result<CeremonyState, VerifierError> {
    serde_json::from_value(issued.state.clone()).map_err(|e| internal("ceremony state", e))
}

fn decode_passkey(credential: &Credential) -> Result<Passkey, VerifierError> {
    // ---
    let bytes = URL_SAFE_NO_PAD
        .decode(&credential.public_key)
        .map_err(|e| internal("stored passkey", e))?;
    serde_json::from_slice(&bytes).map_err(|e| internal("stored passkey", e))
}

fn encode_passkey(passkey: &Passkey) -> Result<String, VerifierError> {
    // ---
    let json = serde_json::to_vec(passkey).map_err(|e| internal("passkey", e))?;
    Ok(encode_base64url(json))
}

/// Backup eligibility and state as recorded inside the passkey.
///
/// `Passkey` has no accessor for these, so they are read from its serialized
/// form. Missing fields are an error rather than a silent `false`.
fn backup_flags(passkey: &Passkey) -> Result<(bool, bool), VerifierError> {
    // ---
    let value = serde_json::to_value(passkey).map_err(|e| internal("passkey", e))?;
    backup_flags_of(&value)
}

fn backup_flags_of(value: &Value) -> Result<(bool, bool), VerifierError> {
    // ---
    let flag = |name: &str| {
        value["cred"][name]
            .as_bool()
            .ok_or_else(|| VerifierError::Internal(format!("passkey has no {name} flag")))
    };
    Ok((flag("backup_eligible")?, flag("backup_state")?))
}

fn to_webauthn_registration(
    result: &RegistrationResult,
) -> Result<RegisterPublicKeyCredential, VerifierError> {
    // ---
    let value = json!({
        "id": result.id,
        "rawId": result.raw_id,
        "type": "public-key",
        "response": {
            "clientDataJSON": result.response.client_data_json,
            "attestationObject": result.response.attestation_object,
        },
        "extensions": {},
    });
    serde_json::from_value(value).map_err(rejected)
}

fn to_webauthn_assertion(result: &AuthenticationResult) -> Result<PublicKeyCredential, VerifierError> {
    // ---
    let user_handle = result
        .response
        .user_handle
        .as_deref()
        .filter(|h| !h.is_empty());
    let value = json!({
        "id": result.id,
        "rawId": result.raw_id,
        "type": "public-key",
        "response": {
            "clientDataJSON": result.response.client_data_json,
            "authenticatorData": result.response.authenticator_data,
            "signature": result.response.signature,
            "userHandle": user_handle,
        },
        "extensions": {},
    });
    serde_json::from_value(value).map_err(rejected)
}

impl Verifier for WebauthnVerifier {
    // ---
    fn user_verification_for(&self, requested: UserVerification) -> Option<UserVerification> {
        match requested {
            UserVerification::Discouraged => None,
            UserVerification::Preferred | UserVerification::Required => {
                Some(UserVerification::Required)
            }
        }
    }

    fn issue_registration(
        &self,
        user: &RegisteringUser,
        exclude_credentials: &[String],
    ) -> Result<IssuedChallenge, VerifierError> {
        // ---
        let exclude = exclude_credentials
            .iter()
            .map(|id| {
                URL_SAFE_NO_PAD
                    .decode(id)
                    .map(CredentialID::from)
                    .map_err(|e| internal("stored credential id", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (ccr, state) = self
            .webauthn
            .start_passkey_registration(
                user.id,
                &user.username,
                &user.display_name,
                Some(exclude).filter(|e| !e.is_empty()),
            )
            .map_err(|e| internal("start_passkey_registration", e))?;

        issued(challenge_of(&ccr)?, CeremonyState::Registration(state))
    }

    fn verify_registration(
        &self,
        issued: &IssuedChallenge,
        _user: &RegisteringUser,
        result: &RegistrationResult,
    ) -> Result<VerifiedCredential, VerifierError> {
        // ---
        let CeremonyState::Registration(state) = restore(issued)? else {
            return Err(VerifierError::Internal("not a registration ceremony".into()));
        };

        let credential = to_webauthn_registration(result)?;
        let passkey = self
            .webauthn
            .finish_passkey_registration(&credential, &state)
            .map_err(rejected)?;

        let (backup_eligible, backed_up) = backup_flags(&passkey)?;
        Ok(VerifiedCredential {
            id: encode_base64url(passkey.cred_id().as_ref()),
            public_key: encode_passkey(&passkey)?,
            counter: 0,
            aaguid: uuid::Uuid::nil(),
            device_type: if backup_eligible {
                "multiDevice"
            } else {
                "singleDevice"
            }
            .to_string(),
            backed_up,
            transports: result.response.transports.clone(),
        })
    }

    fn issue_authentication(
        &self,
        allow_credentials: &[Credential],
    ) -> Result<IssuedChallenge, VerifierError> {
        // ---
        if allow_credentials.is_empty() {
            let (rcr, state) = self
                .webauthn
                .start_discoverable_authentication()
                .map_err(|e| internal("start_discoverable_authentication", e))?;
            return issued(challenge_of(&rcr)?, CeremonyState::Discoverable(state));
        }

        let passkeys = allow_credentials
            .iter()
            .map(decode_passkey)
            .collect::<Result<Vec<_>, _>>()?;
        let (rcr, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| internal("start_passkey_authentication", e))?;

        issued(challenge_of(&rcr)?, CeremonyState::Passkey(state))
    }

    fn verify_authentication(
        &self,
        issued: &IssuedChallenge,
        credential: &Credential,
        result: &AuthenticationResult,
    ) -> Result<VerifiedAssertion, VerifierError> {
        // ---
        let mut passkey = decode_passkey(credential)?;
        let assertion = to_webauthn_assertion(result)?;

        let outcome = match restore(issued)? {
            CeremonyState::Passkey(state) => self
                .webauthn
                .finish_passkey_authentication(&assertion, &state),
            CeremonyState::Discoverable(state) => self.webauthn.finish_discoverable_authentication(
                &assertion,
                state,
                &[DiscoverableKey::from(&passkey)],
            ),
            CeremonyState::Registration(_) => {
                return Err(VerifierError::Internal("not an authentication ceremony".into()))
            }
        }
        .map_err(rejected)?;

        passkey.update_credential(&outcome);
        Ok(VerifiedAssertion {
            counter: outcome.counter(),
            backed_up: outcome.backup_state(),
            public_key: Some(encode_passkey(&passkey)?),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::WebAuthnConfig;
    use crate::infrastructure::create_webauthn;
    use std::time::Duration;

    fn verifier() -> WebauthnVerifier {
        // ---
        let config = WebAuthnConfig {
            rp_id: "localhost".to_string(),
            rp_name: "Test App".to_string(),
            origin: "http://localhost:8080".to_string(),
            challenge_ttl: Duration::from_secs(300),
        };
        WebauthnVerifier::new(Arc::new(create_webauthn(&config).unwrap()))
    }

    fn registering() -> RegisteringUser {
        RegisteringUser {
            id: uuid::Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            existing: false,
        }
    }

    #[test]
    fn registration_challenge_is_base64url() {
        // ---
        let issued = verifier()
            .issue_registration(&registering(), &[])
            .unwrap();
        assert!(URL_SAFE_NO_PAD.decode(&issued.challenge).unwrap().len() >= 16);
        assert_eq!(issued.state["kind"], "registration");
    }

    #[test]
    fn discoverable_challenge_without_credentials() {
        // ---
        let issued = verifier()
            .issue_authentication(&[])
            .unwrap();
        assert_eq!(issued.state["kind"], "discoverable");
        assert!(!issued.challenge.is_empty());
    }

    #[test]
    fn user_verification_is_always_required() {
        // ---
        let verifier = verifier();
        assert_eq!(
            verifier.user_verification_for(UserVerification::Preferred),
            Some(UserVerification::Required)
        );
        assert_eq!(
            verifier.user_verification_for(UserVerification::Required),
            Some(UserVerification::Required)
        );
        assert_eq!(
            verifier.user_verification_for(UserVerification::Discouraged),
            None
        );
    }

    #[test]
    fn missing_backup_flags_are_an_error() {
        // ---
        let flags = backup_flags_of(&json!({
            "cred": { "backup_eligible": true, "backup_state": false }
        }))
        .unwrap();
        assert_eq!(flags, (true, false));

        let err = backup_flags_of(&json!({ "cred": { "be": true } })).unwrap_err();
        assert!(matches!(err, VerifierError::Internal(_)));
    }

    #[test]
    fn garbage_attestation_is_rejected() {
        // ---
        let verifier = verifier();
        let issued = verifier
            .issue_registration(&registering(), &[])
            .unwrap();
        let client_data = encode_base64url(
            json!({
                "type": "webauthn.create",
                "challenge": issued.challenge,
                "origin": "http://localhost:8080",
            })
            .to_string(),
        );
        let result = RegistrationResult {
            id: "AQID".to_string(),
            raw_id: "AQID".to_string(),
            kind: Some("public-key".to_string()),
            response: crate::domain::AttestationResponse {
                client_data_json: client_data,
                attestation_object: encode_base64url("not cbor"),
                transports: vec![],
            },
        };

        let err = verifier
            .verify_registration(&issued, &registering(), &result)
            .unwrap_err();
        assert!(matches!(err, VerifierError::Rejected(_)));
    }

    #[test]
    fn authentication_state_is_not_a_registration() {
        // ---
        let verifier = verifier();
        let issued = verifier
            .issue_authentication(&[])
            .unwrap();
        let result = RegistrationResult {
            id: "AQID".to_string(),
            raw_id: "AQID".to_string(),
            kind: None,
            response: crate::domain::AttestationResponse {
                client_data_json: "e30".to_string(),
                attestation_object: "e30".to_string(),
                transports: vec![],
            },
        };
        let err = verifier
            .verify_registration(&issued, &registering(), &result)
            .unwrap_err();
        assert!(matches!(err, VerifierError::Internal(_)));
    }
}
