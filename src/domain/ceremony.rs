//! Typed WebAuthn ceremony payloads.
//!
//! Registration and authentication results are distinct types and are
//! checked with `validate()` before any field is trusted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::error::CoreError;

pub const CLIENT_DATA_CREATE: &str = "webauthn.create";
pub const CLIENT_DATA_GET: &str = "webauthn.get";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKey {
    Discouraged,
    #[default]
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    // ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(default)]
    pub require_resident_key: bool,
    #[serde(default)]
    pub resident_key: ResidentKey,
    #[serde(default)]
    pub user_verification: UserVerification,
}

/// The decoded `clientDataJSON` of either ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    pub origin: String,
}

/// Body of `POST /attestation/result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    // ---
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    // ---
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Body of `POST /assertion/result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    // ---
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub response: AssertionResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    // ---
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}

impl RegistrationResult {
    /// Schema checks that must pass before the result goes anywhere near the
    /// verifier.
    pub fn validate(&self) -> Result<(), CoreError> {
        // ---
        validate_envelope(&self.id, &self.raw_id, self.kind.as_deref())?;
        require_base64url("response.clientDataJSON", &self.response.client_data_json)?;
        require_base64url(
            "response.attestationObject",
            &self.response.attestation_object,
        )?;
        Ok(())
    }

    pub fn client_data(&self) -> Result<ClientData, CoreError> {
        decode_client_data(&self.response.client_data_json, CLIENT_DATA_CREATE)
    }
}

impl AuthenticationResult {
    /// Schema checks that must pass before the result goes anywhere near the
    /// verifier.
    pub fn validate(&self) -> Result<(), CoreError> {
        // ---
        validate_envelope(&self.id, &self.raw_id, self.kind.as_deref())?;
        require_base64url("response.clientDataJSON", &self.response.client_data_json)?;
        require_base64url(
            "response.authenticatorData",
            &self.response.authenticator_data,
        )?;
        require_base64url("response.signature", &self.response.signature)?;
        if let Some(handle) = self.response.user_handle.as_deref() {
            if !handle.is_empty() {
                require_base64url("response.userHandle", handle)?;
            }
        }
        Ok(())
    }

    pub fn client_data(&self) -> Result<ClientData, CoreError> {
        decode_client_data(&self.response.client_data_json, CLIENT_DATA_GET)
    }
}

fn validate_envelope(id: &str, raw_id: &str, kind: Option<&str>) -> Result<(), CoreError> {
    // ---
    require_base64url("id", id)?;
    if id != raw_id {
        return Err(CoreError::Validation("id and rawId differ".to_string()));
    }
    match kind {
        None | Some("public-key") => Ok(()),
        Some(other) => Err(CoreError::Validation(format!(
            "Unsupported credential type: {other}"
        ))),
    }
}

fn require_base64url(field: &str, value: &str) -> Result<(), CoreError> {
    // ---
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    URL_SAFE_NO_PAD
        .decode(value)
        .map(|_| ())
        .map_err(|_| CoreError::Validation(format!("{field} is not base64url")))
}

fn decode_client_data(encoded: &str, expected_kind: &str) -> Result<ClientData, CoreError> {
    // ---
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| CoreError::Validation("clientDataJSON is not base64url".to_string()))?;
    let client_data: ClientData = serde_json::from_slice(&bytes)
        .map_err(|_| CoreError::Validation("clientDataJSON is malformed".to_string()))?;
    if client_data.kind != expected_kind {
        return Err(CoreError::Validation(format!(
            "clientDataJSON type must be {expected_kind}"
        )));
    }
    Ok(client_data)
}

/// Encodes bytes the way every identifier in this crate travels: base64url
/// without padding.
pub fn encode_base64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
