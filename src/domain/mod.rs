mod ceremony;
mod documents;
mod entitlement;
mod error;
mod identity;
mod metrics;
mod repository;
mod verifier;

// Publicly expose the Metrics abstraction
pub use metrics::{Metrics, MetricsPtr};

// Identity and passkey model
pub use identity::{
    is_valid_username, validate_display_name, validate_username, Credential, RegisteringUser,
    User, UserRef, VerifiedCredential,
};

// Invites and shares
pub use entitlement::{
    format_iso_duration, parse_iso_duration, Claim, Entitlement, Invite, RegisterableSource,
    Share, SourceType,
};

// Ceremony payloads and the verification capability
pub use ceremony::{
    encode_base64url, AssertionResponse, AttestationConveyance, AttestationResponse,
    AuthenticationResult, AuthenticatorAttachment, AuthenticatorSelection, ClientData,
    RegistrationResult, ResidentKey, UserVerification, CLIENT_DATA_CREATE, CLIENT_DATA_GET,
};
pub use verifier::{IssuedChallenge, VerifiedAssertion, Verifier, VerifierError, VerifierPtr};

// Persistence abstractions
pub use documents::{DocumentCatalog, DocumentCatalogPtr, DocumentMeta};
pub use repository::{
    ClaimOutcome, CounterUpdate, CredentialRemoval, EntitlementStore, EntitlementStorePtr, IdentityStore,
    IdentityStorePtr, UserInsert,
};

pub use error::{CoreError, REGISTRATION_FAILED, SIGN_IN_FAILED};
