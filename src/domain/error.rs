//! Error taxonomy shared by the ceremony orchestrator and entitlement engine.
//!
//! Core operations return these as values; translating them into HTTP
//! responses is the handler layer's job.

/// Generic text for every failed sign-in, whatever the underlying cause.
pub const SIGN_IN_FAILED: &str = "We couldn't sign you in";

/// Generic text for a registration the verifier rejected.
pub const REGISTRATION_FAILED: &str = "We couldn't register your passkey";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ---
    /// Field-level, user-correctable problem with the request.
    #[error("{0}")]
    Validation(String),

    /// The request collides with existing state (e.g. a taken username).
    #[error("{0}")]
    Conflict(String),

    #[error("No active registration")]
    NoActiveRegistration,

    #[error("No active authentication")]
    NoActiveAuthentication,

    #[error("{}", REGISTRATION_FAILED)]
    RegistrationFailed,

    /// Deliberately uninformative; the cause is only in the server log.
    #[error("{}", SIGN_IN_FAILED)]
    SignInFailed,

    #[error("Already signed in")]
    AlreadySignedIn,

    /// True absence, or a record hidden from this viewer.
    #[error("Not found")]
    NotFound,

    #[error("Already claimed")]
    AlreadyClaimed,

    /// Informative refusal, only produced for viewers entitled to the reason.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No authenticated identity; `login_url` carries the `returnTo` parameter.
    #[error("Authentication required")]
    Unauthorized { login_url: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    // ---
    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }
}
