use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CoreError;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    // ---
    Regex::new(r"^[A-Za-z0-9_-]{3,100}$").expect("username pattern is valid")
});

static DISPLAY_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    // ---
    Regex::new(r"^[\p{L}\p{N} -]{1,200}$").expect("display name pattern is valid")
});

/// Returns true when `username` has the shape of a username, whether or not
/// such a user exists.
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Validates a username submitted by a client.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    // ---
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "Username must be 3-100 characters of letters, digits, '_' or '-'".to_string(),
        ))
    }
}

/// Validates a display name submitted by a client.
pub fn validate_display_name(display_name: &str) -> Result<(), CoreError> {
    // ---
    if DISPLAY_NAME_RE.is_match(display_name) {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "Display name must be 1-200 characters of letters, digits, spaces or '-'".to_string(),
        ))
    }
}

/// A registered account.
///
/// `id` and `username` never change once the user exists; `display_name`
/// may be edited by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    // ---
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl User {
    // ---
    pub fn new(username: String, display_name: String) -> Self {
        // ---
        Self {
            id: Uuid::new_v4(),
            created: Utc::now(),
            username,
            display_name,
            is_admin: false,
        }
    }

    pub fn user_ref(&self) -> UserRef {
        // ---
        UserRef {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Identity-only snapshot of a user.
///
/// Safe to keep in records and sessions because usernames are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// A user that has asked to register but does not exist yet (or, for an
/// additional passkey, the existing user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteringUser {
    // ---
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    /// True when the passkey is being added to an account that already exists.
    pub existing: bool,
}

impl From<&User> for RegisteringUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            existing: true,
        }
    }
}

/// Represents a WebAuthn credential (passkey) for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    // ---
    /// Unique credential ID (base64url, from authenticator)
    pub id: String,

    /// User this credential belongs to
    pub user_id: Uuid,

    /// Verifier-specific public key material (base64url)
    pub public_key: String,

    /// Signature counter (for replay attack prevention)
    pub counter: u32,

    pub aaguid: Uuid,

    /// `singleDevice` or `multiDevice`
    pub device_type: String,

    pub backed_up: bool,

    pub transports: Vec<String>,

    /// When this credential was created
    pub created: DateTime<Utc>,

    pub last_used: Option<DateTime<Utc>>,
}

/// What the verifier proved about a freshly registered authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    // ---
    pub id: String,
    pub public_key: String,
    pub counter: u32,
    pub aaguid: Uuid,
    pub device_type: String,
    pub backed_up: bool,
    pub transports: Vec<String>,
}

impl VerifiedCredential {
    // ---
    pub fn into_credential(self, user_id: Uuid) -> Credential {
        // ---
        Credential {
            id: self.id,
            user_id,
            public_key: self.public_key,
            counter: self.counter,
            aaguid: self.aaguid,
            device_type: self.device_type,
            backed_up: self.backed_up,
            transports: self.transports,
            created: Utc::now(),
            last_used: None,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn username_rules() {
        // ---
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("bob_the-builder"));
        assert!(!is_valid_username("al"));
        assert!(!is_valid_username("alice smith"));
        assert!(!is_valid_username("@bob"));
        assert!(!is_valid_username(&"x".repeat(101)));
        assert!(is_valid_username(&"x".repeat(100)));
    }

    #[test]
    fn display_name_rules() {
        // ---
        assert!(validate_display_name("Alice A").is_ok());
        assert!(validate_display_name("Jean-Luc 2").is_ok());
        assert!(validate_display_name("Zoë").is_ok());
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("<script>").is_err());
        assert!(validate_display_name(&"a".repeat(201)).is_err());
    }

    #[test]
    fn user_ref_snapshots_identity() {
        // ---
        let user = User::new("alice".to_string(), "Alice A".to_string());
        let user_ref = user.user_ref();
        assert_eq!(user_ref.id, user.id);
        assert_eq!(user_ref.username, "alice");
        assert!(!user.is_admin);
    }
}
