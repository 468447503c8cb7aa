//! Invite and share records.
//!
//! Both are "registerable sources": something a user claims exactly once by
//! proving their identity with a passkey.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CoreError;
use super::identity::UserRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Invite,
    Share,
}

impl SourceType {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Invite => "invite",
            SourceType::Share => "share",
        }
    }
}

/// The one-time claim of a source. Claim time and claimer only ever exist
/// together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub at: DateTime<Utc>,
    pub by: UserRef,
}

/// Fields common to invites and shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterableSource {
    // ---
    pub id: Uuid,
    pub source_type: SourceType,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
    pub created_by: UserRef,
    pub claim: Option<Claim>,
}

impl RegisterableSource {
    // ---
    pub fn new(source_type: SourceType, created_by: UserRef, is_admin: bool) -> Self {
        // ---
        Self {
            id: Uuid::new_v4(),
            source_type,
            is_admin,
            created: Utc::now(),
            created_by,
            claim: None,
        }
    }

    pub fn claimed_by(&self) -> Option<&UserRef> {
        self.claim.as_ref().map(|c| &c.by)
    }

    pub fn is_claimed_by(&self, user_id: Uuid) -> bool {
        self.claimed_by().is_some_and(|by| by.id == user_id)
    }

    pub fn is_created_by(&self, user_id: Uuid) -> bool {
        self.created_by.id == user_id
    }
}

/// A single-use token granting account creation, optionally as an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub source: RegisterableSource,
}

impl Invite {
    pub fn new(created_by: UserRef, is_admin: bool) -> Self {
        Self {
            source: RegisterableSource::new(SourceType::Invite, created_by, is_admin),
        }
    }
}

/// A single-use, optionally time-boxed and user-restricted grant to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    // ---
    pub source: RegisterableSource,
    pub backing_url: String,
    pub document_title: String,
    pub document_type: String,
    pub to_username: Option<String>,
    pub expire_duration: Option<Duration>,
}

/// Access-policy view shared by invites and shares.
pub trait Entitlement {
    // ---
    fn source(&self) -> &RegisterableSource;

    /// Hard expiry instant, if the record is time-boxed.
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// The only username allowed to claim the record, if restricted.
    fn intended_for(&self) -> Option<&str> {
        None
    }
}

impl Entitlement for Invite {
    fn source(&self) -> &RegisterableSource {
        &self.source
    }
}

impl Entitlement for Share {
    // ---
    fn source(&self) -> &RegisterableSource {
        &self.source
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expire_duration
            .and_then(|d| self.source.created.checked_add_signed(d))
    }

    fn intended_for(&self) -> Option<&str> {
        self.to_username.as_deref()
    }
}

/// Parses the ISO-8601 durations used for share expiry: `P1D`, `PT12H`,
/// `P1W`, `P1DT30M`, `PT90S`. Years and months are rejected because their
/// length is calendar dependent. Each unit appears at most once, largest
/// first, and a `T` must be followed by at least one time unit.
pub fn parse_iso_duration(text: &str) -> Result<Duration, CoreError> {
    // ---
    let invalid = || CoreError::Validation(format!("Invalid expiry duration: {text}"));

    let rest = text.trim().strip_prefix('P').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::zero();
    let mut in_time = false;
    let mut number = String::new();
    // Position of the last unit in W, D, H, M, S order.
    let mut last_rank: Option<u8> = None;

    for ch in rest.chars() {
        // ---
        match ch {
            'T' if !in_time && number.is_empty() => in_time = true,
            '0'..='9' => number.push(ch),
            unit => {
                let value: i64 = number.parse().map_err(|_| invalid())?;
                number.clear();
                let (rank, part) = match (in_time, unit) {
                    (false, 'W') => (0, Duration::try_weeks(value)),
                    (false, 'D') => (1, Duration::try_days(value)),
                    (true, 'H') => (2, Duration::try_hours(value)),
                    (true, 'M') => (3, Duration::try_minutes(value)),
                    (true, 'S') => (4, Duration::try_seconds(value)),
                    _ => return Err(invalid()),
                };
                if last_rank.is_some_and(|last| rank <= last) {
                    return Err(invalid());
                }
                last_rank = Some(rank);
                total = total
                    .checked_add(&part.ok_or_else(invalid)?)
                    .ok_or_else(invalid)?;
            }
        }
    }

    let Some(last_rank) = last_rank else {
        return Err(invalid());
    };
    if !number.is_empty() || (in_time && last_rank < 2) {
        return Err(invalid());
    }
    if total <= Duration::zero() {
        return Err(CoreError::Validation(
            "Expiry duration must be positive".to_string(),
        ));
    }

    Ok(total)
}

/// Renders a duration in the same ISO-8601 subset accepted by
/// [`parse_iso_duration`].
pub fn format_iso_duration(duration: Duration) -> String {
    // ---
    let mut secs = duration.num_seconds();
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            out.push_str(&format!("{secs}S"));
        }
    }
    if out == "P" {
        out.push_str("T0S");
    }
    out
}
