// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod account;
mod assertion;
mod attestation;
mod auth_pages;
mod health;
mod invites;
mod metrics;
mod root;
mod session_cookie;
mod shared_types;
mod shares;
mod views;

// Core handlers
pub use health::health_check;
pub use metrics::{metrics_handler, track_http_metrics};
pub use root::root_handler;

// Passkey ceremonies
pub use assertion::{assertion_options, assertion_result};
pub use attestation::{attestation_options, attestation_result};

// Session entry points and account management
pub use account::{delete_credential, get_account, update_profile};
pub use auth_pages::{login_page, register_page, sign_out};

// Invites and shares
pub use invites::{claim_invite, create_invite, get_invite, list_invites};
pub use shares::{claim_share, create_share, get_share, list_shares};
