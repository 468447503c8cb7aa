//! WebAuthn relying party construction and the `webauthn-rs` verifier.

mod verifier;

use std::str::FromStr;

use crate::config::WebAuthnConfig;
use anyhow::Result;
use reqwest::Url;
use webauthn_rs::{Webauthn, WebauthnBuilder};

pub use verifier::WebauthnVerifier;

/// Creates a configured WebAuthn instance from application config.
///
/// # Errors
/// Returns an error if the origin is not a URL or the RP ID is not a
/// registrable suffix of the origin's host.
pub fn create_webauthn(config: &WebAuthnConfig) -> Result<Webauthn> {
    // ---
    tracing::debug!("Creating with config:{:?}", config);

    let url = Url::from_str(config.origin.as_str())?;
    let builder = WebauthnBuilder::new(&config.rp_id, &url)?;
    let webauthn = builder.rp_name(&config.rp_name).build()?;

    Ok(webauthn)
}
