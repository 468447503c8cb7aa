// src/lib.rs
use anyhow::Result;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use redis::Client;
use std::sync::Arc;

use crate::domain::{DocumentCatalogPtr, EntitlementStorePtr, IdentityStorePtr, MetricsPtr};

// Public exports (visible outside this module)
pub mod domain;

// Internal-only exports (sibling access within this module)
mod account;
mod app_state;
mod ceremony;
mod config;
mod entitlements;
mod handlers;
mod infrastructure;
mod session;

#[cfg(test)]
mod test_support;

// Hoist up only the public symbol(s)
pub use account::{PasskeySummary, Profile, SessionContext, UpdateProfileRequest};
pub use app_state::{AppState, Backends};
pub use ceremony::{
    AuthenticationOptions, AuthenticationOptionsRequest, CeremonyOrchestrator,
    RegistrationOptions, RegistrationOptionsRequest, RelyingParty,
};
pub use entitlements::{resolve_access, Access, CreateInviteRequest, CreateShareRequest};
pub use session::{SessionState, SessionStore, SessionStorePtr};

pub use config::*;

// Publicly expose the infrastructure creation functions and backends
pub use infrastructure::{
    create_noop_metrics, // ---
    create_prom_metrics,
    create_webauthn,
    init_database_with_retry,
    init_database_with_retry_from_env,
    FsDocumentCatalog,
    MemorySessionStore,
    MemoryStore,
    PostgresRepository,
    RedisSessionStore,
    StaticDocumentCatalog,
    WebauthnVerifier,
};

/// Wires the configured backends into an [`AppState`].
///
/// # Errors
/// Fails when a backend cannot be reached or configured, e.g. PostgreSQL
/// not answering within its retry budget or an invalid WebAuthn origin.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    // ---
    let metrics: MetricsPtr = if config.server.metrics_type == "prom" {
        create_prom_metrics()?
    } else {
        create_noop_metrics()?
    };

    let (identities, entitlements): (IdentityStorePtr, EntitlementStorePtr) =
        match &config.storage {
            StorageConfig::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
            StorageConfig::Postgres(database) => {
                let pool = init_database_with_retry(database).await?;
                let repository = Arc::new(PostgresRepository::new(pool));
                (repository.clone(), repository)
            }
        };

    let sessions: SessionStorePtr = match &config.sessions {
        SessionStoreConfig::Memory => Arc::new(MemorySessionStore::new(config.session.ttl)),
        SessionStoreConfig::Redis(redis) => Arc::new(RedisSessionStore::new(
            Client::open(redis.url.clone())?,
            config.session.ttl,
        )),
    };

    let webauthn = Arc::new(create_webauthn(&config.webauthn)?);
    let documents: DocumentCatalogPtr =
        Arc::new(FsDocumentCatalog::new(config.documents.root.clone()));

    let backends = Backends {
        identities,
        entitlements,
        sessions,
        verifier: Arc::new(WebauthnVerifier::new(webauthn)),
        documents,
        metrics,
    };
    Ok(AppState::new(backends, &config.webauthn, config.session.clone()))
}

/// Build the HTTP router with every backend determined by environment variables.
pub async fn create_router() -> Result<Router> {
    // ---
    // Load all configuration from environment
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt::try_init().ok(); // Ignores if already initialized
    tracing::debug!(
        "Relying party '{}' at {}",
        config.webauthn.rp_id,
        config.webauthn.origin
    );

    Ok(build_router(build_state(&config).await?))
}

/// Routes and middleware over an already built [`AppState`].
pub fn build_router(app_state: AppState) -> Router {
    // ---
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/attestation/options", post(handlers::attestation_options))
        .route("/attestation/result", post(handlers::attestation_result))
        .route("/assertion/options", post(handlers::assertion_options))
        .route("/assertion/result", post(handlers::assertion_result))
        .route("/login", get(handlers::login_page))
        .route("/register", get(handlers::register_page))
        .route("/signout", post(handlers::sign_out))
        .route("/account", get(handlers::get_account))
        .route("/account/profile", put(handlers::update_profile))
        .route(
            "/account/credentials/{id}",
            delete(handlers::delete_credential),
        )
        .route(
            "/invites",
            get(handlers::list_invites).post(handlers::create_invite),
        )
        .route(
            "/invites/{id}",
            get(handlers::get_invite).post(handlers::claim_invite),
        )
        .route(
            "/shares",
            get(handlers::list_shares).post(handlers::create_share),
        )
        .route(
            "/shares/{id}",
            get(handlers::get_share).post(handlers::claim_share),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::track_http_metrics,
        ))
        .with_state(app_state)
}
