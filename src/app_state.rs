//! Application state management.
//!
//! `AppState` is the dependency injection container handed to every Axum
//! handler through the `State` extractor. Every collaborator sits behind an
//! `Arc`, so cloning it per request is cheap.

use crate::account::AccountService;
use crate::ceremony::{CeremonyOrchestrator, RelyingParty};
use crate::config::{SessionConfig, WebAuthnConfig};
use crate::domain::{
    DocumentCatalogPtr, EntitlementStorePtr, IdentityStorePtr, MetricsPtr, VerifierPtr,
};
use crate::entitlements::EntitlementEngine;
use crate::session::SessionStorePtr;

/// The storage and capability backends the application runs on.
///
/// Built from configuration by [`crate::build_state`], or by hand in tests.
#[derive(Clone)]
pub struct Backends {
    // ---
    pub identities: IdentityStorePtr,
    pub entitlements: EntitlementStorePtr,
    pub sessions: SessionStorePtr,
    pub verifier: VerifierPtr,
    pub documents: DocumentCatalogPtr,
    pub metrics: MetricsPtr,
}

/// Shared application state passed to all Axum handlers.
///
/// Built once at startup and never mutated afterwards. Handlers reach the
/// core services through the accessors below.
#[derive(Clone)]
pub struct AppState {
    // ---
    metrics: MetricsPtr,

    /// Used by the session extractor to drop identities whose user is gone.
    identities: IdentityStorePtr,

    /// Server-side session values, keyed by the cookie's opaque id.
    sessions: SessionStorePtr,

    orchestrator: CeremonyOrchestrator,
    entitlements: EntitlementEngine,
    account: AccountService,

    /// Cookie name, lifetime and `Secure` flag.
    session_config: SessionConfig,
}

impl AppState {
    // ---

    pub fn new(backends: Backends, webauthn: &WebAuthnConfig, session_config: SessionConfig) -> Self {
        // ---
        let Backends {
            identities,
            entitlements,
            sessions,
            verifier,
            documents,
            metrics,
        } = backends;

        let orchestrator = CeremonyOrchestrator::new(
            identities.clone(),
            verifier,
            metrics.clone(),
            RelyingParty {
                id: webauthn.rp_id.clone(),
                name: webauthn.rp_name.clone(),
            },
            webauthn.challenge_ttl,
        );
        let entitlements =
            EntitlementEngine::new(entitlements, identities.clone(), documents, metrics.clone());
        let account = AccountService::new(identities.clone());

        AppState {
            metrics,
            identities,
            sessions,
            orchestrator,
            entitlements,
            account,
            session_config,
        }
    }

    /// Get a reference to the metrics implementation.
    pub(crate) fn metrics(&self) -> &MetricsPtr {
        &self.metrics
    }

    pub(crate) fn identities(&self) -> &IdentityStorePtr {
        &self.identities
    }

    pub(crate) fn sessions(&self) -> &SessionStorePtr {
        &self.sessions
    }

    pub(crate) fn orchestrator(&self) -> &CeremonyOrchestrator {
        &self.orchestrator
    }

    pub(crate) fn entitlements(&self) -> &EntitlementEngine {
        &self.entitlements
    }

    pub(crate) fn account(&self) -> &AccountService {
        &self.account
    }

    pub(crate) fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }
}
