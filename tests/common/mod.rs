// Test helpers are intentionally partially used
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use passkey_share::domain::{
    encode_base64url, AuthenticationResult, Credential, IdentityStore, IssuedChallenge,
    RegisteringUser, RegistrationResult, VerifiedAssertion, VerifiedCredential, Verifier,
    VerifierError,
};
use passkey_share::{
    build_router, create_noop_metrics, create_router, AppState, Backends, MemorySessionStore,
    MemoryStore, SessionConfig, StaticDocumentCatalog, WebAuthnConfig,
};
use rand::RngCore;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower::ServiceExt;

macro_rules! set_env_if_unset {
    // ---
    ($key:expr, $val:expr) => {
        if std::env::var($key).is_err() {
            std::env::set_var($key, $val);
        }
    };
}

static INIT: Once = Once::new();

pub const SESSION_COOKIE: &str = "passkey_session";
pub const REPORT_URL: &str = "/documents/reports/q3.pdf";

// ============================================================================
// Test Setup
// ============================================================================

/// Environment for `create_router()`: in-memory backends, no TLS.
pub fn setup_test_env() {
    // ---
    INIT.call_once(|| {
        set_env_if_unset!("PASSKEY_RP_ID", "localhost");
        set_env_if_unset!("PASSKEY_ORIGIN", "http://localhost:8080");
        set_env_if_unset!("PASSKEY_RP_NAME", "Test App");
        set_env_if_unset!("PASSKEY_STORAGE", "memory");
        set_env_if_unset!("PASSKEY_SESSIONS", "memory");
        set_env_if_unset!("PASSKEY_SESSION_SECURE", "false");
        set_env_if_unset!("PASSKEY_METRICS_TYPE", "noop");
    });
}

/// The real router from environment configuration, listening on a random port.
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub client: Client,
}

impl TestServer {
    // ---
    pub async fn new() -> Self {
        // ---
        let app = create_router()
            .await
            .expect("Should be able to create router");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start
        sleep(Duration::from_millis(100)).await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self { addr, client }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }
}

// ============================================================================
// Stub verifier
// ============================================================================

/// Accepts every result unless told to reject the next one. The assertion
/// counter is read from `authenticatorData` as a big-endian `u32`.
///
/// The library keeps an equivalent stub for its unit tests, but that one is
/// `#[cfg(test)]` and not visible to integration tests, which link the crate
/// like any other dependency. This copy only goes through the public
/// `domain` API.
#[derive(Default)]
pub struct StubVerifier {
    verify_calls: AtomicUsize,
    reject_next: Mutex<Option<String>>,
}

impl StubVerifier {
    // ---
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn reject_next(&self, reason: &str) {
        *self.reject_next.lock().unwrap() = Some(reason.to_string());
    }

    fn verdict(&self) -> Result<(), VerifierError> {
        // ---
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.reject_next.lock().unwrap().take() {
            Some(reason) => Err(VerifierError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn issue() -> IssuedChallenge {
        // ---
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        IssuedChallenge {
            challenge: encode_base64url(bytes),
            state: json!({}),
        }
    }
}

impl Verifier for StubVerifier {
    // ---
    fn issue_registration(
        &self,
        _user: &RegisteringUser,
        _exclude_credentials: &[String],
    ) -> Result<IssuedChallenge, VerifierError> {
        Ok(Self::issue())
    }

    fn verify_registration(
        &self,
        _issued: &IssuedChallenge,
        _user: &RegisteringUser,
        result: &RegistrationResult,
    ) -> Result<VerifiedCredential, VerifierError> {
        // ---
        self.verdict()?;
        Ok(VerifiedCredential {
            id: result.id.clone(),
            public_key: encode_base64url("public key"),
            counter: 0,
            aaguid: uuid::Uuid::nil(),
            device_type: "multiDevice".to_string(),
            backed_up: true,
            transports: result.response.transports.clone(),
        })
    }

    fn issue_authentication(
        &self,
        _allow_credentials: &[Credential],
    ) -> Result<IssuedChallenge, VerifierError> {
        Ok(Self::issue())
    }

    fn verify_authentication(
        &self,
        _issued: &IssuedChallenge,
        _credential: &Credential,
        result: &AuthenticationResult,
    ) -> Result<VerifiedAssertion, VerifierError> {
        // ---
        self.verdict()?;
        let data = URL_SAFE_NO_PAD
            .decode(&result.response.authenticator_data)
            .map_err(|e| VerifierError::Rejected(e.to_string()))?;
        let counter = data
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(u32::from_be_bytes)
            .ok_or_else(|| VerifierError::Rejected("short authenticator data".to_string()))?;
        Ok(VerifiedAssertion {
            counter,
            backed_up: true,
            public_key: None,
        })
    }
}

// ============================================================================
// In-process application
// ============================================================================

/// The router over in-memory backends and the stub verifier, driven with
/// `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub verifier: Arc<StubVerifier>,
}

impl TestApp {
    // ---
    pub fn new() -> Self {
        // ---
        let store = Arc::new(MemoryStore::new());
        let verifier = Arc::new(StubVerifier::default());
        let backends = Backends {
            identities: store.clone(),
            entitlements: store.clone(),
            sessions: Arc::new(MemorySessionStore::new(Duration::from_secs(600))),
            verifier: verifier.clone(),
            documents: Arc::new(
                StaticDocumentCatalog::new().with_document(REPORT_URL, "q3", "pdf"),
            ),
            metrics: create_noop_metrics().unwrap(),
        };
        let webauthn = WebAuthnConfig {
            rp_id: "localhost".to_string(),
            rp_name: "Test App".to_string(),
            origin: "http://localhost:8080".to_string(),
            challenge_ttl: Duration::from_secs(300),
        };
        let session = SessionConfig {
            secure: false,
            ..SessionConfig::default()
        };

        Self {
            router: build_router(AppState::new(backends, &webauthn, session)),
            store,
            verifier,
        }
    }

    /// A browser with its own cookie jar.
    pub fn browser(&self) -> Browser<'_> {
        Browser {
            app: self,
            cookie: None,
        }
    }

    pub async fn make_admin(&self, username: &str) {
        // ---
        let mut user = self
            .store
            .find_user_by_username(username)
            .await
            .unwrap()
            .expect("user should exist");
        user.is_admin = true;
        self.store.update_user(&user).await.unwrap();
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `Value::Null` when the body is not JSON.
    pub json: Value,
    pub text: String,
}

impl TestResponse {
    // ---
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn error_message(&self) -> &str {
        self.json["errorMessage"].as_str().unwrap_or_default()
    }
}

/// Sends requests to a [`TestApp`], replaying the session cookie it was given.
pub struct Browser<'a> {
    app: &'a TestApp,
    pub cookie: Option<String>,
}

impl Browser<'_> {
    // ---
    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&mut self, path: &str, body: Value) -> TestResponse {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn post_empty(&mut self, path: &str) -> TestResponse {
        self.send(Method::POST, path, None).await
    }

    pub async fn put(&mut self, path: &str, body: Value) -> TestResponse {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&mut self, path: &str) -> TestResponse {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&mut self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        // ---
        let mut request = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if let Some(set_cookie) = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            let pair = set_cookie.split(';').next().unwrap_or_default();
            self.cookie = match pair.split_once('=') {
                Some((_, "")) | None => None,
                Some(_) => Some(pair.to_string()),
            };
        }

        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }

    // ---

    /// Registers a new account with the credential named `label`.
    pub async fn register(&mut self, username: &str, label: &str) -> TestResponse {
        // ---
        let options = self
            .post(
                "/attestation/options",
                json!({ "username": username, "displayName": username }),
            )
            .await;
        assert_eq!(options.status, StatusCode::OK, "{}", options.json);
        let challenge = options.json["challenge"].as_str().unwrap().to_string();
        self.post("/attestation/result", attestation(&challenge, label))
            .await
    }

    /// Signs in as `username` with the credential named `label`.
    pub async fn sign_in(&mut self, username: &str, label: &str, counter: u32) -> TestResponse {
        // ---
        let options = self
            .post("/assertion/options", json!({ "username": username }))
            .await;
        assert_eq!(options.status, StatusCode::OK, "{}", options.json);
        let challenge = options.json["challenge"].as_str().unwrap().to_string();
        self.post("/assertion/result", assertion(&challenge, label, counter))
            .await
    }

    pub async fn sign_out(&mut self) -> TestResponse {
        self.post_empty("/signout").await
    }
}

// ============================================================================
// Ceremony payloads
// ============================================================================

pub fn cred_id(label: &str) -> String {
    encode_base64url(label)
}

fn client_data(kind: &str, challenge: &str) -> String {
    encode_base64url(
        json!({ "type": kind, "challenge": challenge, "origin": "http://localhost:8080" })
            .to_string(),
    )
}

pub fn attestation(challenge: &str, label: &str) -> Value {
    // ---
    json!({
        "id": cred_id(label),
        "rawId": cred_id(label),
        "type": "public-key",
        "response": {
            "clientDataJSON": client_data("webauthn.create", challenge),
            "attestationObject": encode_base64url("attestation"),
            "transports": ["internal", "hybrid"],
        },
    })
}

pub fn assertion(challenge: &str, label: &str, counter: u32) -> Value {
    // ---
    json!({
        "id": cred_id(label),
        "rawId": cred_id(label),
        "type": "public-key",
        "response": {
            "clientDataJSON": client_data("webauthn.get", challenge),
            "authenticatorData": encode_base64url(counter.to_be_bytes()),
            "signature": "c2ln",
            "userHandle": null,
        },
    })
}
