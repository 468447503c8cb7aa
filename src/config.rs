// src/config.rs

//! Application configuration loaded from environment variables.
//!
//! This module defines all startup-time configuration for the service.
//! Configuration is validated eagerly and failures are treated as
//! deployment errors rather than recoverable runtime conditions.

use anyhow::Result;
use std::time::Duration;

// ============================================================
// Local macros (config-only, intentionally explicit)
// ============================================================

/// Reads a required environment variable.
///
/// # Behavior
/// - Fails fast if the variable is missing
/// - Produces a clear, human-readable error message
/// - Intended for startup-time configuration validation
macro_rules! required_env {
    // ---
    ($key:literal) => {
        std::env::var($key)
            .map_err(|_| anyhow::anyhow!(concat!("Missing required configuration: ", $key)))?
    };
}

/// Reads an optional environment variable and attempts to parse it.
///
/// If the variable is missing or cannot be parsed, the provided
/// default value is used. Appropriate for non-critical tuning parameters.
macro_rules! optional_env_parse {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| v.parse::<$ty>().ok())
            .unwrap_or($default)
    };
}

/// Reads an optional string environment variable with a default.
macro_rules! optional_env {
    // ---
    ($key:literal, $default:expr) => {
        std::env::var($key).unwrap_or_else(|_| $default.to_string())
    };
}

#[cfg(test)]
/// Asserts that a configuration constructor fails due to a missing
/// required environment variable.
macro_rules! assert_missing_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Missing required configuration: ", $key)),
            "unexpected error: {err}"
        );
    }};
}

// ============================================================
// Public configuration facade
// ============================================================

/// Aggregated application configuration.
///
/// This is the single source of truth for startup configuration.
/// All required configuration is validated eagerly during initialization.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: server::ServerConfig,
    pub storage: StorageConfig,
    pub sessions: SessionStoreConfig,
    pub webauthn: webauthn::WebAuthnConfig,
    pub session: session::SessionConfig,
    pub documents: documents::DocumentsConfig,
}

impl AppConfig {
    /// Loads and validates all application configuration from the environment.
    ///
    /// # Errors
    /// Returns an error if any required configuration is missing or invalid.
    /// Intended to be called exactly once at startup.
    pub fn from_env() -> Result<Self> {
        // ---
        Ok(Self {
            server: server::ServerConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            sessions: SessionStoreConfig::from_env()?,
            webauthn: webauthn::WebAuthnConfig::from_env()?,
            session: session::SessionConfig::from_env()?,
            documents: documents::DocumentsConfig::from_env()?,
        })
    }
}

// ============================================================
// Backend selection
// ============================================================

/// Where users, credentials, invites and shares are kept.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Memory,
    Postgres(database::DatabaseConfig),
}

impl StorageConfig {
    /// `PASSKEY_STORAGE`: `memory` (default) or `postgres`.
    pub fn from_env() -> Result<Self> {
        // ---
        match optional_env!("PASSKEY_STORAGE", "memory").as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres(database::DatabaseConfig::from_env()?)),
            other => anyhow::bail!("Unsupported PASSKEY_STORAGE: {other}"),
        }
    }
}

/// Where session values are kept.
#[derive(Debug, Clone)]
pub enum SessionStoreConfig {
    Memory,
    Redis(redis::RedisConfig),
}

impl SessionStoreConfig {
    /// `PASSKEY_SESSIONS`: `memory` (default) or `redis`.
    pub fn from_env() -> Result<Self> {
        // ---
        match optional_env!("PASSKEY_SESSIONS", "memory").as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis(redis::RedisConfig::from_env()?)),
            other => anyhow::bail!("Unsupported PASSKEY_SESSIONS: {other}"),
        }
    }
}

// ============================================================
// Server configuration
// ============================================================

mod server {
    // ---
    use super::*;

    /// Listener and observability settings.
    #[derive(Debug, Clone)]
    pub struct ServerConfig {
        /// Address the HTTP listener binds to. Defaults to `127.0.0.1:8080`.
        pub bind_addr: String,

        /// `prom` selects Prometheus metrics; anything else is no-op.
        pub metrics_type: String,
    }

    impl ServerConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            Ok(Self {
                bind_addr: optional_env!("PASSKEY_BIND_ADDR", "127.0.0.1:8080"),
                metrics_type: optional_env!("PASSKEY_METRICS_TYPE", "noop"),
            })
        }
    }
}
pub use server::ServerConfig;

// ============================================================
// Database configuration
// ============================================================

mod database {
    // ---
    use super::*;

    /// Database-related configuration derived from environment variables.
    ///
    /// Required only when PostgreSQL storage is selected.
    #[derive(Debug, Clone)]
    pub struct DatabaseConfig {
        /// PostgreSQL connection string.
        pub database_url: String,

        /// Number of retry attempts when initializing the database connection. Defaults to 50.
        pub retry_count: u32,

        /// Maximum time to wait when acquiring a connection from the pool. Defaults to 30 seconds.
        pub acquire_timeout: Duration,

        /// Minimum number of connections to keep in the pool, even when idle. Defaults to 2.
        pub min_connections: u32,

        /// Maximum number of connections open concurrently. Defaults to 15.
        pub max_connections: u32,
    }

    impl DatabaseConfig {
        /// Builds a [`DatabaseConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if `DATABASE_URL` is missing.
        pub fn from_env() -> Result<Self> {
            // ---
            let database_url = required_env!("DATABASE_URL");
            let retry_count = optional_env_parse!("PASSKEY_DB_RETRY_COUNT", u32, 50);
            let acquire_timeout_secs =
                optional_env_parse!("PASSKEY_DB_ACQUIRE_TIMEOUT_SEC", u64, 30);
            let min_connections = optional_env_parse!("PASSKEY_DB_MIN_CONNECTIONS", u32, 2);
            let max_connections = optional_env_parse!("PASSKEY_DB_MAX_CONNECTIONS", u32, 15);

            Ok(Self {
                database_url,
                retry_count,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                min_connections,
                max_connections,
            })
        }
    }
}
pub use database::DatabaseConfig;

// ============================================================
// Redis configuration
// ============================================================

mod redis {
    // ---
    use super::*;

    /// Redis connection used for session values.
    #[derive(Debug, Clone)]
    pub struct RedisConfig {
        /// Redis connection string.
        pub url: String,
    }

    impl RedisConfig {
        /// Builds a [`RedisConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if `PASSKEY_REDIS_URL` is missing.
        pub fn from_env() -> Result<Self> {
            // ---
            let url = required_env!("PASSKEY_REDIS_URL");
            Ok(Self { url })
        }
    }
}
pub use redis::RedisConfig;

// ============================================================
// WebAuthn configuration
// ============================================================

mod webauthn {
    // ---
    use super::*;

    /// WebAuthn / Passkeys configuration.
    ///
    /// These values define the relying party identity and security
    /// origin used during registration and authentication.
    #[derive(Debug, Clone)]
    pub struct WebAuthnConfig {
        /// Relying Party ID (typically a domain name).
        pub rp_id: String,

        /// Human-readable Relying Party name.
        pub rp_name: String,

        /// Fully-qualified origin (e.g. https://example.com).
        pub origin: String,

        /// How long an issued challenge may be answered. Defaults to 300 seconds.
        pub challenge_ttl: Duration,
    }

    impl WebAuthnConfig {
        /// Builds a [`WebAuthnConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if required configuration is missing.
        /// WebAuthn configuration is security-critical and must be
        /// explicitly provided.
        pub fn from_env() -> Result<Self> {
            // ---
            let rp_id = required_env!("PASSKEY_RP_ID");
            let origin = required_env!("PASSKEY_ORIGIN");
            let rp_name = optional_env!("PASSKEY_RP_NAME", "Passkey Share");
            let ttl_secs = optional_env_parse!("PASSKEY_CHALLENGE_TTL_SEC", u64, 300);

            Ok(Self {
                rp_id,
                rp_name,
                origin,
                challenge_ttl: Duration::from_secs(ttl_secs),
            })
        }
    }
}
pub use webauthn::WebAuthnConfig;

// ============================================================
// Session cookie configuration
// ============================================================

mod session {
    // ---
    use super::*;

    #[derive(Debug, Clone)]
    pub struct SessionConfig {
        /// Name of the cookie carrying the session id.
        pub cookie_name: String,

        /// Lifetime of an idle session, refreshed on every request. Defaults to 7 days.
        pub ttl: Duration,

        /// Adds `Secure` to the cookie. Defaults to true; disable for plain-http development.
        pub secure: bool,
    }

    impl SessionConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let ttl_secs = optional_env_parse!("PASSKEY_SESSION_TTL_SEC", u64, 604_800);
            Ok(Self {
                cookie_name: optional_env!("PASSKEY_SESSION_COOKIE", "passkey_session"),
                ttl: Duration::from_secs(ttl_secs),
                secure: optional_env_parse!("PASSKEY_SESSION_SECURE", bool, true),
            })
        }
    }

    impl Default for SessionConfig {
        fn default() -> Self {
            Self {
                cookie_name: "passkey_session".to_string(),
                ttl: Duration::from_secs(604_800),
                secure: true,
            }
        }
    }
}
pub use session::SessionConfig;

// ============================================================
// Documents configuration
// ============================================================

mod documents {
    // ---
    use super::*;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct DocumentsConfig {
        /// Directory served under `/documents/`. Defaults to `./documents`.
        pub root: PathBuf,
    }

    impl DocumentsConfig {
        pub fn from_env() -> Result<Self> {
            Ok(Self {
                root: PathBuf::from(optional_env!("PASSKEY_DOCUMENT_ROOT", "./documents")),
            })
        }
    }
}
pub use documents::DocumentsConfig;

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use anyhow::Result;
    use serial_test::serial;

    fn clear(keys: &[&str]) {
        for key in keys {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_database_url_fails() -> Result<()> {
        // ---
        std::env::remove_var("DATABASE_URL");

        assert_missing_config!(database::DatabaseConfig::from_env(), "DATABASE_URL");

        Ok(())
    }

    #[test]
    #[serial]
    fn database_defaults_applied() -> Result<()> {
        // ---
        let db_url = "postgres://test";
        std::env::set_var("DATABASE_URL", db_url);
        clear(&[
            "PASSKEY_DB_RETRY_COUNT",
            "PASSKEY_DB_ACQUIRE_TIMEOUT_SEC",
            "PASSKEY_DB_MIN_CONNECTIONS",
            "PASSKEY_DB_MAX_CONNECTIONS",
        ]);

        let cfg = database::DatabaseConfig::from_env()?;
        assert_eq!(cfg.database_url, db_url);
        assert_eq!(cfg.retry_count, 50);
        assert_eq!(cfg.acquire_timeout.as_secs(), 30);
        assert_eq!(cfg.min_connections, 2);
        assert_eq!(cfg.max_connections, 15);

        Ok(())
    }

    #[test]
    #[serial]
    fn database_overrides_defaults() -> Result<()> {
        // ---
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("PASSKEY_DB_RETRY_COUNT", "3");
        std::env::set_var("PASSKEY_DB_ACQUIRE_TIMEOUT_SEC", "5");
        std::env::set_var("PASSKEY_DB_MIN_CONNECTIONS", "10");
        std::env::set_var("PASSKEY_DB_MAX_CONNECTIONS", "1000");

        let cfg = database::DatabaseConfig::from_env()?;
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.acquire_timeout.as_secs(), 5);
        assert_eq!(cfg.min_connections, 10);
        assert_eq!(cfg.max_connections, 1000);

        clear(&[
            "PASSKEY_DB_RETRY_COUNT",
            "PASSKEY_DB_ACQUIRE_TIMEOUT_SEC",
            "PASSKEY_DB_MIN_CONNECTIONS",
            "PASSKEY_DB_MAX_CONNECTIONS",
        ]);
        Ok(())
    }

    #[test]
    #[serial]
    fn missing_rp_id_fails() -> Result<()> {
        // ---
        std::env::remove_var("PASSKEY_RP_ID");
        std::env::set_var("PASSKEY_ORIGIN", "https://example.com");

        assert_missing_config!(webauthn::WebAuthnConfig::from_env(), "PASSKEY_RP_ID");

        Ok(())
    }

    #[test]
    #[serial]
    fn redis_sessions_require_url() -> Result<()> {
        // ---
        std::env::set_var("PASSKEY_SESSIONS", "redis");
        std::env::remove_var("PASSKEY_REDIS_URL");

        assert_missing_config!(SessionStoreConfig::from_env(), "PASSKEY_REDIS_URL");

        std::env::remove_var("PASSKEY_SESSIONS");
        Ok(())
    }

    #[test]
    #[serial]
    fn unknown_storage_backend_fails() {
        // ---
        std::env::set_var("PASSKEY_STORAGE", "sqlite");
        let err = StorageConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("sqlite"));
        std::env::remove_var("PASSKEY_STORAGE");
    }

    #[test]
    #[serial]
    fn app_config_from_env_success() -> Result<()> {
        // ---
        clear(&[
            "PASSKEY_STORAGE",
            "PASSKEY_SESSIONS",
            "PASSKEY_RP_NAME",
            "PASSKEY_CHALLENGE_TTL_SEC",
            "PASSKEY_SESSION_COOKIE",
            "PASSKEY_SESSION_TTL_SEC",
            "PASSKEY_SESSION_SECURE",
            "PASSKEY_DOCUMENT_ROOT",
            "PASSKEY_BIND_ADDR",
            "PASSKEY_METRICS_TYPE",
        ]);
        std::env::set_var("PASSKEY_RP_ID", "example.com");
        std::env::set_var("PASSKEY_ORIGIN", "https://example.com");

        let cfg = AppConfig::from_env()?;
        assert_eq!(cfg.webauthn.rp_name, "Passkey Share");
        assert_eq!(cfg.webauthn.challenge_ttl.as_secs(), 300);
        assert!(matches!(cfg.storage, StorageConfig::Memory));
        assert!(matches!(cfg.sessions, SessionStoreConfig::Memory));
        assert_eq!(cfg.session.cookie_name, "passkey_session");
        assert_eq!(cfg.session.ttl.as_secs(), 604_800);
        assert!(cfg.session.secure);
        assert_eq!(cfg.documents.root, std::path::PathBuf::from("./documents"));
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.server.metrics_type, "noop");

        Ok(())
    }
}
