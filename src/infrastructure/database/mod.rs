//! PostgreSQL persistence for identities and entitlements.

mod postgres_repository;


use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

pub use postgres_repository::PostgresRepository;

const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Tables are created on startup when missing. Claim time and claimer are
/// constrained to appear together.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id           UUID PRIMARY KEY,
        username     TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        is_admin     BOOLEAN NOT NULL DEFAULT FALSE,
        created_at   TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS credentials (
        id           TEXT PRIMARY KEY,
        user_id      UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        public_key   TEXT NOT NULL,
        counter      BIGINT NOT NULL,
        aaguid       UUID NOT NULL,
        device_type  TEXT NOT NULL,
        backed_up    BOOLEAN NOT NULL,
        transports   TEXT[] NOT NULL DEFAULT '{}',
        created_at   TIMESTAMPTZ NOT NULL,
        last_used_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS credentials_user_id_idx ON credentials (user_id)",
    "CREATE TABLE IF NOT EXISTS registerable_sources (
        id             UUID PRIMARY KEY,
        source_type    TEXT NOT NULL CHECK (source_type IN ('invite', 'share')),
        is_admin       BOOLEAN NOT NULL DEFAULT FALSE,
        created_at     TIMESTAMPTZ NOT NULL,
        created_by     UUID NOT NULL REFERENCES users(id),
        claimed_at     TIMESTAMPTZ,
        claimed_by     UUID REFERENCES users(id),
        backing_url    TEXT,
        document_title TEXT,
        document_type  TEXT,
        to_username    TEXT,
        expire_seconds BIGINT,
        CHECK ((claimed_at IS NULL) = (claimed_by IS NULL))
    )",
    "CREATE INDEX IF NOT EXISTS registerable_sources_created_by_idx
        ON registerable_sources (created_by)",
];

/// Connects to PostgreSQL, retrying while the server comes up, and makes
/// sure the schema exists.
pub async fn init_database_with_retry(config: &DatabaseConfig) -> Result<PgPool> {
    // ---
    let attempts = config.retry_count.max(1);
    let mut attempt = 1;
    let pool = loop {
        match PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    "Database connection attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    e
                );
                tokio::time::sleep(CONNECT_BACKOFF).await;
                attempt += 1;
            }
            Err(e) => return Err(e).context("could not connect to database"),
        }
    };

    for statement in SCHEMA {
        sqlx::query(*statement)
            .execute(&pool)
            .await
            .context("failed to create database schema")?;
    }

    tracing::info!("Database ready after {} attempt(s)", attempt);
    Ok(pool)
}

/// Same as [`init_database_with_retry`], with configuration read from the
/// environment.
pub async fn init_database_with_retry_from_env() -> Result<PgPool> {
    init_database_with_retry(&DatabaseConfig::from_env()?).await
}
