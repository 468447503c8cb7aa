mod database;
mod documents;
mod memory;
pub mod metrics;
mod sessions;
mod webauthn;

// Re-export the factory functions and backends for easy access
pub use database::{init_database_with_retry, init_database_with_retry_from_env, PostgresRepository};
pub use documents::FsDocumentCatalog;
pub use memory::{MemorySessionStore, MemoryStore, StaticDocumentCatalog};
pub use metrics::{create_noop_metrics, create_prom_metrics};
pub use sessions::RedisSessionStore;
pub use webauthn::{create_webauthn, WebauthnVerifier};
