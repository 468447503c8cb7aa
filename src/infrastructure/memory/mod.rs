//! In-memory backends.
//!
//! Used for development (`PASSKEY_STORAGE=memory`, `PASSKEY_SESSIONS=memory`)
//! and by the test suites. Each store keeps its data behind a single async
//! mutex, which makes every trait operation one critical section: claims are
//! compare-and-set and last-credential checks cannot race.

mod documents;
mod sessions;
mod store;

pub use documents::StaticDocumentCatalog;
pub use sessions::MemorySessionStore;
pub use store::MemoryStore;
