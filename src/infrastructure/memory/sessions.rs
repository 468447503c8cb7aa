use anyhow::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::session::{SessionState, SessionStore};

/// Session values held in process memory with a sliding expiry.
pub struct MemorySessionStore {
    // ---
    ttl: Duration,
    entries: Mutex<HashMap<String, (SessionState, Instant)>>,
}

impl MemorySessionStore {
    // ---
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

fn sweep(entries: &mut HashMap<String, (SessionState, Instant)>) {
    let now = Instant::now();
    entries.retain(|_, (_, expires)| *expires > now);
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    // ---
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        // ---
        let mut entries = self.entries.lock().await;
        sweep(&mut entries);
        Ok(entries.get(session_id).map(|(state, _)| state.clone()))
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        // ---
        let mut entries = self.entries.lock().await;
        sweep(&mut entries);
        entries.insert(
            session_id.to_string(),
            (state.clone(), Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<()> {
        self.entries.lock().await.remove(session_id);
        Ok(())
    }
}
