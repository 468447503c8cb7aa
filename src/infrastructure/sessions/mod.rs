//! Redis-backed session storage.
//!
//! Each session value is one JSON string under `session:{id}`, written with
//! `SET EX` so that Redis expires abandoned sessions on its own. Every save
//! refreshes the expiry.

use anyhow::{Context, Result};
use redis::{AsyncCommands, Client};
use std::time::Duration;

use crate::session::{SessionState, SessionStore};

pub struct RedisSessionStore {
    // ---
    client: Client,
    ttl: Duration,
}

impl RedisSessionStore {
    // ---
    pub fn new(client: Client, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        // ---
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| {
                tracing::error!("Failed to connect to Redis: {:?}", err);
                err
            })
            .context("redis connection failed")
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    // ---
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        // ---
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(session_key(session_id)).await?;

        match value {
            Some(json) => match serde_json::from_str(&json) {
                Ok(state) => Ok(Some(state)),
                Err(e) => {
                    // Unreadable values (older layout) are treated as absent.
                    tracing::warn!("Discarding unreadable session value: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        // ---
        let json = serde_json::to_string(state)?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(session_key(session_id), json, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<()> {
        // ---
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(session_key(session_id)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        // ---
        let mut conn = self.conn().await?;
        let _: String = conn.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(session_key("abc"), "session:abc");
    }

    #[tokio::test]
    async fn unreachable_redis_is_an_error() {
        // ---
        let client = Client::open("redis://invalid-host:6379").unwrap();
        let store = RedisSessionStore::new(client, Duration::from_secs(60));
        assert!(store.load("abc").await.is_err());
        assert!(store.ping().await.is_err());
    }
}
