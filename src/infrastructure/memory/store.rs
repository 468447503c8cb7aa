use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Claim, ClaimOutcome, CounterUpdate, Credential, CredentialRemoval, EntitlementStore,
    IdentityStore, Invite, Share, User, UserInsert, UserRef,
};

#[derive(Default)]
struct Tables {
    // ---
    users: HashMap<Uuid, User>,
    /// Credentials in insertion order.
    credentials: Vec<Credential>,
    invites: HashMap<Uuid, Invite>,
    shares: HashMap<Uuid, Share>,
}

/// Identity and entitlement store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }
}

fn set_claim(claim: &mut Option<Claim>, claimer: &UserRef, at: DateTime<Utc>) -> ClaimOutcome {
    // ---
    if claim.is_some() {
        return ClaimOutcome::AlreadyClaimed;
    }
    *claim = Some(Claim {
        at,
        by: claimer.clone(),
    });
    ClaimOutcome::Claimed
}

#[async_trait::async_trait]
impl IdentityStore for MemoryStore {
    // ---
    async fn insert_user_with_credential(
        &self,
        user: &User,
        credential: &Credential,
    ) -> Result<UserInsert> {
        // ---
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Ok(UserInsert::UsernameTaken);
        }
        if tables.credentials.iter().any(|c| c.id == credential.id) {
            bail!("credential {} already exists", credential.id);
        }
        tables.users.insert(user.id, user.clone());
        tables.credentials.push(credential.clone());
        Ok(UserInsert::Inserted)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        // ---
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        // ---
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                stored.display_name = user.display_name.clone();
                stored.is_admin = user.is_admin;
                Ok(())
            }
            None => bail!("user {} does not exist", user.id),
        }
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<()> {
        // ---
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&credential.user_id) {
            bail!("user {} does not exist", credential.user_id);
        }
        if tables.credentials.iter().any(|c| c.id == credential.id) {
            bail!("credential {} already exists", credential.id);
        }
        tables.credentials.push(credential.clone());
        Ok(())
    }

    async fn find_credential(&self, credential_id: &str) -> Result<Option<Credential>> {
        // ---
        let tables = self.tables.lock().await;
        Ok(tables
            .credentials
            .iter()
            .find(|c| c.id == credential_id)
            .cloned())
    }

    async fn find_user_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<Option<Credential>> {
        // ---
        let tables = self.tables.lock().await;
        Ok(tables
            .credentials
            .iter()
            .find(|c| c.user_id == user_id && c.id == credential_id)
            .cloned())
    }

    async fn credentials_for_user(&self, user_id: Uuid) -> Result<Vec<Credential>> {
        // ---
        let tables = self.tables.lock().await;
        Ok(tables
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_credential(&self, credential: &Credential) -> Result<CounterUpdate> {
        // ---
        let mut tables = self.tables.lock().await;
        match tables.credentials.iter_mut().find(|c| c.id == credential.id) {
            Some(stored) if stored.counter <= credential.counter => {
                stored.public_key = credential.public_key.clone();
                stored.counter = credential.counter;
                stored.backed_up = credential.backed_up;
                stored.last_used = credential.last_used;
                Ok(CounterUpdate::Updated)
            }
            _ => Ok(CounterUpdate::Stale),
        }
    }

    async fn delete_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<CredentialRemoval> {
        // ---
        let mut tables = self.tables.lock().await;
        let owned = tables
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .count();
        let Some(index) = tables
            .credentials
            .iter()
            .position(|c| c.user_id == user_id && c.id == credential_id)
        else {
            return Ok(CredentialRemoval::NotFound);
        };
        if owned <= 1 {
            return Ok(CredentialRemoval::LastCredential);
        }
        tables.credentials.remove(index);
        Ok(CredentialRemoval::Removed)
    }
}

#[async_trait::async_trait]
impl EntitlementStore for MemoryStore {
    // ---
    async fn insert_invite(&self, invite: &Invite) -> Result<()> {
        // ---
        let mut tables = self.tables.lock().await;
        tables.invites.insert(invite.source.id, invite.clone());
        Ok(())
    }

    async fn find_invite(&self, id: Uuid) -> Result<Option<Invite>> {
        Ok(self.tables.lock().await.invites.get(&id).cloned())
    }

    async fn claim_invite(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        // ---
        let mut tables = self.tables.lock().await;
        Ok(match tables.invites.get_mut(&id) {
            Some(invite) => set_claim(&mut invite.source.claim, claimer, at),
            None => ClaimOutcome::NotFound,
        })
    }

    async fn invites_created_by(&self, user_id: Uuid) -> Result<Vec<Invite>> {
        // ---
        let tables = self.tables.lock().await;
        let mut invites: Vec<Invite> = tables
            .invites
            .values()
            .filter(|i| i.source.is_created_by(user_id))
            .cloned()
            .collect();
        invites.sort_by(|a, b| b.source.created.cmp(&a.source.created));
        Ok(invites)
    }

    async fn insert_share(&self, share: &Share) -> Result<()> {
        // ---
        let mut tables = self.tables.lock().await;
        tables.shares.insert(share.source.id, share.clone());
        Ok(())
    }

    async fn find_share(&self, id: Uuid) -> Result<Option<Share>> {
        Ok(self.tables.lock().await.shares.get(&id).cloned())
    }

    async fn claim_share(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        // ---
        let mut tables = self.tables.lock().await;
        Ok(match tables.shares.get_mut(&id) {
            Some(share) => set_claim(&mut share.source.claim, claimer, at),
            None => ClaimOutcome::NotFound,
        })
    }

    async fn shares_for_user(&self, user_id: Uuid) -> Result<Vec<Share>> {
        // ---
        let tables = self.tables.lock().await;
        let mut shares: Vec<Share> = tables
            .shares
            .values()
            .filter(|s| s.source.is_created_by(user_id) || s.source.is_claimed_by(user_id))
            .cloned()
            .collect();
        shares.sort_by(|a, b| b.source.created.cmp(&a.source.created));
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::VerifiedCredential;
    use std::sync::Arc;

    fn credential(id: &str, user: &User) -> Credential {
        // ---
        VerifiedCredential {
            id: id.to_string(),
            public_key: "cGs".to_string(),
            counter: 0,
            aaguid: Uuid::nil(),
            device_type: "singleDevice".to_string(),
            backed_up: false,
            transports: vec![],
        }
        .into_credential(user.id)
    }

    #[tokio::test]
    async fn counter_never_goes_backwards() {
        // ---
        let store = MemoryStore::new();
        let user = User::new("Kili".to_string(), "Kili".to_string());
        let original = credential("AQ", &user);
        store
            .insert_user_with_credential(&user, &original)
            .await
            .unwrap();

        let at = |counter: u32| Credential {
            counter,
            ..original.clone()
        };
        assert_eq!(store.update_credential(&at(6)).await.unwrap(), CounterUpdate::Updated);
        assert_eq!(store.update_credential(&at(5)).await.unwrap(), CounterUpdate::Stale);
        assert_eq!(store.update_credential(&at(6)).await.unwrap(), CounterUpdate::Updated);

        let stored = store.find_credential("AQ").await.unwrap().unwrap();
        assert_eq!(stored.counter, 6);

        let gone = credential("Aw", &user);
        assert_eq!(store.update_credential(&gone).await.unwrap(), CounterUpdate::Stale);
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        // ---
        let store = MemoryStore::new();
        let first = User::new("Fili".to_string(), "Fili".to_string());
        let second = User::new("Fili".to_string(), "Other".to_string());

        assert_eq!(
            store
                .insert_user_with_credential(&first, &credential("AQ", &first))
                .await
                .unwrap(),
            UserInsert::Inserted
        );
        assert_eq!(
            store
                .insert_user_with_credential(&second, &credential("Ag", &second))
                .await
                .unwrap(),
            UserInsert::UsernameTaken
        );
        assert!(store.find_user_by_id(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_credential_is_kept() {
        // ---
        let store = MemoryStore::new();
        let user = User::new("Kili".to_string(), "Kili".to_string());
        store
            .insert_user_with_credential(&user, &credential("AQ", &user))
            .await
            .unwrap();
        store.insert_credential(&credential("Ag", &user)).await.unwrap();

        assert_eq!(
            store.delete_credential(user.id, "AQ").await.unwrap(),
            CredentialRemoval::Removed
        );
        assert_eq!(
            store.delete_credential(user.id, "Ag").await.unwrap(),
            CredentialRemoval::LastCredential
        );
        assert_eq!(
            store.delete_credential(user.id, "Aw").await.unwrap(),
            CredentialRemoval::NotFound
        );
        assert_eq!(store.credentials_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn credential_without_user_fails() {
        // ---
        let store = MemoryStore::new();
        let ghost = User::new("Ori".to_string(), "Ori".to_string());
        assert!(store.insert_credential(&credential("AQ", &ghost)).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let creator = User::new("Balin".to_string(), "Balin".to_string());
        let invite = Invite::new(creator.user_ref(), false);
        store.insert_invite(&invite).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            let id = invite.source.id;
            handles.push(tokio::spawn(async move {
                let claimer = UserRef {
                    id: Uuid::new_v4(),
                    username: format!("claimer{n}"),
                };
                store.claim_invite(id, &claimer, Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Claimed {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
