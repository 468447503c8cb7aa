use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Claim, ClaimOutcome, CounterUpdate, Credential, CredentialRemoval, EntitlementStore, IdentityStore, Invite,
    RegisterableSource, Share, SourceType, User, UserInsert, UserRef,
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    display_name: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            created: r.created_at,
            username: r.username,
            display_name: r.display_name,
            is_admin: r.is_admin,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    // ---
    id: String,
    user_id: Uuid,
    public_key: String,
    counter: i64,
    aaguid: Uuid,
    device_type: String,
    backed_up: bool,
    transports: Vec<String>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = anyhow::Error;

    fn try_from(r: CredentialRow) -> Result<Self> {
        // ---
        Ok(Credential {
            counter: u32::try_from(r.counter)
                .with_context(|| format!("credential {} has counter {}", r.id, r.counter))?,
            id: r.id,
            user_id: r.user_id,
            public_key: r.public_key,
            aaguid: r.aaguid,
            device_type: r.device_type,
            backed_up: r.backed_up,
            transports: r.transports,
            created: r.created_at,
            last_used: r.last_used_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    // ---
    id: Uuid,
    source_type: String,
    is_admin: bool,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    created_by_username: String,
    claimed_at: Option<DateTime<Utc>>,
    claimed_by: Option<Uuid>,
    claimed_by_username: Option<String>,
    backing_url: Option<String>,
    document_title: Option<String>,
    document_type: Option<String>,
    to_username: Option<String>,
    expire_seconds: Option<i64>,
}

impl SourceRow {
    // ---
    fn source(&self, source_type: SourceType) -> Result<RegisterableSource> {
        // ---
        if self.source_type != source_type.as_str() {
            anyhow::bail!(
                "row {} is a {}, not a {}",
                self.id,
                self.source_type,
                source_type.as_str()
            );
        }
        let claim = match (self.claimed_at, self.claimed_by, &self.claimed_by_username) {
            (Some(at), Some(id), Some(username)) => Some(Claim {
                at,
                by: UserRef {
                    id,
                    username: username.clone(),
                },
            }),
            _ => None,
        };
        Ok(RegisterableSource {
            id: self.id,
            source_type,
            is_admin: self.is_admin,
            created: self.created_at,
            created_by: UserRef {
                id: self.created_by,
                username: self.created_by_username.clone(),
            },
            claim,
        })
    }

    fn into_invite(self) -> Result<Invite> {
        Ok(Invite {
            source: self.source(SourceType::Invite)?,
        })
    }

    fn into_share(self) -> Result<Share> {
        // ---
        let source = self.source(SourceType::Share)?;
        Ok(Share {
            source,
            backing_url: self.backing_url.unwrap_or_default(),
            document_title: self.document_title.unwrap_or_default(),
            document_type: self.document_type.unwrap_or_default(),
            to_username: self.to_username,
            expire_duration: self.expire_seconds.map(Duration::seconds),
        })
    }
}

const USER_COLUMNS: &str = "id, username, display_name, is_admin, created_at";

const CREDENTIAL_COLUMNS: &str = "id, user_id, public_key, counter, aaguid, device_type, \
     backed_up, transports, created_at, last_used_at";

const SOURCE_SELECT: &str = "SELECT s.id, s.source_type, s.is_admin, s.created_at, \
     s.created_by, c.username AS created_by_username, \
     s.claimed_at, s.claimed_by, k.username AS claimed_by_username, \
     s.backing_url, s.document_title, s.document_type, s.to_username, s.expire_seconds \
     FROM registerable_sources s \
     JOIN users c ON c.id = s.created_by \
     LEFT JOIN users k ON k.id = s.claimed_by";

pub struct PostgresRepository {
    // ---
    pool: PgPool,
}

impl PostgresRepository {
    // ---
    pub fn new(pool: PgPool) -> Self {
        // ---
        Self { pool }
    }

    async fn find_source(&self, id: Uuid, source_type: SourceType) -> Result<Option<SourceRow>> {
        // ---
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "{SOURCE_SELECT} WHERE s.id = $1 AND s.source_type = $2"
        ))
        .bind(id)
        .bind(source_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Compare-and-set on the "unclaimed" precondition.
    async fn claim_source(
        &self,
        id: Uuid,
        source_type: SourceType,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        // ---
        let updated = sqlx::query(
            "UPDATE registerable_sources SET claimed_at = $3, claimed_by = $4
             WHERE id = $1 AND source_type = $2 AND claimed_at IS NULL",
        )
        .bind(id)
        .bind(source_type.as_str())
        .bind(at)
        .bind(claimer.id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }
        Ok(match self.find_source(id, source_type).await? {
            Some(_) => ClaimOutcome::AlreadyClaimed,
            None => ClaimOutcome::NotFound,
        })
    }
}

#[async_trait::async_trait]
impl IdentityStore for PostgresRepository {
    // ---
    async fn insert_user_with_credential(
        &self,
        user: &User,
        credential: &Credential,
    ) -> Result<UserInsert> {
        // ---
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO users (id, username, display_name, is_admin, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.is_admin)
        .bind(user.created)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(UserInsert::UsernameTaken);
        }

        insert_credential_row(&mut *tx, credential).await?;
        tx.commit().await?;
        Ok(UserInsert::Inserted)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        // ---
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        // ---
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        // ---
        sqlx::query("UPDATE users SET display_name = $1, is_admin = $2 WHERE id = $3")
            .bind(&user.display_name)
            .bind(user.is_admin)
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<()> {
        insert_credential_row(&self.pool, credential).await
    }

    async fn find_credential(&self, credential_id: &str) -> Result<Option<Credential>> {
        // ---
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn find_user_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<Option<Credential>> {
        // ---
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1 AND user_id = $2"
        ))
        .bind(credential_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn credentials_for_user(&self, user_id: Uuid) -> Result<Vec<Credential>> {
        // ---
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
             WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn update_credential(&self, credential: &Credential) -> Result<CounterUpdate> {
        // ---
        let updated = sqlx::query(
            "UPDATE credentials
             SET public_key = $1, counter = $2, backed_up = $3, last_used_at = $4
             WHERE id = $5 AND counter <= $2",
        )
        .bind(&credential.public_key)
        .bind(i64::from(credential.counter))
        .bind(credential.backed_up)
        .bind(credential.last_used)
        .bind(&credential.id)
        .execute(&self.pool)
        .await?;

        Ok(match updated.rows_affected() {
            0 => CounterUpdate::Stale,
            _ => CounterUpdate::Updated,
        })
    }

    async fn delete_credential(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<CredentialRemoval> {
        // ---
        let mut tx = self.pool.begin().await?;

        // Serializes removals for one user so two of them cannot both pass
        // the last-credential check.
        let locked = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(CredentialRemoval::NotFound);
        }

        let owned: Vec<String> =
            sqlx::query_scalar("SELECT id FROM credentials WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;

        if !owned.iter().any(|id| id == credential_id) {
            return Ok(CredentialRemoval::NotFound);
        }
        if owned.len() <= 1 {
            return Ok(CredentialRemoval::LastCredential);
        }

        sqlx::query("DELETE FROM credentials WHERE id = $1 AND user_id = $2")
            .bind(credential_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(CredentialRemoval::Removed)
    }
}

async fn insert_credential_row<'e, E>(executor: E, credential: &Credential) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    // ---
    sqlx::query(
        "INSERT INTO credentials
             (id, user_id, public_key, counter, aaguid, device_type, backed_up,
              transports, created_at, last_used_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&credential.id)
    .bind(credential.user_id)
    .bind(&credential.public_key)
    .bind(i64::from(credential.counter))
    .bind(credential.aaguid)
    .bind(&credential.device_type)
    .bind(credential.backed_up)
    .bind(&credential.transports)
    .bind(credential.created)
    .bind(credential.last_used)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl EntitlementStore for PostgresRepository {
    // ---
    async fn insert_invite(&self, invite: &Invite) -> Result<()> {
        // ---
        let source = &invite.source;
        sqlx::query(
            "INSERT INTO registerable_sources (id, source_type, is_admin, created_at, created_by)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(source.id)
        .bind(SourceType::Invite.as_str())
        .bind(source.is_admin)
        .bind(source.created)
        .bind(source.created_by.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_invite(&self, id: Uuid) -> Result<Option<Invite>> {
        self.find_source(id, SourceType::Invite)
            .await?
            .map(SourceRow::into_invite)
            .transpose()
    }

    async fn claim_invite(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        self.claim_source(id, SourceType::Invite, claimer, at).await
    }

    async fn invites_created_by(&self, user_id: Uuid) -> Result<Vec<Invite>> {
        // ---
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "{SOURCE_SELECT} WHERE s.source_type = 'invite' AND s.created_by = $1
             ORDER BY s.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::into_invite).collect()
    }

    async fn insert_share(&self, share: &Share) -> Result<()> {
        // ---
        let source = &share.source;
        sqlx::query(
            "INSERT INTO registerable_sources
                 (id, source_type, is_admin, created_at, created_by, backing_url,
                  document_title, document_type, to_username, expire_seconds)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(source.id)
        .bind(SourceType::Share.as_str())
        .bind(source.is_admin)
        .bind(source.created)
        .bind(source.created_by.id)
        .bind(&share.backing_url)
        .bind(&share.document_title)
        .bind(&share.document_type)
        .bind(&share.to_username)
        .bind(share.expire_duration.map(|d| d.num_seconds()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_share(&self, id: Uuid) -> Result<Option<Share>> {
        self.find_source(id, SourceType::Share)
            .await?
            .map(SourceRow::into_share)
            .transpose()
    }

    async fn claim_share(
        &self,
        id: Uuid,
        claimer: &UserRef,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        self.claim_source(id, SourceType::Share, claimer, at).await
    }

    async fn shares_for_user(&self, user_id: Uuid) -> Result<Vec<Share>> {
        // ---
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "{SOURCE_SELECT} WHERE s.source_type = 'share'
             AND (s.created_by = $1 OR s.claimed_by = $1)
             ORDER BY s.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::into_share).collect()
    }
}
