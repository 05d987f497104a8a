/*
 * Responsibility
 * - users テーブル向け SQLx 操作 (IdentityStore の Postgres 実装)
 * - PgPool を受け取り find / create / update / destroy を提供
 * - unique violation は RepoError::Conflict に変換
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::identity::{Identity, IdentityStore, NewIdentityRecord};

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    roles: String,
    session_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for Identity {
    fn from(row: UserRow) -> Self {
        Identity {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            roles: row.roles,
            session_id: row.session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, roles, session_id, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Identity::from))
    }

    async fn find_by_session(&self, session_id: Uuid) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, roles, session_id, created_at, updated_at
            FROM users
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Identity::from))
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, roles, session_id, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Identity::from))
    }

    async fn list(&self) -> RepoResult<Vec<Identity>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, roles, session_id, created_at, updated_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Identity::from).collect())
    }

    async fn create(&self, new: NewIdentityRecord) -> RepoResult<Identity> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, email, password_hash, roles)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, roles, session_id, created_at, updated_at
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.roles)
        .fetch_one(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(row.into())
    }

    async fn update(&self, identity: &Identity) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET
                email = $2,
                password_hash = $3,
                roles = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, password_hash, roles, session_id, created_at, updated_at
            "#,
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.roles)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(row.map(Identity::from))
    }

    async fn set_session(
        &self,
        id: Uuid,
        session_id: Option<Uuid>,
    ) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET session_id = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, password_hash, roles, session_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(row.map(Identity::from))
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> RepoResult<Option<Identity>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, password_hash, roles, session_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Identity::from))
    }

    async fn destroy(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
