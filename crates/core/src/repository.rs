//! C7: repository adapter (spec §4.7).
//!
//! No teacher analogue — the teacher server is stateless. Grounded in the
//! pack's Postgres stack (`sqlx` with `runtime-tokio`/`postgres`/`chrono`/
//! `uuid`/`tls-rustls`, as seen in `other_examples/penserai-acteon`).

use crate::error::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub found: bool,
    pub is_active: bool,
    pub email_verified: bool,
    pub email: Option<String>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserInput {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn lookup_user_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Uuid, bool)>, RepositoryError>;

    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<(Uuid, bool)>, RepositoryError>;

    async fn read_user(&self, user_id: Uuid) -> Result<UserRecord, RepositoryError>;

    async fn create_user(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        fingerprint: Option<&str>,
        active: bool,
    ) -> Result<(), RepositoryError>;

    async fn update_user_set_email_verified(&self, user_id: Uuid) -> Result<(), RepositoryError>;

    async fn read_one_time_secret(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(String, i64)>, RepositoryError>;

    async fn write_one_time_secret(
        &self,
        user_id: Uuid,
        secret: &str,
        iat: i64,
    ) -> Result<(), RepositoryError>;

    async fn delete_one_time_secret(&self, user_id: Uuid) -> Result<(), RepositoryError>;

    async fn write_prompt(&self, input: &UserInput) -> Result<(), RepositoryError>;

    async fn write_model_prediction(&self, output: &ModelOutput) -> Result<(), RepositoryError>;
}

/// Assembles a libpq-style keyword connection string per spec §4.7.
pub fn build_connection_string(
    user: &str,
    dbname: &str,
    host: &str,
    port: u16,
    password: &str,
    sslmode: &str,
) -> Result<String, RepositoryError> {
    match sslmode {
        "" | "disable" | "verify-full" => {}
        other => {
            return Err(RepositoryError::Database(format!(
                "unsupported sslmode: {other}"
            )))
        }
    }
    let mut parts = vec![
        format!("user={user}"),
        format!("dbname={dbname}"),
        format!("host={host}"),
        format!("port={port}"),
        format!("password={password}"),
    ];
    if !sslmode.is_empty() {
        parts.push(format!("sslmode={sslmode}"));
    }
    Ok(parts.join(" "))
}

/// Postgres-backed implementation.
pub struct PostgresRepository {
    pool: sqlx::PgPool,
    table_prompt: String,
    table_prediction: String,
}

impl PostgresRepository {
    pub fn new(pool: sqlx::PgPool, table_prompt: String, table_prediction: String) -> Self {
        Self {
            pool,
            table_prompt,
            table_prediction,
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn lookup_user_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Uuid, bool)>, RepositoryError> {
        let row: Option<(Uuid, bool)> =
            sqlx::query_as("SELECT user_id, is_active FROM \"user\" WHERE fingerprint = $1")
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row)
    }

    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<(Uuid, bool)>, RepositoryError> {
        let row: Option<(Uuid, bool)> =
            sqlx::query_as("SELECT user_id, is_active FROM \"user\" WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row)
    }

    async fn read_user(&self, user_id: Uuid) -> Result<UserRecord, RepositoryError> {
        let row: Option<(bool, bool, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT is_active, email_verified, email, fingerprint FROM \"user\" WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(match row {
            Some((is_active, email_verified, email, fingerprint)) => UserRecord {
                found: true,
                is_active,
                email_verified,
                email,
                fingerprint,
            },
            None => UserRecord {
                found: false,
                is_active: false,
                email_verified: false,
                email: None,
                fingerprint: None,
            },
        })
    }

    async fn create_user(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        fingerprint: Option<&str>,
        active: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO \"user\" (user_id, email, fingerprint, is_active, email_verified) \
             VALUES ($1, $2, $3, $4, false)",
        )
        .bind(user_id)
        .bind(email)
        .bind(fingerprint)
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => RepositoryError::Conflict,
            other => RepositoryError::Database(other.to_string()),
        })?;
        Ok(())
    }

    async fn update_user_set_email_verified(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE \"user\" SET email_verified = true WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn read_one_time_secret(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(String, i64)>, RepositoryError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT secret, iat FROM one_time_secret WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row)
    }

    async fn write_one_time_secret(
        &self,
        user_id: Uuid,
        secret: &str,
        iat: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO one_time_secret (user_id, secret, iat) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET secret = EXCLUDED.secret, iat = EXCLUDED.iat",
        )
        .bind(user_id)
        .bind(secret)
        .bind(iat)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_one_time_secret(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM one_time_secret WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn write_prompt(&self, input: &UserInput) -> Result<(), RepositoryError> {
        let query = format!(
            "INSERT INTO {} (request_id, user_id, prompt, timestamp) VALUES ($1, $2, $3, $4)",
            self.table_prompt
        );
        sqlx::query(&query)
            .bind(input.request_id)
            .bind(input.user_id)
            .bind(&input.prompt)
            .bind(input.timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn write_model_prediction(&self, output: &ModelOutput) -> Result<(), RepositoryError> {
        let query = format!(
            "INSERT INTO {} (request_id, user_id, response, timestamp, model, prompt_tokens, completion_tokens) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table_prediction
        );
        sqlx::query(&query)
            .bind(output.request_id)
            .bind(output.user_id)
            .bind(&output.response)
            .bind(output.timestamp)
            .bind(&output.model)
            .bind(output.prompt_tokens as i32)
            .bind(output.completion_tokens as i32)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(())
    }
}

#[derive(Default, Clone)]
struct InMemoryUser {
    is_active: bool,
    email_verified: bool,
    email: Option<String>,
    fingerprint: Option<String>,
}

/// In-memory test double. Spec §9 calls out that capabilities "may be
/// mocked wholesale" — this is that mock, backing the CIAM engine's unit
/// tests; it is never wired into the production binary.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<HashMap<Uuid, InMemoryUser>>,
    secrets: Mutex<HashMap<Uuid, (String, i64)>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn lookup_user_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Uuid, bool)>, RepositoryError> {
        let users = self.users.lock().await;
        Ok(users.iter().find_map(|(id, u)| {
            (u.fingerprint.as_deref() == Some(fingerprint)).then_some((*id, u.is_active))
        }))
    }

    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<(Uuid, bool)>, RepositoryError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find_map(|(id, u)| (u.email.as_deref() == Some(email)).then_some((*id, u.is_active))))
    }

    async fn read_user(&self, user_id: Uuid) -> Result<UserRecord, RepositoryError> {
        let users = self.users.lock().await;
        Ok(match users.get(&user_id) {
            Some(u) => UserRecord {
                found: true,
                is_active: u.is_active,
                email_verified: u.email_verified,
                email: u.email.clone(),
                fingerprint: u.fingerprint.clone(),
            },
            None => UserRecord {
                found: false,
                is_active: false,
                email_verified: false,
                email: None,
                fingerprint: None,
            },
        })
    }

    async fn create_user(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        fingerprint: Option<&str>,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user_id) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(
            user_id,
            InMemoryUser {
                is_active: active,
                email_verified: false,
                email: email.map(String::from),
                fingerprint: fingerprint.map(String::from),
            },
        );
        Ok(())
    }

    async fn update_user_set_email_verified(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        let u = users.get_mut(&user_id).ok_or(RepositoryError::NotFound)?;
        u.email_verified = true;
        Ok(())
    }

    async fn read_one_time_secret(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(String, i64)>, RepositoryError> {
        Ok(self.secrets.lock().await.get(&user_id).cloned())
    }

    async fn write_one_time_secret(
        &self,
        user_id: Uuid,
        secret: &str,
        iat: i64,
    ) -> Result<(), RepositoryError> {
        self.secrets
            .lock()
            .await
            .insert(user_id, (secret.to_string(), iat));
        Ok(())
    }

    async fn delete_one_time_secret(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        self.secrets.lock().await.remove(&user_id);
        Ok(())
    }

    async fn write_prompt(&self, _input: &UserInput) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn write_model_prediction(&self, _output: &ModelOutput) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_assembly() {
        let s = build_connection_string("u", "db", "localhost", 5432, "p", "disable").unwrap();
        assert_eq!(s, "user=u dbname=db host=localhost port=5432 password=p sslmode=disable");
    }

    #[test]
    fn connection_string_empty_sslmode_omits_param() {
        let s = build_connection_string("u", "db", "localhost", 5432, "p", "").unwrap();
        assert!(!s.contains("sslmode"));
    }

    #[test]
    fn connection_string_rejects_unknown_sslmode() {
        assert!(build_connection_string("u", "db", "localhost", 5432, "p", "require").is_err());
    }

    #[tokio::test]
    async fn in_memory_repository_create_then_lookup() {
        let repo = InMemoryRepository::new();
        let id = Uuid::new_v4();
        repo.create_user(id, Some("a@b.com"), None, true).await.unwrap();
        let found = repo.lookup_user_by_email("a@b.com").await.unwrap();
        assert_eq!(found, Some((id, true)));
    }

    #[tokio::test]
    async fn in_memory_repository_duplicate_create_conflicts() {
        let repo = InMemoryRepository::new();
        let id = Uuid::new_v4();
        repo.create_user(id, Some("a@b.com"), None, true).await.unwrap();
        let err = repo.create_user(id, Some("a@b.com"), None, true).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict));
    }
}
