//! Durable Postgres-backed policy store.
//!
//! One table per keyed collection (see `db/schema.sql`). Queries are plain
//! SQL; single-row writes are atomic, and the rate-ledger replacement runs
//! in a transaction so readers never observe a half-written sequence.
//!
//! Sessions are singleton per client context, so the pool is paired with a
//! context key (e.g. a device or cookie id) chosen by the host per caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{InvitationRecord, InvitationStatus, OtpChallenge, PolicyStore};
use crate::types::Session;

pub struct PgPolicyStore {
    pool: PgPool,
    session_context: String,
}

impl PgPolicyStore {
    #[must_use]
    pub fn new(pool: PgPool, session_context: String) -> Self {
        Self {
            pool,
            session_context,
        }
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn is_internal(&self, email: &str) -> Result<bool> {
        let query = "SELECT 1 FROM internal_emails WHERE email = $1 LIMIT 1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check internal allowlist")?;
        Ok(row.is_some())
    }

    async fn add_internal(&self, email: &str) -> Result<()> {
        let query = r"
            INSERT INTO internal_emails (email)
            VALUES ($1)
            ON CONFLICT (email) DO NOTHING
        ";
        sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to add internal email")?;
        Ok(())
    }

    async fn invited_collections(&self, email: &str) -> Result<Vec<String>> {
        let query = r"
            SELECT collection_id
            FROM invited_collections
            WHERE email = $1
            ORDER BY collection_id
        ";
        let rows = sqlx::query(query)
            .bind(email)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load invited collections")?;
        Ok(rows.iter().map(|row| row.get("collection_id")).collect())
    }

    async fn add_invited_collection(&self, email: &str, collection_id: &str) -> Result<()> {
        // Re-inviting the same pair is a no-op.
        let query = r"
            INSERT INTO invited_collections (email, collection_id)
            VALUES ($1, $2)
            ON CONFLICT (email, collection_id) DO NOTHING
        ";
        sqlx::query(query)
            .bind(email)
            .bind(collection_id)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to add invited collection")?;
        Ok(())
    }

    async fn is_verified(&self, email: &str) -> Result<bool> {
        let query = "SELECT 1 FROM email_verification WHERE email = $1 LIMIT 1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check verification flag")?;
        Ok(row.is_some())
    }

    async fn set_verified(&self, email: &str) -> Result<()> {
        let query = r"
            INSERT INTO email_verification (email)
            VALUES ($1)
            ON CONFLICT (email) DO NOTHING
        ";
        sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to set verification flag")?;
        Ok(())
    }

    async fn otp_challenge(&self, email: &str) -> Result<Option<OtpChallenge>> {
        let query = r"
            SELECT code, expires_at_ms, attempts
            FROM otp_challenges
            WHERE email = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load OTP challenge")?;
        Ok(row.map(|row| {
            let attempts: i32 = row.get("attempts");
            OtpChallenge {
                code: row.get("code"),
                expires_at_ms: row.get("expires_at_ms"),
                attempts: u32::try_from(attempts).unwrap_or(0),
            }
        }))
    }

    async fn put_otp_challenge(&self, email: &str, challenge: &OtpChallenge) -> Result<()> {
        // A new request overwrites any prior challenge for the email.
        let query = r"
            INSERT INTO otp_challenges (email, code, expires_at_ms, attempts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET code = $2,
                expires_at_ms = $3,
                attempts = $4
        ";
        sqlx::query(query)
            .bind(email)
            .bind(&challenge.code)
            .bind(challenge.expires_at_ms)
            .bind(i32::try_from(challenge.attempts).unwrap_or(i32::MAX))
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to store OTP challenge")?;
        Ok(())
    }

    async fn delete_otp_challenge(&self, email: &str) -> Result<()> {
        let query = "DELETE FROM otp_challenges WHERE email = $1";
        sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete OTP challenge")?;
        Ok(())
    }

    async fn rate_ledger(&self, email: &str) -> Result<Vec<i64>> {
        let query = r"
            SELECT requested_at_ms
            FROM otp_request_log
            WHERE email = $1
            ORDER BY requested_at_ms
        ";
        let rows = sqlx::query(query)
            .bind(email)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load rate ledger")?;
        Ok(rows.iter().map(|row| row.get("requested_at_ms")).collect())
    }

    async fn put_rate_ledger(&self, email: &str, stamps: &[i64]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rate ledger transaction")?;

        let query = "DELETE FROM otp_request_log WHERE email = $1";
        sqlx::query(query)
            .bind(email)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to clear rate ledger")?;

        let query = "INSERT INTO otp_request_log (email, requested_at_ms) VALUES ($1, $2)";
        for stamp in stamps {
            sqlx::query(query)
                .bind(email)
                .bind(stamp)
                .execute(&mut *tx)
                .instrument(query_span("INSERT", query))
                .await
                .context("failed to append rate ledger entry")?;
        }

        tx.commit().await.context("commit rate ledger transaction")?;
        Ok(())
    }

    async fn invitation(&self, token: &str) -> Result<Option<InvitationRecord>> {
        let query = r"
            SELECT email, collection_id, expires_at_ms, status, accepted_by
            FROM invitations
            WHERE token = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load invitation")?;
        Ok(row.map(|row| {
            let status: String = row.get("status");
            InvitationRecord {
                email: row.get("email"),
                collection_id: row.get("collection_id"),
                expires_at_ms: row.get("expires_at_ms"),
                status: InvitationStatus::from_str(&status).unwrap_or(InvitationStatus::Pending),
                accepted_by: row.get("accepted_by"),
            }
        }))
    }

    async fn put_invitation(&self, token: &str, record: &InvitationRecord) -> Result<()> {
        let query = r"
            INSERT INTO invitations (token, email, collection_id, expires_at_ms, status, accepted_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (token) DO UPDATE
            SET email = $2,
                collection_id = $3,
                expires_at_ms = $4,
                status = $5,
                accepted_by = $6
        ";
        sqlx::query(query)
            .bind(token)
            .bind(&record.email)
            .bind(&record.collection_id)
            .bind(record.expires_at_ms)
            .bind(record.status.as_str())
            .bind(record.accepted_by.as_deref())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to store invitation")?;
        Ok(())
    }

    async fn delete_invitation(&self, token: &str) -> Result<()> {
        let query = "DELETE FROM invitations WHERE token = $1";
        sqlx::query(query)
            .bind(token)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete invitation")?;
        Ok(())
    }

    async fn session(&self) -> Result<Option<Session>> {
        let query = r"
            SELECT user_id, email
            FROM client_sessions
            WHERE context = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(&self.session_context)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load session")?;
        Ok(row.map(|row| Session {
            user_id: row.get("user_id"),
            email: row.get("email"),
        }))
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        let query = r"
            INSERT INTO client_sessions (context, user_id, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (context) DO UPDATE
            SET user_id = $2,
                email = $3
        ";
        sqlx::query(query)
            .bind(&self.session_context)
            .bind(&session.user_id)
            .bind(&session.email)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to store session")?;
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        // Logout is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM client_sessions WHERE context = $1";
        sqlx::query(query)
            .bind(&self.session_context)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to clear session")?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin wipe transaction")?;
        for table in [
            "internal_emails",
            "invited_collections",
            "email_verification",
            "otp_challenges",
            "otp_request_log",
            "invitations",
            "client_sessions",
        ] {
            let statement = format!("DELETE FROM {table}");
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to wipe {table}"))?;
        }
        tx.commit().await.context("commit wipe transaction")?;
        Ok(())
    }
}
