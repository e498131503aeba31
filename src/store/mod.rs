//! The policy store: durable keyed state behind every gate decision.
//!
//! Seven independent keyed collections back the gate (internal allowlist,
//! invited-email map, verification flags, OTP challenges, the rate-limit
//! ledger, invitations, and the client session). The store owns no policy;
//! it only guarantees keyed get/set/delete semantics. A read/write failure
//! must surface as an error, never be conflated with absence.

pub mod memory;
pub mod postgres;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{BackendKind, GateConfig};
use crate::types::Session;

pub use memory::MemoryPolicyStore;
pub use postgres::PgPolicyStore;

/// A live one-time-code challenge for an email.
///
/// Exactly one challenge is live per email; a new request overwrites the
/// prior one. The code is meaningless past `expires_at_ms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub code: String,
    pub expires_at_ms: i64,
    /// Failed verification attempts against this challenge.
    pub attempts: u32,
}

/// Whether an invitation token has been consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
}

impl InvitationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A time-boxed invitation binding an email to a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecord {
    pub email: String,
    pub collection_id: String,
    pub expires_at_ms: i64,
    pub status: InvitationStatus,
    /// User id recorded when the invitation was accepted.
    pub accepted_by: Option<String>,
}

/// Keyed read/write state shared by every gate component.
///
/// All email keys are pre-normalized by the caller. Single-key writes are
/// atomic; multi-key sequences are not transactional, so concurrent writers
/// race read-modify-write on the ledger and challenge (last write wins).
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn is_internal(&self, email: &str) -> Result<bool>;
    async fn add_internal(&self, email: &str) -> Result<()>;

    /// Collections the email has been invited to; empty means not invited.
    async fn invited_collections(&self, email: &str) -> Result<Vec<String>>;
    async fn add_invited_collection(&self, email: &str, collection_id: &str) -> Result<()>;

    async fn is_verified(&self, email: &str) -> Result<bool>;
    /// Verification never reverts automatically; there is no unset.
    async fn set_verified(&self, email: &str) -> Result<()>;

    async fn otp_challenge(&self, email: &str) -> Result<Option<OtpChallenge>>;
    async fn put_otp_challenge(&self, email: &str, challenge: &OtpChallenge) -> Result<()>;
    async fn delete_otp_challenge(&self, email: &str) -> Result<()>;

    /// Request timestamps for the email, oldest first. Entries outside the
    /// rate window are pruned lazily by the caller, not by the store.
    async fn rate_ledger(&self, email: &str) -> Result<Vec<i64>>;
    async fn put_rate_ledger(&self, email: &str, stamps: &[i64]) -> Result<()>;

    async fn invitation(&self, token: &str) -> Result<Option<InvitationRecord>>;
    async fn put_invitation(&self, token: &str, record: &InvitationRecord) -> Result<()>;
    async fn delete_invitation(&self, token: &str) -> Result<()>;

    async fn session(&self) -> Result<Option<Session>>;
    async fn put_session(&self, session: &Session) -> Result<()>;
    async fn clear_session(&self) -> Result<()>;

    /// Wipe every collection. Seed/test tooling only.
    async fn clear_all(&self) -> Result<()>;
}

/// Select a backend per the config.
///
/// The durable backend needs a Postgres pool and a client-context key for
/// session scoping; the mock backend ignores both.
pub fn backend_for(
    config: &GateConfig,
    pool: Option<PgPool>,
    session_context: &str,
) -> Result<Arc<dyn PolicyStore>> {
    match config.backend() {
        BackendKind::Mock => Ok(Arc::new(MemoryPolicyStore::new())),
        BackendKind::Durable => match pool {
            Some(pool) => Ok(Arc::new(PgPolicyStore::new(pool, session_context.to_string()))),
            None => bail!("durable backend requires a Postgres pool"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_status_round_trips() {
        for status in [InvitationStatus::Pending, InvitationStatus::Accepted] {
            assert_eq!(InvitationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(InvitationStatus::from_str("revoked"), None);
    }

    #[test]
    fn challenge_serializes_with_attempts() {
        let challenge = OtpChallenge {
            code: "123456".to_string(),
            expires_at_ms: 42,
            attempts: 1,
        };
        let value = serde_json::to_value(&challenge).expect("serialize");
        assert_eq!(value["attempts"], 1);
        let decoded: OtpChallenge = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, challenge);
    }

    #[test]
    fn backend_for_mock_ignores_pool() {
        let config = GateConfig::default();
        assert!(backend_for(&config, None, "ctx").is_ok());
    }

    #[test]
    fn backend_for_durable_requires_pool() {
        let config = GateConfig::new(BackendKind::Durable);
        assert!(backend_for(&config, None, "ctx").is_err());
    }
}
