//! In-process policy store for tests and local development.
//!
//! Single device and non-authoritative; stands in for the durable store's
//! read/write interface without any I/O.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use super::{InvitationRecord, OtpChallenge, PolicyStore};
use crate::types::Session;

#[derive(Default)]
struct Inner {
    internal_emails: HashSet<String>,
    invited_emails: HashMap<String, Vec<String>>,
    email_verified: HashSet<String>,
    otp_challenges: HashMap<String, OtpChallenge>,
    otp_requests: HashMap<String, Vec<i64>>,
    invitations: HashMap<String, InvitationRecord>,
    session: Option<Session>,
}

#[derive(Default)]
pub struct MemoryPolicyStore {
    inner: Mutex<Inner>,
}

impl MemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn is_internal(&self, email: &str) -> Result<bool> {
        Ok(self.inner.lock().await.internal_emails.contains(email))
    }

    async fn add_internal(&self, email: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .internal_emails
            .insert(email.to_string());
        Ok(())
    }

    async fn invited_collections(&self, email: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .invited_emails
            .get(email)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_invited_collection(&self, email: &str, collection_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let collections = inner.invited_emails.entry(email.to_string()).or_default();
        if !collections.iter().any(|id| id == collection_id) {
            collections.push(collection_id.to_string());
        }
        Ok(())
    }

    async fn is_verified(&self, email: &str) -> Result<bool> {
        Ok(self.inner.lock().await.email_verified.contains(email))
    }

    async fn set_verified(&self, email: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .email_verified
            .insert(email.to_string());
        Ok(())
    }

    async fn otp_challenge(&self, email: &str) -> Result<Option<OtpChallenge>> {
        Ok(self.inner.lock().await.otp_challenges.get(email).cloned())
    }

    async fn put_otp_challenge(&self, email: &str, challenge: &OtpChallenge) -> Result<()> {
        self.inner
            .lock()
            .await
            .otp_challenges
            .insert(email.to_string(), challenge.clone());
        Ok(())
    }

    async fn delete_otp_challenge(&self, email: &str) -> Result<()> {
        self.inner.lock().await.otp_challenges.remove(email);
        Ok(())
    }

    async fn rate_ledger(&self, email: &str) -> Result<Vec<i64>> {
        Ok(self
            .inner
            .lock()
            .await
            .otp_requests
            .get(email)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_rate_ledger(&self, email: &str, stamps: &[i64]) -> Result<()> {
        self.inner
            .lock()
            .await
            .otp_requests
            .insert(email.to_string(), stamps.to_vec());
        Ok(())
    }

    async fn invitation(&self, token: &str) -> Result<Option<InvitationRecord>> {
        Ok(self.inner.lock().await.invitations.get(token).cloned())
    }

    async fn put_invitation(&self, token: &str, record: &InvitationRecord) -> Result<()> {
        self.inner
            .lock()
            .await
            .invitations
            .insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn delete_invitation(&self, token: &str) -> Result<()> {
        self.inner.lock().await.invitations.remove(token);
        Ok(())
    }

    async fn session(&self) -> Result<Option<Session>> {
        Ok(self.inner.lock().await.session.clone())
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.inner.lock().await.session = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.inner.lock().await.session = None;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        *self.inner.lock().await = Inner::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::InvitationStatus;
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn challenge_overwrite_and_delete() -> Result<()> {
        let store = MemoryPolicyStore::new();
        let email = "a@b.com";
        assert_eq!(store.otp_challenge(email).await?, None);

        let first = OtpChallenge {
            code: "111111".to_string(),
            expires_at_ms: 10,
            attempts: 0,
        };
        store.put_otp_challenge(email, &first).await?;

        let second = OtpChallenge {
            code: "222222".to_string(),
            expires_at_ms: 20,
            attempts: 0,
        };
        store.put_otp_challenge(email, &second).await?;
        assert_eq!(store.otp_challenge(email).await?, Some(second));

        store.delete_otp_challenge(email).await?;
        assert_eq!(store.otp_challenge(email).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn invited_collections_are_idempotent() -> Result<()> {
        let store = MemoryPolicyStore::new();
        store.add_invited_collection("a@b.com", "col-1").await?;
        store.add_invited_collection("a@b.com", "col-1").await?;
        store.add_invited_collection("a@b.com", "col-2").await?;
        assert_eq!(
            store.invited_collections("a@b.com").await?,
            vec!["col-1".to_string(), "col-2".to_string()]
        );
        assert!(store.invited_collections("c@d.com").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rate_ledger_replaces_whole_sequence() -> Result<()> {
        let store = MemoryPolicyStore::new();
        store.put_rate_ledger("a@b.com", &[1, 2, 3]).await?;
        store.put_rate_ledger("a@b.com", &[2, 3]).await?;
        assert_eq!(store.rate_ledger("a@b.com").await?, vec![2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn session_lifecycle() -> Result<()> {
        let store = MemoryPolicyStore::new();
        assert_eq!(store.session().await?, None);

        let session = Session {
            user_id: "user_a_b_com".to_string(),
            email: "a@b.com".to_string(),
        };
        store.put_session(&session).await?;
        assert_eq!(store.session().await?, Some(session));

        store.clear_session().await?;
        assert_eq!(store.session().await?, None);
        // Logout is idempotent.
        store.clear_session().await?;
        Ok(())
    }

    #[tokio::test]
    async fn clear_all_wipes_every_collection() -> Result<()> {
        let store = MemoryPolicyStore::new();
        store.add_internal("a@b.com").await?;
        store.set_verified("a@b.com").await?;
        store
            .put_invitation(
                "tok",
                &InvitationRecord {
                    email: "a@b.com".to_string(),
                    collection_id: "col-1".to_string(),
                    expires_at_ms: 99,
                    status: InvitationStatus::Pending,
                    accepted_by: None,
                },
            )
            .await?;

        store.clear_all().await?;
        assert!(!store.is_internal("a@b.com").await?);
        assert!(!store.is_verified("a@b.com").await?);
        assert_eq!(store.invitation("tok").await?, None);
        Ok(())
    }
}
