//! External identity-directory and profile/membership capabilities.
//!
//! Consumed only by the activation saga. The in-memory implementations
//! back tests and local dev; a production host wires these to its admin
//! user directory and relational store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::util::user_id_for_email;

/// Administrative user directory able to create accounts and confirm emails.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Return the user id for the email, creating the account if missing.
    /// Must be idempotent: repeated calls yield the same id.
    async fn find_or_create_user(&self, email: &str) -> Result<String>;

    async fn is_email_confirmed(&self, user_id: &str) -> Result<bool>;

    async fn trigger_confirmation_email(&self, user_id: &str) -> Result<()>;
}

/// Relational persistence for profile and collection-membership records.
#[async_trait]
pub trait ProfileRegistry: Send + Sync {
    /// Insert-or-update the profile row by user id.
    async fn upsert_profile(&self, user_id: &str, email: &str) -> Result<()>;

    /// Add a membership row; a duplicate membership is success, not error.
    async fn add_collection_member(
        &self,
        collection_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<()>;
}

#[derive(Default)]
struct DirectoryInner {
    users: HashMap<String, String>,
    confirmed: HashSet<String>,
    confirmation_requests: Vec<String>,
}

/// In-memory directory; user ids are derived from the email so repeated
/// activations resolve to the same account.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryInner>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an account's email confirmed (stands in for the user clicking
    /// the confirmation link).
    pub async fn confirm_email(&self, user_id: &str) {
        self.inner.lock().await.confirmed.insert(user_id.to_string());
    }

    /// User ids that had a confirmation email triggered, oldest first.
    pub async fn confirmation_requests(&self) -> Vec<String> {
        self.inner.lock().await.confirmation_requests.clone()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn find_or_create_user(&self, email: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let user_id = inner
            .users
            .entry(email.to_string())
            .or_insert_with(|| user_id_for_email(email))
            .clone();
        Ok(user_id)
    }

    async fn is_email_confirmed(&self, user_id: &str) -> Result<bool> {
        Ok(self.inner.lock().await.confirmed.contains(user_id))
    }

    async fn trigger_confirmation_email(&self, user_id: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .confirmation_requests
            .push(user_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RegistryInner {
    profiles: HashMap<String, String>,
    memberships: HashSet<(String, String, String)>,
}

/// In-memory profile/membership registry.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<RegistryInner>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn profile_email(&self, user_id: &str) -> Option<String> {
        self.inner.lock().await.profiles.get(user_id).cloned()
    }

    pub async fn is_member(&self, collection_id: &str, user_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .memberships
            .iter()
            .any(|(collection, user, _)| collection == collection_id && user == user_id)
    }

    pub async fn membership_count(&self) -> usize {
        self.inner.lock().await.memberships.len()
    }
}

#[async_trait]
impl ProfileRegistry for MemoryRegistry {
    async fn upsert_profile(&self, user_id: &str, email: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .profiles
            .insert(user_id.to_string(), email.to_string());
        Ok(())
    }

    async fn add_collection_member(
        &self,
        collection_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<()> {
        self.inner.lock().await.memberships.insert((
            collection_id.to_string(),
            user_id.to_string(),
            role.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn find_or_create_is_idempotent() -> Result<()> {
        let directory = MemoryDirectory::new();
        let first = directory.find_or_create_user("a@b.com").await?;
        let second = directory.find_or_create_user("a@b.com").await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn confirmation_state_round_trips() -> Result<()> {
        let directory = MemoryDirectory::new();
        let user_id = directory.find_or_create_user("a@b.com").await?;
        assert!(!directory.is_email_confirmed(&user_id).await?);

        directory.trigger_confirmation_email(&user_id).await?;
        assert_eq!(directory.confirmation_requests().await, vec![user_id.clone()]);

        directory.confirm_email(&user_id).await;
        assert!(directory.is_email_confirmed(&user_id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_membership_is_success() -> Result<()> {
        let registry = MemoryRegistry::new();
        registry.add_collection_member("col-1", "user_1", "member").await?;
        registry.add_collection_member("col-1", "user_1", "member").await?;
        assert_eq!(registry.membership_count().await, 1);
        assert!(registry.is_member("col-1", "user_1").await);
        Ok(())
    }
}
