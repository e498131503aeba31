//! The authentication gate: precheck, OTP issuance/verification, sessions,
//! verification flags, and invitation minting/resolution.
//!
//! Every public operation normalizes its email input before touching the
//! policy store. Expiry is lazy: expired challenges and invitations are
//! treated as absent and purged on read, never swept proactively.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::GateConfig;
use crate::delivery::OtpSender;
use crate::store::{InvitationRecord, InvitationStatus, OtpChallenge, PolicyStore};
use crate::types::{
    DenyReason, InvitationClaim, InvitationGrant, InviteOutcome, OtpRequestOutcome,
    OtpVerifyOutcome, Precheck, PrecheckReason, Session, VerifyReason,
};
use crate::util::{
    build_activation_url, generate_invitation_token, generate_otp_code, normalize_email,
    now_unix_ms, user_id_for_email, valid_email,
};

/// Facade over the policy store implementing the full auth capability set.
///
/// The store and delivery channel are injected at construction; swapping
/// the mock backend for the durable one changes no gate behavior.
pub struct AuthGate {
    store: Arc<dyn PolicyStore>,
    sender: Arc<dyn OtpSender>,
    config: GateConfig,
}

impl AuthGate {
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, sender: Arc<dyn OtpSender>, config: GateConfig) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn PolicyStore {
        self.store.as_ref()
    }

    /// Decide whether the email may receive an OTP, and why not otherwise.
    ///
    /// Pure function of current store state; no side effects.
    pub async fn precheck(&self, email: &str) -> Result<Precheck> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(Precheck::deny(PrecheckReason::InvalidEmail));
        }

        let is_internal = self.store.is_internal(&email).await?;
        let is_invited = is_internal || !self.store.invited_collections(&email).await?.is_empty();
        if !is_invited {
            return Ok(Precheck::deny(PrecheckReason::NotInvited));
        }

        if self.store.is_verified(&email).await? {
            Ok(Precheck::allow())
        } else {
            Ok(Precheck::deny(PrecheckReason::NotVerified))
        }
    }

    /// Mint and deliver a one-time code, or refuse with a typed reason.
    ///
    /// The precheck is re-derived here; a caller-supplied result is never
    /// trusted since state may have changed between calls.
    pub async fn request_otp(&self, email: &str) -> Result<OtpRequestOutcome> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(OtpRequestOutcome::Denied(DenyReason::InvalidEmail));
        }

        let precheck = self.precheck(&email).await?;
        if !precheck.allowed {
            let reason = match precheck.reason {
                PrecheckReason::NotVerified => DenyReason::NotVerified,
                PrecheckReason::NotInvited => DenyReason::NotInvited,
                PrecheckReason::InvalidEmail | PrecheckReason::Ok => DenyReason::InvalidEmail,
            };
            return Ok(OtpRequestOutcome::Denied(reason));
        }

        let now = now_unix_ms();
        let ledger = self.store.rate_ledger(&email).await?;
        let mut recent: Vec<i64> = ledger
            .into_iter()
            .filter(|stamp| now - stamp < self.config.rate_limit_window_ms())
            .collect();
        if recent.len() >= self.config.rate_limit_max() as usize {
            // Denied requests leave the ledger untouched.
            return Ok(OtpRequestOutcome::Denied(DenyReason::RateLimited));
        }
        recent.push(now);
        self.store.put_rate_ledger(&email, &recent).await?;

        let code = generate_otp_code(self.config.otp_length())?;
        let challenge = OtpChallenge {
            code: code.clone(),
            expires_at_ms: now + self.config.otp_ttl_ms(),
            attempts: 0,
        };
        self.store.put_otp_challenge(&email, &challenge).await?;

        self.sender
            .send_otp(&email, &code)
            .context("failed to deliver OTP code")?;
        debug!(email = %email, "otp challenge minted");

        Ok(OtpRequestOutcome::Sent)
    }

    /// Validate a submitted code against the live challenge for the email.
    ///
    /// On success the challenge is consumed and a session is minted for
    /// this client context.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<OtpVerifyOutcome> {
        let email = normalize_email(email);
        let Some(challenge) = self.store.otp_challenge(&email).await? else {
            return Ok(OtpVerifyOutcome::Rejected(VerifyReason::NoChallenge));
        };

        if now_unix_ms() > challenge.expires_at_ms {
            self.store.delete_otp_challenge(&email).await?;
            return Ok(OtpVerifyOutcome::Rejected(VerifyReason::Expired));
        }

        if challenge.code != code.trim() {
            let attempts = challenge.attempts + 1;
            if attempts >= self.config.max_verify_attempts() {
                // Exhausted challenges are purged; the caller must request
                // a fresh code.
                self.store.delete_otp_challenge(&email).await?;
                return Ok(OtpVerifyOutcome::Rejected(VerifyReason::TooManyAttempts));
            }
            let challenge = OtpChallenge {
                attempts,
                ..challenge
            };
            self.store.put_otp_challenge(&email, &challenge).await?;
            return Ok(OtpVerifyOutcome::Rejected(VerifyReason::InvalidCode));
        }

        self.store.delete_otp_challenge(&email).await?;
        let session = Session {
            user_id: user_id_for_email(&email),
            email: email.clone(),
        };
        self.store.put_session(&session).await?;
        debug!(email = %email, "otp verified, session minted");

        Ok(OtpVerifyOutcome::Verified(session))
    }

    /// Current session for this client context, if any.
    pub async fn get_session(&self) -> Result<Option<Session>> {
        self.store.session().await
    }

    /// Destroy the current session. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear_session().await
    }

    /// Mark an email verified. Administrative/activation use only; the flag
    /// never reverts automatically.
    pub async fn mark_email_verified(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        self.store.set_verified(&email).await
    }

    /// Seed an email into the internal-user allowlist. Idempotent.
    pub async fn add_internal_email(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        self.store.add_internal(&email).await
    }

    /// Invite an email to a collection and mint an activation token.
    ///
    /// Re-inviting the same (email, collection) pair is a no-op beyond
    /// issuing a fresh token.
    pub async fn invite_to_collection(
        &self,
        email: &str,
        collection_id: &str,
    ) -> Result<InviteOutcome> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(InviteOutcome::Denied(DenyReason::InvalidEmail));
        }

        self.store
            .add_invited_collection(&email, collection_id)
            .await?;

        let token = generate_invitation_token(self.config.invitation_token_bytes())?;
        let record = InvitationRecord {
            email: email.clone(),
            collection_id: collection_id.to_string(),
            expires_at_ms: now_unix_ms() + self.config.invitation_ttl_ms(),
            status: InvitationStatus::Pending,
            accepted_by: None,
        };
        self.store.put_invitation(&token, &record).await?;

        let activation_url = build_activation_url(self.config.base_url(), &token)?;
        debug!(email = %email, collection_id = %collection_id, "invitation minted");

        Ok(InviteOutcome::Created(InvitationGrant {
            token,
            activation_url,
        }))
    }

    /// Resolve a token back to its (email, collection) claim.
    ///
    /// Expired invitations are purged and reported absent; subsequent calls
    /// also return `None`, not an error.
    pub async fn resolve_invitation_token(&self, token: &str) -> Result<Option<InvitationClaim>> {
        let Some(record) = self.store.invitation(token).await? else {
            return Ok(None);
        };
        if now_unix_ms() > record.expires_at_ms {
            self.store.delete_invitation(token).await?;
            return Ok(None);
        }
        Ok(Some(InvitationClaim {
            email: record.email,
            collection_id: record.collection_id,
        }))
    }
}
