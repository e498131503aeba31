//! Typed outcomes for the gate's public operations.
//!
//! Policy violations are expected, frequent results of normal usage, so they
//! are returned as values rather than errors. Only infrastructure failures
//! (store unreachable, randomness unavailable) propagate as `anyhow::Error`,
//! and callers must treat those as retryable-unknown rather than denial.

use serde::{Deserialize, Serialize};

/// Why a precheck allowed or refused OTP issuance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecheckReason {
    Ok,
    InvalidEmail,
    NotInvited,
    NotVerified,
}

/// Result of the gating decision for an email address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precheck {
    pub allowed: bool,
    pub reason: PrecheckReason,
}

impl Precheck {
    pub(crate) fn allow() -> Self {
        Self {
            allowed: true,
            reason: PrecheckReason::Ok,
        }
    }

    pub(crate) fn deny(reason: PrecheckReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Why an OTP request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InvalidEmail,
    NotInvited,
    NotVerified,
    RateLimited,
}

impl DenyReason {
    /// Human-readable message distinguishing remediable causes.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email address",
            Self::NotInvited => "You need to be invited to access this platform",
            Self::NotVerified => "Please verify your email before requesting a code",
            Self::RateLimited => "Too many code requests. Please try again later.",
        }
    }
}

/// Outcome of [`crate::AuthGate::request_otp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpRequestOutcome {
    /// A code was minted, stored, and handed to the delivery channel.
    Sent,
    Denied(DenyReason),
}

/// Why an OTP verification was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyReason {
    NoChallenge,
    Expired,
    InvalidCode,
    TooManyAttempts,
}

impl VerifyReason {
    /// Human-readable message telling the caller whether to retype or
    /// request a fresh code.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoChallenge => "No code found. Please request a new one.",
            Self::Expired => "Code has expired. Please request a new one.",
            Self::InvalidCode => "Invalid code",
            Self::TooManyAttempts => "Too many incorrect attempts. Please request a new code.",
        }
    }
}

/// Outcome of [`crate::AuthGate::verify_otp`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpVerifyOutcome {
    Verified(Session),
    Rejected(VerifyReason),
}

/// The caller's authenticated session.
///
/// Exists only for emails that have passed OTP verification. The user id is
/// a pure function of the normalized email, stable across repeated logins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
}

/// A freshly minted invitation: the raw token and the activation link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvitationGrant {
    pub token: String,
    pub activation_url: String,
}

/// Outcome of [`crate::AuthGate::invite_to_collection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InviteOutcome {
    Created(InvitationGrant),
    Denied(DenyReason),
}

/// The (email, collection) binding a valid invitation token resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationClaim {
    pub email: String,
    pub collection_id: String,
}

/// Outcome of the invitation activation saga.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated {
        email: String,
        user_id: String,
        /// True when the identity directory has not yet confirmed the email
        /// and a confirmation was triggered.
        needs_verification: bool,
    },
    /// Token never issued, or past its expiry (expired tokens are purged).
    InvalidToken,
    /// Token already consumed and the gate enforces single-use invitations.
    AlreadyUsed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn precheck_reason_serializes_snake_case() -> Result<()> {
        let value = serde_json::to_value(PrecheckReason::NotInvited)?;
        assert_eq!(value, serde_json::json!("not_invited"));
        let value = serde_json::to_value(PrecheckReason::InvalidEmail)?;
        assert_eq!(value, serde_json::json!("invalid_email"));
        Ok(())
    }

    #[test]
    fn precheck_round_trips() -> Result<()> {
        let precheck = Precheck::deny(PrecheckReason::NotVerified);
        let value = serde_json::to_value(precheck)?;
        let decoded: Precheck = serde_json::from_value(value)?;
        assert_eq!(decoded, precheck);
        Ok(())
    }

    #[test]
    fn deny_messages_distinguish_causes() {
        assert_ne!(
            DenyReason::NotInvited.user_message(),
            DenyReason::NotVerified.user_message()
        );
        assert!(DenyReason::RateLimited.user_message().contains("Too many"));
    }

    #[test]
    fn verify_messages_distinguish_retry_from_refresh() {
        assert!(VerifyReason::InvalidCode.user_message().contains("Invalid"));
        assert!(VerifyReason::Expired.user_message().contains("request a new"));
    }
}
