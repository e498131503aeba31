//! End-to-end flows through the authentication gate.
//!
//! Exercises the public capability set against the in-process backend: the
//! internal-user login scenario, the invitation-to-activation-to-login
//! onboarding path, and the seed/wipe tooling.

use anyhow::Result;
use entryway::{
    activate_invitation, ActivationOutcome, AuthGate, GateConfig, InviteOutcome, MemoryDirectory,
    MemoryPolicyStore, MemoryRegistry, OtpRequestOutcome, OtpSender, OtpVerifyOutcome, PolicyStore,
    Precheck, PrecheckReason,
};
use std::sync::{Arc, Mutex};

/// Test sender that captures delivered codes instead of sending email.
#[derive(Clone, Default)]
struct CapturingSender {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl CapturingSender {
    fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

impl OtpSender for CapturingSender {
    fn send_otp(&self, email: &str, code: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((email.to_string(), code.to_string()));
        }
        Ok(())
    }
}

fn build_gate() -> (AuthGate, Arc<MemoryPolicyStore>, CapturingSender) {
    let store = Arc::new(MemoryPolicyStore::new());
    let sender = CapturingSender::default();
    let gate = AuthGate::new(
        store.clone(),
        Arc::new(sender.clone()),
        GateConfig::default(),
    );
    (gate, store, sender)
}

#[tokio::test]
async fn internal_user_logs_in_end_to_end() -> Result<()> {
    let (gate, _store, sender) = build_gate();

    gate.add_internal_email("a@b.com").await?;
    gate.mark_email_verified("a@b.com").await?;
    assert_eq!(gate.precheck("a@b.com").await?, Precheck {
        allowed: true,
        reason: PrecheckReason::Ok,
    });

    assert_eq!(gate.request_otp("a@b.com").await?, OtpRequestOutcome::Sent);
    let code = sender.last_code_for("a@b.com").expect("code delivered");

    let OtpVerifyOutcome::Verified(session) = gate.verify_otp("a@b.com", &code).await? else {
        panic!("expected verification to succeed");
    };
    assert_eq!(session.email, "a@b.com");
    assert_eq!(gate.get_session().await?, Some(session.clone()));

    // The user id is derived from the email alone: a later login for the
    // same address yields the same id.
    gate.logout().await?;
    assert_eq!(gate.get_session().await?, None);

    assert_eq!(gate.request_otp("a@b.com").await?, OtpRequestOutcome::Sent);
    let code = sender.last_code_for("a@b.com").expect("second code");
    let OtpVerifyOutcome::Verified(again) = gate.verify_otp("a@b.com", &code).await? else {
        panic!("expected second login to succeed");
    };
    assert_eq!(again.user_id, session.user_id);
    Ok(())
}

#[tokio::test]
async fn invited_user_onboards_through_activation() -> Result<()> {
    let (gate, _store, sender) = build_gate();
    let directory = MemoryDirectory::new();
    let registry = MemoryRegistry::new();

    let InviteOutcome::Created(grant) = gate.invite_to_collection("c@d.com", "col-1").await? else {
        panic!("expected invitation to be created");
    };

    // Invited but unactivated: precheck refuses and no challenge is minted.
    assert_eq!(
        gate.precheck("c@d.com").await?,
        Precheck {
            allowed: false,
            reason: PrecheckReason::NotVerified,
        }
    );
    assert!(matches!(
        gate.request_otp("c@d.com").await?,
        OtpRequestOutcome::Denied(_)
    ));
    assert!(sender.last_code_for("c@d.com").is_none());

    let claim = gate
        .resolve_invitation_token(&grant.token)
        .await?
        .expect("claim resolves before expiry");
    assert_eq!(claim.email, "c@d.com");
    assert_eq!(claim.collection_id, "col-1");

    let outcome = activate_invitation(&gate, &directory, &registry, &grant.token).await?;
    let ActivationOutcome::Activated { user_id, .. } = outcome else {
        panic!("expected activation to succeed");
    };
    assert!(registry.is_member("col-1", &user_id).await);

    // Activation verified the email; login now proceeds.
    assert_eq!(gate.request_otp("c@d.com").await?, OtpRequestOutcome::Sent);
    let code = sender.last_code_for("c@d.com").expect("code delivered");
    assert!(matches!(
        gate.verify_otp("c@d.com", &code).await?,
        OtpVerifyOutcome::Verified(_)
    ));
    Ok(())
}

#[tokio::test]
async fn wipe_resets_all_policy_state() -> Result<()> {
    let (gate, store, _sender) = build_gate();

    gate.add_internal_email("a@b.com").await?;
    gate.mark_email_verified("a@b.com").await?;
    gate.request_otp("a@b.com").await?;
    gate.invite_to_collection("c@d.com", "col-1").await?;

    store.clear_all().await?;

    assert_eq!(
        gate.precheck("a@b.com").await?,
        Precheck {
            allowed: false,
            reason: PrecheckReason::NotInvited,
        }
    );
    assert!(store.rate_ledger("a@b.com").await?.is_empty());
    Ok(())
}
