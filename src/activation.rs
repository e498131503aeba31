//! Invitation activation: the multi-step saga that onboards an invited
//! email into a collection.
//!
//! Steps run in order with no compensating rollback; every step is an
//! upsert or duplicate-tolerant insert, so a retry after a mid-saga failure
//! completes the remaining steps without creating duplicate users or
//! memberships. The invitation is marked accepted only after the user,
//! profile, and membership records all exist.

use anyhow::{Context, Result};
use tracing::{debug, error};

use crate::directory::{IdentityDirectory, ProfileRegistry};
use crate::gate::AuthGate;
use crate::store::InvitationStatus;
use crate::types::ActivationOutcome;
use crate::util::now_unix_ms;

/// Role granted to members onboarded through an invitation.
const DEFAULT_MEMBER_ROLE: &str = "member";

/// Redeem an invitation token: verify the email, ensure a durable user and
/// profile exist, and bind the user to the invited collection.
pub async fn activate_invitation(
    gate: &AuthGate,
    directory: &dyn IdentityDirectory,
    registry: &dyn ProfileRegistry,
    token: &str,
) -> Result<ActivationOutcome> {
    let Some(record) = gate.store().invitation(token).await? else {
        return Ok(ActivationOutcome::InvalidToken);
    };
    if now_unix_ms() > record.expires_at_ms {
        gate.store().delete_invitation(token).await?;
        return Ok(ActivationOutcome::InvalidToken);
    }
    if record.status == InvitationStatus::Accepted && gate.config().single_use_invitations() {
        return Ok(ActivationOutcome::AlreadyUsed);
    }

    // From here on every step is idempotent; a retry re-runs them all.
    gate.mark_email_verified(&record.email).await?;

    let user_id = directory
        .find_or_create_user(&record.email)
        .await
        .context("failed to find or create user for activation")?;

    registry
        .upsert_profile(&user_id, &record.email)
        .await
        .context("failed to upsert profile")?;

    registry
        .add_collection_member(&record.collection_id, &user_id, DEFAULT_MEMBER_ROLE)
        .await
        .context("failed to add collection membership")?;

    let mut accepted = record.clone();
    accepted.status = InvitationStatus::Accepted;
    accepted.accepted_by = Some(user_id.clone());
    gate.store().put_invitation(token, &accepted).await?;

    let needs_verification = !directory
        .is_email_confirmed(&user_id)
        .await
        .context("failed to check email confirmation")?;
    if needs_verification {
        // Confirmation delivery is best-effort; activation already succeeded.
        if let Err(err) = directory.trigger_confirmation_email(&user_id).await {
            error!(user_id = %user_id, "failed to trigger confirmation email: {err}");
        }
    }

    debug!(
        email = %record.email,
        collection_id = %record.collection_id,
        "invitation activated"
    );

    Ok(ActivationOutcome::Activated {
        email: record.email,
        user_id,
        needs_verification,
    })
}
