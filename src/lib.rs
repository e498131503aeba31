//! # Entryway (Email + OTP Authentication Gate)
//!
//! `entryway` is a passwordless authentication gate for a multi-tenant
//! collaboration product. It decides, per email address, whether a requester
//! may receive a one-time passcode, issues and verifies that passcode, and
//! manages time-boxed invitation tokens that onboard external users into a
//! shared collection.
//!
//! ## Gating Model
//!
//! An email may request a code only when it has standing (it is on the
//! internal-user allowlist or has been invited to a collection) **and** its
//! address has been verified. Verification happens through invitation
//! activation or administrative seeding and never reverts automatically.
//!
//! - **Normalization:** Emails are lowercased and trimmed before every
//!   lookup or mutation; differently-cased spellings are one entity.
//! - **Rate limiting:** At most 3 accepted code requests per email inside a
//!   10-minute trailing window (both configurable). The ledger is pruned
//!   lazily on read.
//! - **Lazy expiry:** Challenges (5 min) and invitations (7 days) expire on
//!   read; an expired entity is treated as absent and purged.
//!
//! ## Backends
//!
//! All policy state lives behind the [`store::PolicyStore`] trait with two
//! conforming backends: an in-process map store for tests/local dev and a
//! shared Postgres store for production, selected by the host at
//! construction via [`GateConfig`] — never by environment sniffing.
//!
//! ## Outcomes, not exceptions
//!
//! Policy refusals (`not_invited`, `not_verified`, `rate_limited`, bad or
//! expired codes) are typed values with human-readable messages. Errors are
//! reserved for infrastructure failures, which callers must treat as
//! retryable-unknown rather than denial.

pub mod activation;
pub mod config;
pub mod delivery;
pub mod directory;
pub mod gate;
pub mod store;
pub mod types;
mod util;

pub use activation::activate_invitation;
pub use config::{BackendKind, GateConfig};
pub use delivery::{LogOtpSender, NoopOtpSender, OtpSender};
pub use directory::{IdentityDirectory, MemoryDirectory, MemoryRegistry, ProfileRegistry};
pub use gate::AuthGate;
pub use store::{backend_for, MemoryPolicyStore, PgPolicyStore, PolicyStore};
pub use types::{
    ActivationOutcome, DenyReason, InvitationClaim, InvitationGrant, InviteOutcome,
    OtpRequestOutcome, OtpVerifyOutcome, Precheck, PrecheckReason, Session, VerifyReason,
};
pub use util::{normalize_email, valid_email};
