//! Gate configuration.

use std::time::Duration;

const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10 * 60);
const DEFAULT_RATE_LIMIT_MAX: u32 = 3;
const DEFAULT_INVITATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_INVITATION_TOKEN_BYTES: usize = 32;
const DEFAULT_MAX_VERIFY_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Which policy store backs the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process maps; single device, non-authoritative. For tests and local dev.
    Mock,
    /// Shared Postgres store reachable from every request context.
    Durable,
}

/// Configuration for an [`crate::AuthGate`], chosen by the host at
/// construction time rather than sniffed from the environment.
#[derive(Clone, Debug)]
pub struct GateConfig {
    backend: BackendKind,
    base_url: String,
    otp_length: usize,
    otp_ttl: Duration,
    rate_limit_window: Duration,
    rate_limit_max: u32,
    invitation_ttl: Duration,
    invitation_token_bytes: usize,
    max_verify_attempts: u32,
    single_use_invitations: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new(BackendKind::Mock)
    }
}

impl GateConfig {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            base_url: DEFAULT_BASE_URL.to_string(),
            otp_length: DEFAULT_OTP_LENGTH,
            otp_ttl: DEFAULT_OTP_TTL,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            invitation_ttl: DEFAULT_INVITATION_TTL,
            invitation_token_bytes: DEFAULT_INVITATION_TOKEN_BYTES,
            max_verify_attempts: DEFAULT_MAX_VERIFY_ATTEMPTS,
            single_use_invitations: true,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length;
        self
    }

    #[must_use]
    pub fn with_otp_ttl(mut self, ttl: Duration) -> Self {
        self.otp_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window = window;
        self
    }

    #[must_use]
    pub fn with_rate_limit_max(mut self, max: u32) -> Self {
        self.rate_limit_max = max;
        self
    }

    #[must_use]
    pub fn with_invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_invitation_token_bytes(mut self, bytes: usize) -> Self {
        self.invitation_token_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_verify_attempts(mut self, attempts: u32) -> Self {
        self.max_verify_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_single_use_invitations(mut self, single_use: bool) -> Self {
        self.single_use_invitations = single_use;
        self
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    #[must_use]
    pub fn otp_ttl(&self) -> Duration {
        self.otp_ttl
    }

    pub(crate) fn otp_ttl_ms(&self) -> i64 {
        i64::try_from(self.otp_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    pub(crate) fn rate_limit_window_ms(&self) -> i64 {
        i64::try_from(self.rate_limit_window.as_millis()).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn rate_limit_max(&self) -> u32 {
        self.rate_limit_max
    }

    #[must_use]
    pub fn invitation_ttl(&self) -> Duration {
        self.invitation_ttl
    }

    pub(crate) fn invitation_ttl_ms(&self) -> i64 {
        i64::try_from(self.invitation_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    #[must_use]
    pub fn invitation_token_bytes(&self) -> usize {
        self.invitation_token_bytes
    }

    #[must_use]
    pub fn max_verify_attempts(&self) -> u32 {
        self.max_verify_attempts
    }

    #[must_use]
    pub fn single_use_invitations(&self) -> bool {
        self.single_use_invitations
    }
}
