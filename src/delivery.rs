//! OTP delivery abstraction.
//!
//! Actual email transport is a host concern; the gate only guarantees the
//! minted code reaches a sender. The default for local dev is
//! [`LogOtpSender`], which logs the code instead of sending real email.

use anyhow::Result;
use tracing::info;

/// Delivery channel for one-time codes.
pub trait OtpSender: Send + Sync {
    /// Deliver a code or return an error; failure surfaces as an
    /// infrastructure error, never as a policy denial.
    fn send_otp(&self, email: &str, code: &str) -> Result<()>;
}

/// Local dev sender that logs the code and returns `Ok(())`.
#[derive(Clone, Debug)]
pub struct LogOtpSender;

impl OtpSender for LogOtpSender {
    fn send_otp(&self, email: &str, code: &str) -> Result<()> {
        info!(email = %email, code = %code, "otp delivery stub");
        Ok(())
    }
}

/// Sender that drops codes silently (test mode).
#[derive(Clone, Debug)]
pub struct NoopOtpSender;

impl OtpSender for NoopOtpSender {
    fn send_otp(&self, _email: &str, _code: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_senders_accept_codes() {
        assert!(LogOtpSender.send_otp("a@b.com", "123456").is_ok());
        assert!(NoopOtpSender.send_otp("a@b.com", "123456").is_ok());
    }
}
