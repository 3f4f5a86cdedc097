// ── Runtime configuration ──
//
// These types describe how to reach the router and the payment gateway
// and how vouchers are minted. They carry credentials but never touch
// disk: the CLI resolves a profile and hands a `PortalConfig` in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::{DEFAULT_CODE_LENGTH, MIN_CODE_LENGTH};

pub use vouchly_api::DarajaEnvironment;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. RouterOS ships a self-signed `www-ssl` cert.
    DangerAcceptInvalid,
}

/// Router REST API access.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Router root URL (e.g. `https://192.168.88.1`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Per-request bound for every router call.
    pub timeout: Duration,
}

/// How vouchers are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoucherPolicy {
    pub code_length: usize,
    /// Validity window for tariffs without a duration.
    pub default_validity_days: u32,
    /// Collision retries before giving up on a fresh code.
    pub max_code_attempts: u32,
}

impl Default for VoucherPolicy {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            default_validity_days: 30,
            max_code_attempts: 16,
        }
    }
}

impl VoucherPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.code_length < MIN_CODE_LENGTH {
            return Err(format!(
                "code length {} is below the minimum of {MIN_CODE_LENGTH}",
                self.code_length
            ));
        }
        if self.default_validity_days == 0 {
            return Err("default validity must be at least one day".into());
        }
        if self.max_code_attempts == 0 {
            return Err("max code attempts must be at least 1".into());
        }
        Ok(())
    }
}

/// M-Pesa Daraja STK push settings.
#[derive(Debug, Clone)]
pub struct DarajaConfig {
    /// API root: sandbox or production.
    pub base_url: Url,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    /// Where Daraja POSTs the STK result.
    pub callback_url: Url,
    pub timeout: Duration,
}

/// Everything a `Portal` needs.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub router: RouterConfig,
    pub vouchers: VoucherPolicy,
    pub daraja: Option<DarajaConfig>,
    /// JSON state file. `None` keeps state in memory only.
    pub state_file: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(VoucherPolicy::default().validate().is_ok());
    }

    #[test]
    fn short_codes_are_refused() {
        let policy = VoucherPolicy {
            code_length: 8,
            ..VoucherPolicy::default()
        };
        assert!(policy.validate().unwrap_err().contains("minimum of 10"));
    }
}
