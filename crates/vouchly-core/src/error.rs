// ── Core error types ──
//
// Each service returns its own error enum so callers can match on the
// outcomes they care about. Transport detail from `vouchly-api` is
// classified into `GatewayError::{Transient, Rejected}` at the gateway
// boundary and never leaks further up as raw HTTP status codes.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::TariffId;

// ── Gateway ──────────────────────────────────────────────────────────

/// Failure of a single remote call to the router or payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure, timeout or 5xx. Worth retrying later.
    #[error("{operation}: remote temporarily unavailable: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },

    /// The remote end answered and refused (4xx, RouterOS error body,
    /// bad credentials). Retrying the same request will not help.
    #[error("{operation}: rejected by remote: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

impl GatewayError {
    /// Classify an API-layer error for the named operation.
    pub fn from_api(operation: &'static str, err: &vouchly_api::Error) -> Self {
        let message = match err.detail() {
            Some(detail) => format!("{err} ({detail})"),
            None => err.to_string(),
        };
        if err.is_transient() {
            Self::Transient { operation, message }
        } else {
            Self::Rejected { operation, message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Transient { operation, .. } | Self::Rejected { operation, .. } => operation,
        }
    }
}

/// `map_err` adapter: `.map_err(classify("find_user"))`.
pub(crate) fn classify(operation: &'static str) -> impl Fn(vouchly_api::Error) -> GatewayError {
    move |err| GatewayError::from_api(operation, &err)
}

// ── Vouchers ─────────────────────────────────────────────────────────

/// Outcomes of `VoucherStore` operations. Codes are deliberately absent
/// from the messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherError {
    #[error("voucher not found")]
    NotFound,

    #[error("voucher already used")]
    AlreadyUsed,

    #[error("voucher expired")]
    Expired,

    #[error("voucher revoked")]
    Revoked,

    #[error("unknown tariff {id}")]
    UnknownTariff { id: TariffId },

    #[error("batch size {count} out of range (1..={max})")]
    InvalidBatchSize { count: usize, max: usize },

    #[error("code length {length} is below the minimum of {minimum}")]
    CodeTooShort { length: usize, minimum: usize },

    #[error("could not find an unused code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
}

// ── Redemption ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedemptionError {
    #[error("invalid voucher code")]
    InvalidCode,

    #[error("voucher already used")]
    AlreadyUsed,

    #[error("voucher expired")]
    Expired,

    /// The router step failed; the voucher has been returned to `Unused`.
    #[error("router authorization failed: {source}")]
    AuthorizationFailed {
        #[source]
        source: GatewayError,
    },
}

impl RedemptionError {
    /// Message safe to show on the captive portal page.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCode | Self::AlreadyUsed => "Invalid or already used voucher code.",
            Self::Expired => "This voucher has expired.",
            Self::AuthorizationFailed { .. } => {
                "Login failed. Please try again or contact support."
            }
        }
    }
}

// ── Provisioning ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("profile provisioning failed transiently: {message}")]
    Transient { message: String },

    #[error("profile provisioning rejected: {message}")]
    Rejected { message: String },
}

impl From<GatewayError> for ProvisionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transient { .. } => Self::Transient {
                message: err.to_string(),
            },
            GatewayError::Rejected { .. } => Self::Rejected {
                message: err.to_string(),
            },
        }
    }
}

// ── Payments ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("invalid phone number {phone:?}: expected 2547XXXXXXXX or 2541XXXXXXXX")]
    InvalidPhone { phone: String },

    #[error("unknown tariff {id}")]
    UnknownTariff { id: TariffId },

    #[error("payment with checkout id {checkout_id} already recorded")]
    DuplicateCheckout { checkout_id: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("payment settled but voucher issuance failed: {0}")]
    Voucher(#[from] VoucherError),
}

// ── Revocation ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevokeError {
    #[error(transparent)]
    Voucher(#[from] VoucherError),

    /// Revoked locally, but the router clean-up failed.
    #[error("voucher revoked locally; router clean-up failed: {source}")]
    Gateway {
        #[source]
        source: GatewayError,
    },
}

// ── Facade ───────────────────────────────────────────────────────────

/// Unified error type for the `Portal` facade.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Tariff not found: {id}")]
    TariffNotFound { id: TariffId },

    #[error("Entity not found: {entity_type} {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Service errors ───────────────────────────────────────────────
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Voucher(#[from] VoucherError),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Revoke(#[from] RevokeError),

    #[error("M-Pesa is not configured for this profile")]
    PaymentsDisabled,

    // ── Persistence ──────────────────────────────────────────────────
    #[error("State file {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    // ── Configuration / internal ─────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vouchly_api::Error> for CoreError {
    fn from(err: vouchly_api::Error) -> Self {
        match err {
            vouchly_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            vouchly_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            vouchly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            vouchly_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            vouchly_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            vouchly_api::Error::RouterOs {
                status,
                message,
                detail,
            } => CoreError::Api {
                message: match detail {
                    Some(d) => format!("{message}: {d}"),
                    None => message,
                },
                status: Some(status),
            },
            vouchly_api::Error::Daraja {
                status, message, ..
            } => CoreError::Api {
                message,
                status: Some(status),
            },
            vouchly_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Deserialization error: {message}"),
                status: None,
            },
        }
    }
}
