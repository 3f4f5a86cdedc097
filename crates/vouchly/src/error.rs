//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable
//! help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use vouchly_config::ConfigError;
use vouchly_core::{
    CoreError, GatewayError, PaymentError, ProvisionError, RedemptionError, RevokeError,
    VoucherError,
};

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the router at {url}: {reason}")]
    #[diagnostic(
        code(vouchly::connection_failed),
        help(
            "Check that the router is up and its REST API (www-ssl service) is enabled.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(vouchly::auth_failed),
        help(
            "Check the REST API user and password for this profile.\n\
             Store the password with: vouchly config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No {secret} configured for profile '{profile}'")]
    #[diagnostic(
        code(vouchly::no_credentials),
        help(
            "Store it with: vouchly config set-password --profile {profile}\n\
             Or set VOUCHLY_PASSWORD for the router password."
        )
    )]
    NoCredentials { profile: String, secret: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vouchly::not_found),
        help("Run: vouchly {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(vouchly::conflict))]
    Conflict { message: String },

    // ── Domain ───────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(vouchly::redemption), help("{detail}"))]
    Redemption {
        message: String,
        detail: String,
        exit: i32,
    },

    #[error("Router call failed: {message}")]
    #[diagnostic(code(vouchly::router))]
    Router { message: String, transient: bool },

    #[error("M-Pesa is not configured for this profile")]
    #[diagnostic(
        code(vouchly::payments_disabled),
        help("Add a [profiles.<name>.mpesa] table to the config file.")
    )]
    PaymentsDisabled,

    #[error("Operation failed: {message}")]
    #[diagnostic(code(vouchly::operation_failed))]
    Operation { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vouchly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vouchly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: vouchly config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(vouchly::no_config),
        help(
            "Create one with: vouchly config init\n\
             Or pass --router together with VOUCHLY_PASSWORD.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(vouchly::config))]
    Config(Box<figment::Error>),

    #[error("State file {path}: {message}")]
    #[diagnostic(
        code(vouchly::state),
        help("Point --state-file at a writable location or restore the file from backup.")
    )]
    State { path: String, message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(vouchly::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(vouchly::timeout),
        help("Increase timeout with --timeout or check router responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(vouchly::json), help("Check the JSON document and try again."))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Router { transient, .. } => {
                if *transient {
                    exit_code::CONNECTION
                } else {
                    exit_code::GENERAL
                }
            }
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Redemption { exit, .. } => *exit,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::PaymentsDisabled => exit_code::PERMISSION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Domain error → CliError mapping ──────────────────────────────────

impl From<GatewayError> for CliError {
    fn from(err: GatewayError) -> Self {
        CliError::Router {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

impl From<RedemptionError> for CliError {
    fn from(err: RedemptionError) -> Self {
        let exit = match &err {
            RedemptionError::InvalidCode => exit_code::NOT_FOUND,
            RedemptionError::AlreadyUsed | RedemptionError::Expired => exit_code::CONFLICT,
            RedemptionError::AuthorizationFailed { source } if source.is_transient() => {
                exit_code::CONNECTION
            }
            RedemptionError::AuthorizationFailed { .. } => exit_code::GENERAL,
        };
        CliError::Redemption {
            message: err.user_message().into(),
            detail: err.to_string(),
            exit,
        }
    }
}

impl From<VoucherError> for CliError {
    fn from(err: VoucherError) -> Self {
        match err {
            VoucherError::NotFound => CliError::NotFound {
                resource_type: "voucher".into(),
                identifier: "(code)".into(),
                list_command: "vouchers list".into(),
            },
            VoucherError::UnknownTariff { id } => tariff_not_found(&id.to_string()),
            VoucherError::AlreadyUsed | VoucherError::Expired | VoucherError::Revoked => {
                CliError::Conflict {
                    message: err.to_string(),
                }
            }
            VoucherError::InvalidBatchSize { .. } => CliError::Validation {
                field: "count".into(),
                reason: err.to_string(),
            },
            VoucherError::CodeTooShort { .. } => CliError::Validation {
                field: "vouchers.code_length".into(),
                reason: err.to_string(),
            },
            VoucherError::CodeSpaceExhausted { .. } => CliError::Operation {
                message: err.to_string(),
            },
        }
    }
}

impl From<RevokeError> for CliError {
    fn from(err: RevokeError) -> Self {
        match err {
            RevokeError::Voucher(inner) => inner.into(),
            RevokeError::Gateway { .. } => CliError::Router {
                transient: true,
                message: err.to_string(),
            },
        }
    }
}

impl From<PaymentError> for CliError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidPhone { .. } => CliError::Validation {
                field: "phone".into(),
                reason: err.to_string(),
            },
            PaymentError::UnknownTariff { id } => tariff_not_found(&id.to_string()),
            PaymentError::DuplicateCheckout { .. } => CliError::Conflict {
                message: err.to_string(),
            },
            PaymentError::Gateway(inner) => inner.into(),
            PaymentError::Voucher(inner) => inner.into(),
        }
    }
}

impl From<ProvisionError> for CliError {
    fn from(err: ProvisionError) -> Self {
        CliError::Router {
            transient: matches!(err, ProvisionError::Transient { .. }),
            message: format!("{err}\nThe tariff is saved; retry with: vouchly tariffs provision"),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::TariffNotFound { id } => tariff_not_found(&id.to_string()),

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: format!("{entity_type}s list"),
                resource_type: entity_type,
                identifier,
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Gateway(inner) => inner.into(),
            CoreError::Provision(inner) => inner.into(),
            CoreError::Voucher(inner) => inner.into(),
            CoreError::Redemption(inner) => inner.into(),
            CoreError::Payment(inner) => inner.into(),
            CoreError::Revoke(inner) => inner.into(),

            CoreError::PaymentsDisabled => CliError::PaymentsDisabled,

            CoreError::Persistence { path, message } => CliError::State {
                path: path.display().to_string(),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Api { message, status } => CliError::Operation {
                message: match status {
                    Some(code) => format!("HTTP {code}: {message}"),
                    None => message,
                },
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile, secret } => CliError::NoCredentials {
                profile,
                secret: secret.into(),
            },
            ConfigError::Figment(inner) => CliError::Config(inner),
            ConfigError::Io(inner) => CliError::Io(inner),
            ConfigError::Keyring(_) | ConfigError::Serialization(_) => CliError::Operation {
                message: err.to_string(),
            },
        }
    }
}

fn tariff_not_found(identifier: &str) -> CliError {
    CliError::NotFound {
        resource_type: "tariff".into(),
        identifier: identifier.into(),
        list_command: "tariffs list".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redemption_errors_keep_the_portal_message() {
        let err: CliError = RedemptionError::AlreadyUsed.into();
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
        assert_eq!(err.to_string(), "Invalid or already used voucher code.");

        let err: CliError = RedemptionError::InvalidCode.into();
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn transient_router_failures_exit_as_connection_errors() {
        let err: CliError = CoreError::Gateway(GatewayError::Transient {
            operation: "list_active",
            message: "connection refused".into(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_code::CONNECTION);

        let err: CliError = CoreError::Gateway(GatewayError::Rejected {
            operation: "create_profile",
            message: "bad rate-limit".into(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn missing_mpesa_settings_are_a_permission_error() {
        let err: CliError = CoreError::PaymentsDisabled.into();
        assert_eq!(err.exit_code(), exit_code::PERMISSION);
    }

    #[test]
    fn config_errors_map_to_usage_and_auth() {
        let err: CliError = ConfigError::Validation {
            field: "router".into(),
            reason: "invalid URL".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);

        let err: CliError = ConfigError::NoCredentials {
            profile: "home".into(),
            secret: "router password",
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
