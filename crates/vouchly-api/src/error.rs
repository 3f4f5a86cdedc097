use thiserror::Error;

/// Top-level error type for the `vouchly-api` crate.
///
/// Covers every failure mode across both API surfaces: transport,
/// RouterOS REST, and Daraja. `vouchly-core` classifies these into
/// transient vs. rejected gateway failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected (HTTP 401 from the router, token failure from Daraja).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── RouterOS ────────────────────────────────────────────────────
    /// Error body returned by the RouterOS REST API:
    /// `{"error": 400, "message": "Bad Request", "detail": "..."}`.
    #[error("RouterOS error (HTTP {status}): {message}")]
    RouterOs {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    // ── Daraja ──────────────────────────────────────────────────────
    /// Error body returned by Daraja: `{"errorCode": "...", "errorMessage": "..."}`,
    /// or a non-zero `ResponseCode` on an otherwise successful response.
    #[error("Daraja error: {message}")]
    Daraja {
        status: u16,
        code: Option<String>,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the credentials were refused.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Network-level failures, timeouts and server-side (5xx) responses are
    /// transient. Anything the remote end answered deliberately is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                !e.is_decode()
                    && !e.is_builder()
                    && e.status().is_none_or(|s| s.is_server_error())
            }
            Self::Timeout { .. } => true,
            Self::RouterOs { status, .. } | Self::Daraja { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::RouterOs { status: 404, .. } => true,
            _ => false,
        }
    }

    /// The most specific human-readable reason the remote end gave, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::RouterOs { detail, .. } => detail.as_deref(),
            Self::Daraja { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
