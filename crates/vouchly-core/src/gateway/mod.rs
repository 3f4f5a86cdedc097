// ── External gateway seams ──
//
// `RouterGateway` is the only way the core talks to the router and
// `PaymentGateway` the only way it starts a payment. Both are async
// object-safe traits so services hold `Arc<dyn ...>` and tests swap in
// in-memory fakes.

mod daraja;
mod routeros;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::GatewayError;
use crate::model::MacAddress;

pub use daraja::DarajaGateway;
pub use routeros::RouterOsGateway;

// ── Router types ─────────────────────────────────────────────────────

/// A hotspot user as the router reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// RouterOS `.id`, e.g. `*1A`.
    pub router_id: String,
    pub name: String,
    pub profile: Option<String>,
    pub disabled: bool,
}

/// One entry of the router's live-session list. Any field may be absent
/// on a half-initialized session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSession {
    pub router_id: String,
    pub user: Option<String>,
    pub mac: Option<MacAddress>,
    pub address: Option<IpAddr>,
    pub uptime: Option<Duration>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// A hotspot user to create. For vouchers, name and password are the code.
#[derive(Debug, Clone)]
pub struct HotspotUserSpec {
    pub name: String,
    pub password: SecretString,
    pub profile: String,
    /// `<minutes>m`
    pub limit_uptime: Option<String>,
    /// `<MiB>M`
    pub limit_bytes_total: Option<String>,
}

/// Desired state of a router-side user profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRequest {
    pub name: String,
    pub upload_kbps: u32,
    pub download_kbps: u32,
    pub session_timeout_minutes: Option<u32>,
}

impl ProfileRequest {
    /// RouterOS `rate-limit`: `<up>k/<down>k`.
    pub fn rate_limit(&self) -> String {
        format!("{}k/{}k", self.upload_kbps, self.download_kbps)
    }

    /// RouterOS `session-timeout`: `<minutes>m`.
    pub fn session_timeout(&self) -> Option<String> {
        self.session_timeout_minutes.map(|m| format!("{m}m"))
    }
}

/// What `ensure_profile` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProfileChange {
    Created,
    Updated,
    Unchanged,
}

// ── RouterGateway ────────────────────────────────────────────────────

/// Typed operations against the hotspot router.
///
/// Every method is a bounded single network hop (plus a lookup where
/// noted) with no internal retry. Failures are classified as
/// [`GatewayError::Transient`] or [`GatewayError::Rejected`].
#[async_trait]
pub trait RouterGateway: Send + Sync {
    /// Log a device in as `identity`.
    async fn authorize_client(
        &self,
        identity: &str,
        secret: &SecretString,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
    ) -> Result<(), GatewayError>;

    /// Kick every active session of `identity`. No sessions is success.
    async fn deauthorize_client(&self, identity: &str) -> Result<(), GatewayError>;

    /// Create-if-absent; update in place when the router copy drifted.
    async fn ensure_profile(&self, profile: &ProfileRequest) -> Result<ProfileChange, GatewayError>;

    async fn list_active_sessions(&self) -> Result<Vec<RawSession>, GatewayError>;

    async fn find_user(&self, identity: &str) -> Result<Option<UserRecord>, GatewayError>;

    async fn add_user(&self, user: &HotspotUserSpec) -> Result<(), GatewayError>;

    /// Idempotent delete: an absent user is success.
    async fn remove_user(&self, identity: &str) -> Result<(), GatewayError>;
}

// ── PaymentGateway ───────────────────────────────────────────────────

/// Handle returned when a payment prompt was accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutTicket {
    pub checkout_id: String,
    pub customer_message: Option<String>,
}

/// Starts payments. The result arrives later as a callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short gateway name stored on payment records (`mpesa`).
    fn name(&self) -> &str;

    async fn initiate(
        &self,
        phone: &str,
        amount: u64,
        reference: &str,
        description: &str,
    ) -> Result<CheckoutTicket, GatewayError>;
}
