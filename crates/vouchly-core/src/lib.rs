//! Voucher lifecycle and router reconciliation engine for a MikroTik
//! hotspot captive portal.
//!
//! - **[`Portal`]**: Facade that wires configuration, the store, the
//!   gateways and the services. Consumers talk to this type only.
//!
//! - **[`DataStore`]**: Tariffs, payments, vouchers and sessions, each a
//!   `DashMap`-backed collection with per-entry compare-and-swap. Loads
//!   from and saves to one JSON state file.
//!
//! - **[`RouterGateway`] / [`PaymentGateway`]**: Object-safe async seams
//!   over the router (RouterOS REST) and the payment provider (M-Pesa
//!   Daraja). Errors are classified `Transient` or `Rejected`.
//!
//! - **Services**: [`ProfileProvisioner`] (tariff to router profile),
//!   [`RedemptionCoordinator`] (reserve, authorize, compensate),
//!   [`SessionReconciler`] (live-session upsert) and
//!   [`PaymentSettlement`] (STK push and idempotent callbacks).

pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod model;
pub mod portal;
pub mod provision;
pub mod reconcile;
pub mod redeem;
pub mod settlement;
pub mod store;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    DarajaConfig, DarajaEnvironment, PortalConfig, RouterConfig, TlsVerification, VoucherPolicy,
};
pub use error::{
    CoreError, GatewayError, PaymentError, ProvisionError, RedemptionError, RevokeError,
    VoucherError,
};
pub use gateway::{
    CheckoutTicket, DarajaGateway, HotspotUserSpec, PaymentGateway, ProfileChange,
    ProfileRequest, RawSession, RouterGateway, RouterOsGateway, UserRecord,
};
pub use portal::{Portal, ProvisionedTariff};
pub use provision::ProfileProvisioner;
pub use reconcile::{ReconcileReport, SessionReconciler};
pub use redeem::{RedemptionAttempt, RedemptionCoordinator, RedemptionPhase};
pub use settlement::{PaymentSettlement, PaymentStatusView, SettlementEvent, SettlementOutcome};
pub use store::{DataStore, StateLock};
pub use vouchly_api::StkCallbackEnvelope;

pub use model::{
    MacAddress, PaymentId, PaymentRecord, PaymentStatus, Session, SessionId, Tariff, TariffDraft,
    TariffId, Voucher, VoucherCode, VoucherId, VoucherState,
};
