// ── Voucher redemption ──
//
// One attempt walks `Validating -> Reserved -> Authorizing` and ends in
// `Committed` or `RolledBack`. The voucher is reserved by CAS before any
// network call and returned to `Unused` if the router step fails, so a
// voucher is never left consumed without an authorized device.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use strum::Display;
use tracing::{error, info, warn};

use crate::error::{GatewayError, RedemptionError, RevokeError, VoucherError};
use crate::gateway::RouterGateway;
use crate::model::{MacAddress, Session, Voucher, VoucherCode, VoucherState};
use crate::provision::user_for;
use crate::store::DataStore;

// ── Attempt state machine ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RedemptionPhase {
    Validating,
    Reserved,
    Authorizing,
    Committed,
    RolledBack,
}

impl RedemptionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    fn can_advance_to(self, next: Self) -> bool {
        use RedemptionPhase::{Authorizing, Committed, Reserved, RolledBack, Validating};
        matches!(
            (self, next),
            (Validating, Reserved | RolledBack)
                | (Reserved, Authorizing | RolledBack)
                | (Authorizing, Committed | RolledBack)
        )
    }
}

/// Record of one redemption attempt and every phase it passed through.
#[derive(Debug, Clone)]
pub struct RedemptionAttempt {
    code: VoucherCode,
    history: Vec<RedemptionPhase>,
    outcome: Option<Result<Session, RedemptionError>>,
}

impl RedemptionAttempt {
    fn new(code: VoucherCode) -> Self {
        Self {
            code,
            history: vec![RedemptionPhase::Validating],
            outcome: None,
        }
    }

    pub fn phase(&self) -> RedemptionPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(RedemptionPhase::Validating)
    }

    pub fn history(&self) -> &[RedemptionPhase] {
        &self.history
    }

    pub fn outcome(&self) -> Option<&Result<Session, RedemptionError>> {
        self.outcome.as_ref()
    }

    pub fn into_result(self) -> Result<Session, RedemptionError> {
        self.outcome.unwrap_or(Err(RedemptionError::InvalidCode))
    }

    /// Move to `next`. Refuses (returns `false`) anything but the edges
    /// of the state machine.
    pub fn advance(&mut self, next: RedemptionPhase) -> bool {
        let current = self.phase();
        if !current.can_advance_to(next) {
            warn!(code = %self.code.redacted(), from = %current, to = %next, "illegal redemption transition refused");
            return false;
        }
        self.history.push(next);
        true
    }

    fn finish(&mut self, result: Result<Session, RedemptionError>) {
        let terminal = if result.is_ok() {
            RedemptionPhase::Committed
        } else {
            RedemptionPhase::RolledBack
        };
        let advanced = self.advance(terminal);
        debug_assert!(advanced, "redemption finished from {}", self.phase());
        self.outcome = Some(result);
    }
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Validates a presented code, reserves it, logs the device in on the
/// router, and compensates if the router step fails.
pub struct RedemptionCoordinator {
    store: Arc<DataStore>,
    gateway: Arc<dyn RouterGateway>,
}

impl RedemptionCoordinator {
    pub fn new(store: Arc<DataStore>, gateway: Arc<dyn RouterGateway>) -> Self {
        Self { store, gateway }
    }

    /// Redeem `code` for the device `device_mac`.
    pub async fn redeem(
        &self,
        code: &str,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<Session, RedemptionError> {
        self.attempt(code, device_mac, client_ip, now)
            .await
            .into_result()
    }

    /// Like [`redeem`](Self::redeem), returning the full attempt record.
    pub async fn attempt(
        &self,
        code: &str,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> RedemptionAttempt {
        let code = VoucherCode::normalize(code);
        let mut attempt = RedemptionAttempt::new(code.clone());
        let vouchers = self.store.vouchers();

        // ── Validating ──
        let Some(current) = vouchers.get_by_code(&code) else {
            info!(code = %code.redacted(), "redemption refused: unknown code");
            attempt.finish(Err(RedemptionError::InvalidCode));
            return attempt;
        };
        if let Err(e) = precheck(&current, now) {
            info!(code = %code.redacted(), reason = %e, "redemption refused");
            attempt.finish(Err(e));
            return attempt;
        }

        // ── Reserved ──
        let voucher = match vouchers.redeem_atomic(&code, now) {
            Ok(v) => v,
            Err(e) => {
                info!(code = %code.redacted(), reason = %e, "redemption lost reservation");
                attempt.finish(Err(reservation_error(e)));
                return attempt;
            }
        };
        attempt.advance(RedemptionPhase::Reserved);

        // ── Authorizing ──
        attempt.advance(RedemptionPhase::Authorizing);
        if let Err(source) = self.authorize(&voucher, device_mac, client_ip).await {
            let reverted = vouchers.revert_to_unused(voucher.id);
            warn!(
                code = %code.redacted(),
                error = %source,
                reverted,
                "router authorization failed, voucher rolled back"
            );
            attempt.finish(Err(RedemptionError::AuthorizationFailed { source }));
            return attempt;
        }

        // ── Committed ──
        let session = self
            .store
            .sessions()
            .open(&voucher.code, device_mac, client_ip, now);
        info!(
            code = %code.redacted(),
            mac = %device_mac,
            session_id = %session.id,
            "voucher redeemed"
        );
        attempt.finish(Ok(session));
        attempt
    }

    /// Make sure the hotspot user exists, then log the device in.
    async fn authorize(
        &self,
        voucher: &Voucher,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
    ) -> Result<(), GatewayError> {
        let identity = voucher.code.as_str();
        if self.gateway.find_user(identity).await?.is_none() {
            let Some(tariff) = self.store.tariffs().get(voucher.tariff_id) else {
                error!(voucher_id = %voucher.id, tariff_id = %voucher.tariff_id, "voucher references missing tariff");
                return Err(GatewayError::Rejected {
                    operation: "add_user",
                    message: format!("tariff {} not found", voucher.tariff_id),
                });
            };
            self.gateway.add_user(&user_for(voucher, &tariff)).await?;
        }
        let secret = SecretString::from(identity.to_owned());
        self.gateway
            .authorize_client(identity, &secret, device_mac, client_ip)
            .await
    }

    /// Withdraw a voucher locally, then remove it from the router.
    ///
    /// Local revocation stands even if the router clean-up fails.
    pub async fn revoke(&self, code: &str) -> Result<Voucher, RevokeError> {
        let code = VoucherCode::normalize(code);
        let voucher = self.store.vouchers().revoke(&code)?;

        let cleanup = async {
            self.gateway.deauthorize_client(code.as_str()).await?;
            self.gateway.remove_user(code.as_str()).await
        };
        if let Err(source) = cleanup.await {
            warn!(code = %code.redacted(), error = %source, "router clean-up after revoke failed");
            return Err(RevokeError::Gateway { source });
        }
        Ok(voucher)
    }
}

/// Read-only checks before reservation. No mutation on refusal.
fn precheck(voucher: &Voucher, now: DateTime<Utc>) -> Result<(), RedemptionError> {
    match voucher.state {
        VoucherState::Revoked => Err(RedemptionError::InvalidCode),
        VoucherState::Used => Err(RedemptionError::AlreadyUsed),
        _ if voucher.is_expired_at(now) => Err(RedemptionError::Expired),
        VoucherState::Unused | VoucherState::Expired => Ok(()),
    }
}

fn reservation_error(err: VoucherError) -> RedemptionError {
    match err {
        VoucherError::AlreadyUsed => RedemptionError::AlreadyUsed,
        VoucherError::Expired => RedemptionError::Expired,
        _ => RedemptionError::InvalidCode,
    }
}
