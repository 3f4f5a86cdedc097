// ── Portal facade ──
//
// Wires configuration, the local store, the router and payment gateways
// and the four services together. Consumers (the CLI, an HTTP front end)
// talk to this type only.

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vouchly_api::StkCallbackEnvelope;

use crate::config::PortalConfig;
use crate::error::{CoreError, GatewayError, RedemptionError, RevokeError};
use crate::gateway::{DarajaGateway, PaymentGateway, ProfileChange, RouterGateway, RouterOsGateway};
use crate::model::{
    MacAddress, PaymentRecord, Session, Tariff, TariffDraft, TariffId, Voucher, VoucherCode,
};
use crate::provision::ProfileProvisioner;
use crate::reconcile::{ReconcileReport, SessionReconciler};
use crate::redeem::RedemptionCoordinator;
use crate::settlement::{PaymentSettlement, PaymentStatusView, SettlementEvent, SettlementOutcome};
use crate::store::{DataStore, StateLock};

/// A tariff together with what provisioning did to its router profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedTariff {
    pub tariff: Tariff,
    pub profile: ProfileChange,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<PortalInner>`.
#[derive(Clone)]
pub struct Portal {
    inner: Arc<PortalInner>,
}

/// Who may write the state file on [`Portal::save`].
enum StateHold {
    /// Store supplied by the caller, who owns any locking.
    Unmanaged,
    /// Locked since load; saves are safe.
    Held(StateLock),
    /// Handed to the watch loop, which locks per pass.
    Released,
}

struct PortalInner {
    config: PortalConfig,
    store: Arc<DataStore>,
    state: Mutex<StateHold>,
    provisioner: ProfileProvisioner,
    coordinator: RedemptionCoordinator,
    reconciler: SessionReconciler,
    /// `None` when the profile has no M-Pesa settings.
    settlement: Option<PaymentSettlement>,
}

impl Portal {
    /// Build a portal from configuration: lock and load the state file
    /// (if any) and construct the RouterOS and Daraja gateways. Makes no
    /// network calls.
    ///
    /// Blocks while another process holds the state file. The lock is
    /// kept until the portal is dropped, so load and [`save`](Self::save)
    /// see no interleaved writers.
    pub fn new(config: PortalConfig) -> Result<Self, CoreError> {
        config
            .vouchers
            .validate()
            .map_err(|message| CoreError::Config { message })?;

        let (store, hold) = match &config.state_file {
            Some(path) => {
                let lock = StateLock::acquire(path)?;
                (DataStore::load(path)?, StateHold::Held(lock))
            }
            None => (DataStore::new(), StateHold::Unmanaged),
        };
        let router: Arc<dyn RouterGateway> = Arc::new(RouterOsGateway::new(&config.router)?);
        let payments = match &config.daraja {
            Some(daraja) => Some(Arc::new(DarajaGateway::new(daraja)?) as Arc<dyn PaymentGateway>),
            None => None,
        };
        Ok(Self::assemble(config, store, router, payments, hold))
    }

    /// Build a portal around caller-supplied gateways. The caller owns
    /// any cross-process locking of the state file.
    pub fn with_gateways(
        config: PortalConfig,
        store: DataStore,
        router: Arc<dyn RouterGateway>,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self::assemble(config, store, router, payments, StateHold::Unmanaged)
    }

    fn assemble(
        config: PortalConfig,
        store: DataStore,
        router: Arc<dyn RouterGateway>,
        payments: Option<Arc<dyn PaymentGateway>>,
        hold: StateHold,
    ) -> Self {
        let store = Arc::new(store);
        let settlement = payments
            .map(|gateway| PaymentSettlement::new(Arc::clone(&store), gateway, config.vouchers));
        Self {
            inner: Arc::new(PortalInner {
                provisioner: ProfileProvisioner::new(Arc::clone(&router)),
                coordinator: RedemptionCoordinator::new(Arc::clone(&store), Arc::clone(&router)),
                reconciler: SessionReconciler::new(Arc::clone(&store), router)
                    .with_state_file(config.state_file.clone()),
                settlement,
                store,
                state: Mutex::new(hold),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// Write the store to the configured state file. No-op without one,
    /// and after [`watch_sessions`](Self::watch_sessions) gave the file to
    /// its per-pass checkpoints.
    pub fn save(&self) -> Result<(), CoreError> {
        let Some(path) = &self.inner.config.state_file else {
            return Ok(());
        };
        let hold = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*hold, StateHold::Released) {
            debug!("state already checkpointed by the watch loop");
            return Ok(());
        }
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        self.inner.store.save(path)
    }

    // ── Tariffs ──────────────────────────────────────────────────────

    pub fn tariffs(&self) -> Vec<Arc<Tariff>> {
        self.inner.store.tariffs().list()
    }

    pub fn tariff(&self, id: TariffId) -> Result<Arc<Tariff>, CoreError> {
        self.inner
            .store
            .tariffs()
            .get(id)
            .ok_or(CoreError::TariffNotFound { id })
    }

    /// Create a tariff and provision its router profile.
    ///
    /// The tariff is kept even if provisioning fails; retry with
    /// [`provision_tariff`](Self::provision_tariff).
    pub async fn add_tariff(&self, draft: TariffDraft) -> Result<ProvisionedTariff, CoreError> {
        draft
            .validate()
            .map_err(|message| CoreError::ValidationFailed { message })?;
        let tariff = self.inner.store.tariffs().add(draft);
        info!(tariff_id = %tariff.id, name = %tariff.name, "tariff created");
        self.provision(tariff).await
    }

    /// Replace a tariff's fields and re-provision its router profile.
    /// Vouchers already issued keep their expiry.
    pub async fn update_tariff(
        &self,
        id: TariffId,
        draft: TariffDraft,
    ) -> Result<ProvisionedTariff, CoreError> {
        draft
            .validate()
            .map_err(|message| CoreError::ValidationFailed { message })?;
        let tariff = self
            .inner
            .store
            .tariffs()
            .update(id, draft)
            .ok_or(CoreError::TariffNotFound { id })?;
        info!(tariff_id = %id, "tariff updated");
        self.provision(tariff).await
    }

    /// Ensure the router profile for an existing tariff.
    pub async fn provision_tariff(&self, id: TariffId) -> Result<ProvisionedTariff, CoreError> {
        let tariff = self.tariff(id)?;
        self.provision(Arc::unwrap_or_clone(tariff)).await
    }

    async fn provision(&self, tariff: Tariff) -> Result<ProvisionedTariff, CoreError> {
        let profile = self
            .inner
            .provisioner
            .ensure(&tariff)
            .await
            .inspect_err(|_| warn!(tariff_id = %tariff.id, "tariff saved without router profile"))?;
        Ok(ProvisionedTariff { tariff, profile })
    }

    // ── Vouchers ─────────────────────────────────────────────────────

    pub fn vouchers(&self) -> Vec<Arc<Voucher>> {
        self.inner.store.vouchers().snapshot()
    }

    pub fn voucher(&self, code: &str) -> Result<Arc<Voucher>, CoreError> {
        let code = VoucherCode::normalize(code);
        self.inner
            .store
            .vouchers()
            .get_by_code(&code)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "voucher".into(),
                identifier: code.redacted(),
            })
    }

    /// Mint `count` unpaid vouchers for printing.
    pub fn generate_vouchers(
        &self,
        tariff_id: TariffId,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Voucher>, CoreError> {
        let tariff = self.tariff(tariff_id)?;
        let vouchers =
            self.inner
                .store
                .vouchers()
                .issue_batch(&tariff, count, &self.inner.config.vouchers, now)?;
        info!(tariff_id = %tariff_id, count = vouchers.len(), "vouchers generated");
        Ok(vouchers)
    }

    pub async fn redeem(
        &self,
        code: &str,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<Session, RedemptionError> {
        self.inner
            .coordinator
            .redeem(code, device_mac, client_ip, now)
            .await
    }

    pub async fn revoke(&self, code: &str) -> Result<Voucher, RevokeError> {
        self.inner.coordinator.revoke(code).await
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.store.sessions().list()
    }

    /// One reconciliation pass against the router.
    pub async fn sync_sessions(&self) -> Result<ReconcileReport, GatewayError> {
        self.inner.reconciler.tick().await
    }

    /// Reconcile every `interval` until `cancel` fires.
    ///
    /// Releases this portal's state lock first. Each pass then locks the
    /// file, reloads it, reconciles and saves, so other processes keep
    /// working between passes.
    pub async fn watch_sessions(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        on_tick: impl FnMut(&Result<ReconcileReport, CoreError>) + Send,
    ) {
        {
            let mut hold = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*hold, StateHold::Held(_)) {
                *hold = StateHold::Released;
            }
        }
        self.inner.reconciler.run(interval, cancel, on_tick).await;
    }

    // ── Payments ─────────────────────────────────────────────────────

    fn settlement(&self) -> Result<&PaymentSettlement, CoreError> {
        self.inner
            .settlement
            .as_ref()
            .ok_or(CoreError::PaymentsDisabled)
    }

    pub fn payments(&self) -> Vec<Arc<PaymentRecord>> {
        self.inner.store.payments().list()
    }

    pub async fn initiate_payment(
        &self,
        tariff_id: TariffId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, CoreError> {
        Ok(self.settlement()?.initiate(tariff_id, phone, now).await?)
    }

    /// Apply a raw Daraja callback document. `Ok(None)` when it carries
    /// no `stkCallback`.
    pub fn handle_callback(
        &self,
        envelope: &StkCallbackEnvelope,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementOutcome>, CoreError> {
        let settlement = self.settlement()?;
        let Some(event) = SettlementEvent::from_envelope(envelope) else {
            warn!("callback without stkCallback ignored");
            return Ok(None);
        };
        Ok(Some(settlement.handle_callback(event, now)?))
    }

    pub fn payment_status(&self, checkout_id: &str) -> Result<PaymentStatusView, CoreError> {
        Ok(self.settlement()?.status(checkout_id))
    }
}
