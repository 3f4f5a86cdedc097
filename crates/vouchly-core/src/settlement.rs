// ── Payment settlement ──
//
// Starts STK push payments and applies the gateway's asynchronous
// verdict. A payment yields at most one voucher: the `Pending -> Paid`
// compare-and-swap settles it once, and the voucher store's per-payment
// slot mints once. A later duplicate only mints if the first mint failed.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};
use vouchly_api::StkCallbackEnvelope;

use crate::config::VoucherPolicy;
use crate::error::{PaymentError, VoucherError};
use crate::gateway::PaymentGateway;
use crate::model::{PaymentRecord, PaymentStatus, TariffId, Voucher};
use crate::store::{DataStore, NewPayment};

/// Safaricom MSISDN in international form: `2547XXXXXXXX` / `2541XXXXXXXX`.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^254[17]\d{8}$").expect("static phone pattern"));

const REFERENCE_PREFIX: &str = "HOTSPOT-";
const REFERENCE_RANDOM_LEN: usize = 10;

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// `HOTSPOT-` followed by 10 random alphanumerics.
pub fn new_reference() -> String {
    let suffix: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{REFERENCE_PREFIX}{suffix}")
}

/// The gateway's verdict on one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    pub checkout_id: String,
    /// `0` is success; anything else (e.g. 1032 cancelled) is failure.
    pub result_code: i64,
    pub receipt: Option<String>,
}

impl SettlementEvent {
    /// `None` when the document carries no `stkCallback`; such posts are ignored.
    pub fn from_envelope(envelope: &StkCallbackEnvelope) -> Option<Self> {
        envelope.body.stk_callback.as_ref().map(Self::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Paid; this voucher was minted for it.
    Issued(Voucher),
    Failed,
    /// The payment had already settled; nothing changed.
    Duplicate,
    /// No payment with that checkout id.
    Unknown,
}

/// Polling projection of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatusView {
    /// `pending`, `paid`, `failed` or `not_found`.
    pub status: String,
    pub voucher_code: Option<String>,
    pub amount: Option<u64>,
    pub phone: Option<String>,
}

pub struct PaymentSettlement {
    store: Arc<DataStore>,
    gateway: Arc<dyn PaymentGateway>,
    policy: VoucherPolicy,
}

impl PaymentSettlement {
    pub fn new(store: Arc<DataStore>, gateway: Arc<dyn PaymentGateway>, policy: VoucherPolicy) -> Self {
        Self {
            store,
            gateway,
            policy,
        }
    }

    /// Prompt `phone` to pay for `tariff_id` and record the pending payment.
    pub async fn initiate(
        &self,
        tariff_id: TariffId,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, PaymentError> {
        let phone = phone.trim();
        if !is_valid_phone(phone) {
            return Err(PaymentError::InvalidPhone {
                phone: phone.to_owned(),
            });
        }
        let tariff = self
            .store
            .tariffs()
            .get(tariff_id)
            .ok_or(PaymentError::UnknownTariff { id: tariff_id })?;

        let reference = new_reference();
        let ticket = self
            .gateway
            .initiate(phone, tariff.price, &reference, &tariff.name)
            .await
            .inspect_err(|e| warn!(%reference, error = %e, "payment initiation failed"))?;

        let record = self
            .store
            .payments()
            .insert_pending(
                NewPayment {
                    amount: tariff.price,
                    phone: phone.to_owned(),
                    gateway: self.gateway.name().to_owned(),
                    checkout_id: ticket.checkout_id.clone(),
                    account_reference: reference,
                    tariff_id,
                },
                now,
            )
            .ok_or(PaymentError::DuplicateCheckout {
                checkout_id: ticket.checkout_id,
            })?;

        info!(
            payment_id = %record.id,
            checkout_id = %record.checkout_id,
            amount = record.amount,
            "payment initiated"
        );
        Ok(record)
    }

    /// Apply a gateway callback. Idempotent per checkout id.
    ///
    /// A repeated success callback for a payment that is paid but still
    /// has no voucher (minting failed last time) retries the mint.
    pub fn handle_callback(
        &self,
        event: SettlementEvent,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, PaymentError> {
        let payments = self.store.payments();
        let to = if event.result_code == 0 {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };

        let record = match payments.settle(&event.checkout_id, to, event.receipt) {
            None => {
                warn!(checkout_id = %event.checkout_id, "callback for unknown payment");
                return Ok(SettlementOutcome::Unknown);
            }
            Some(Err(PaymentStatus::Paid)) => match payments.get_by_checkout(&event.checkout_id) {
                Some(record) if self.store.vouchers().for_payment(record.id).is_none() => {
                    warn!(payment_id = %record.id, "paid payment has no voucher, minting again");
                    Arc::unwrap_or_clone(record)
                }
                _ => {
                    info!(checkout_id = %event.checkout_id, "duplicate callback ignored");
                    return Ok(SettlementOutcome::Duplicate);
                }
            },
            Some(Err(status)) => {
                info!(checkout_id = %event.checkout_id, %status, "duplicate callback ignored");
                return Ok(SettlementOutcome::Duplicate);
            }
            Some(Ok(record)) => record,
        };

        if record.status == PaymentStatus::Failed {
            warn!(
                payment_id = %record.id,
                checkout_id = %record.checkout_id,
                result_code = event.result_code,
                "payment failed"
            );
            return Ok(SettlementOutcome::Failed);
        }

        let (voucher, minted) = self
            .store
            .tariffs()
            .get(record.tariff_id)
            .ok_or(VoucherError::UnknownTariff { id: record.tariff_id })
            .and_then(|tariff| {
                self.store
                    .vouchers()
                    .issue_for_payment(&tariff, record.id, &self.policy, now)
            })
            .inspect_err(|e| {
                error!(payment_id = %record.id, error = %e, "paid payment left without voucher");
            })?;
        if !minted {
            info!(checkout_id = %record.checkout_id, "duplicate callback ignored");
            return Ok(SettlementOutcome::Duplicate);
        }

        info!(
            payment_id = %record.id,
            receipt = record.receipt.as_deref().unwrap_or("-"),
            voucher_id = %voucher.id,
            "payment settled, voucher issued"
        );
        Ok(SettlementOutcome::Issued(voucher))
    }

    /// Polling view for a checkout id.
    pub fn status(&self, checkout_id: &str) -> PaymentStatusView {
        let Some(record) = self.store.payments().get_by_checkout(checkout_id) else {
            return PaymentStatusView {
                status: "not_found".into(),
                voucher_code: None,
                amount: None,
                phone: None,
            };
        };
        let voucher_code = (record.status == PaymentStatus::Paid)
            .then(|| self.store.vouchers().for_payment(record.id))
            .flatten()
            .map(|v| v.code.to_string());
        PaymentStatusView {
            status: record.status.to_string(),
            voucher_code,
            amount: Some(record.amount),
            phone: Some(record.phone.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::GatewayError;
    use crate::model::{TariffDraft, VoucherState};
    use crate::testing::FakePayments;

    fn setup() -> (Arc<DataStore>, Arc<FakePayments>, PaymentSettlement, TariffId) {
        let store = Arc::new(DataStore::new());
        let tariff = store.tariffs().add(TariffDraft {
            name: "Daily".into(),
            price: 50,
            duration_minutes: Some(1440),
            data_limit_bytes: None,
            upload_kbps: 512,
            download_kbps: 1024,
        });
        let gateway = Arc::new(FakePayments::default());
        let settlement =
            PaymentSettlement::new(Arc::clone(&store), gateway.clone(), VoucherPolicy::default());
        (store, gateway, settlement, tariff.id)
    }

    fn paid(checkout: &str) -> SettlementEvent {
        SettlementEvent {
            checkout_id: checkout.into(),
            result_code: 0,
            receipt: Some("NLJ7RT61SV".into()),
        }
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("254712345678"));
        assert!(is_valid_phone("254112345678"));
        assert!(!is_valid_phone("0712345678"));
        assert!(!is_valid_phone("254812345678"));
        assert!(!is_valid_phone("2547123456789"));
        assert!(!is_valid_phone("+254712345678"));
    }

    #[test]
    fn reference_shape() {
        let r = new_reference();
        assert!(r.starts_with("HOTSPOT-"));
        assert_eq!(r.len(), 18);
        assert!(r[8..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn initiate_records_pending_payment() {
        let (_store, gateway, settlement, tariff) = setup();
        let record = settlement
            .initiate(tariff, " 254712345678 ", Utc::now())
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.amount, 50);
        assert_eq!(record.checkout_id, "ws_CO_1");
        assert_eq!(record.gateway, "mpesa");

        let pushes = gateway.pushes();
        assert_eq!(pushes[0].0, "254712345678");
        assert_eq!(pushes[0].2, record.account_reference);
        assert_eq!(settlement.status("ws_CO_1").status, "pending");
    }

    #[tokio::test]
    async fn initiate_rejects_bad_input_before_calling_gateway() {
        let (_store, gateway, settlement, tariff) = setup();
        assert!(matches!(
            settlement.initiate(tariff, "0712345678", Utc::now()).await,
            Err(PaymentError::InvalidPhone { .. })
        ));
        assert!(matches!(
            settlement.initiate(TariffId(99), "254712345678", Utc::now()).await,
            Err(PaymentError::UnknownTariff { .. })
        ));
        assert!(gateway.pushes().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_records_nothing() {
        let (store, gateway, settlement, tariff) = setup();
        gateway.fail_next(GatewayError::Rejected {
            operation: "stk_push",
            message: "Invalid PhoneNumber".into(),
        });
        assert!(matches!(
            settlement.initiate(tariff, "254712345678", Utc::now()).await,
            Err(PaymentError::Gateway(_))
        ));
        assert!(store.payments().list().is_empty());
    }

    #[tokio::test]
    async fn duplicate_callback_issues_one_voucher() {
        let (store, _gateway, settlement, tariff) = setup();
        let now = Utc::now();
        settlement.initiate(tariff, "254712345678", now).await.unwrap();

        let first = settlement.handle_callback(paid("ws_CO_1"), now).unwrap();
        let SettlementOutcome::Issued(voucher) = first else {
            panic!("expected Issued, got {first:?}");
        };
        assert_eq!(voucher.state, VoucherState::Unused);
        assert_eq!(
            settlement.handle_callback(paid("ws_CO_1"), now).unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(store.vouchers().len(), 1);

        let view = settlement.status("ws_CO_1");
        assert_eq!(view.status, "paid");
        assert_eq!(view.voucher_code, Some(voucher.code.to_string()));
        assert_eq!(view.amount, Some(50));
        assert_eq!(
            store.payments().get_by_checkout("ws_CO_1").unwrap().receipt.as_deref(),
            Some("NLJ7RT61SV")
        );
    }

    #[tokio::test]
    async fn concurrent_callbacks_issue_one_voucher() {
        let (store, _gateway, settlement, tariff) = setup();
        let now = Utc::now();
        settlement.initiate(tariff, "254712345678", now).await.unwrap();

        let settlement = Arc::new(settlement);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let settlement = Arc::clone(&settlement);
                std::thread::spawn(move || settlement.handle_callback(paid("ws_CO_1"), now))
            })
            .collect();
        let issued = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|o| matches!(o, SettlementOutcome::Issued(_)))
            .count();
        assert_eq!(issued, 1);
        assert_eq!(store.vouchers().len(), 1);
    }

    #[tokio::test]
    async fn failed_and_unknown_callbacks() {
        let (store, _gateway, settlement, tariff) = setup();
        let now = Utc::now();
        settlement.initiate(tariff, "254712345678", now).await.unwrap();

        let cancelled = SettlementEvent {
            checkout_id: "ws_CO_1".into(),
            result_code: 1032,
            receipt: None,
        };
        assert_eq!(
            settlement.handle_callback(cancelled, now).unwrap(),
            SettlementOutcome::Failed
        );
        assert_eq!(
            settlement.handle_callback(paid("ws_CO_1"), now).unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(
            settlement.handle_callback(paid("ws_CO_404"), now).unwrap(),
            SettlementOutcome::Unknown
        );
        assert!(store.vouchers().is_empty());

        let view = settlement.status("ws_CO_1");
        assert_eq!(view.status, "failed");
        assert!(view.voucher_code.is_none());
        assert_eq!(settlement.status("nope").status, "not_found");
    }

    #[tokio::test]
    async fn paid_payment_without_voucher_is_minted_on_retry() {
        let (store, gateway, settlement, tariff) = setup();
        let now = Utc::now();
        settlement.initiate(tariff, "254712345678", now).await.unwrap();

        let short_codes = VoucherPolicy {
            code_length: 4,
            ..VoucherPolicy::default()
        };
        let failing = PaymentSettlement::new(Arc::clone(&store), gateway, short_codes);
        assert!(matches!(
            failing.handle_callback(paid("ws_CO_1"), now),
            Err(PaymentError::Voucher(VoucherError::CodeTooShort { .. }))
        ));
        assert_eq!(settlement.status("ws_CO_1").status, "paid");
        assert!(store.vouchers().is_empty());

        let retried = settlement.handle_callback(paid("ws_CO_1"), now).unwrap();
        let SettlementOutcome::Issued(voucher) = retried else {
            panic!("expected Issued, got {retried:?}");
        };
        assert_eq!(
            settlement.handle_callback(paid("ws_CO_1"), now).unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(store.vouchers().len(), 1);
        assert_eq!(
            settlement.status("ws_CO_1").voucher_code,
            Some(voucher.code.to_string())
        );
    }
}
