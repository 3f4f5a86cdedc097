// ── Payment store ──
//
// Keyed by the gateway checkout id, the only handle a callback carries.
// Status moves one way, `Pending -> Paid | Failed`, via compare-and-swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::collection::EntityCollection;
use crate::model::{PaymentId, PaymentRecord, PaymentStatus, TariffId};

/// Fields of a payment at initiation time.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: u64,
    pub phone: String,
    pub gateway: String,
    pub checkout_id: String,
    pub account_reference: String,
    pub tariff_id: TariffId,
}

pub struct PaymentStore {
    payments: EntityCollection<PaymentId, PaymentRecord>,
    next_id: AtomicU64,
}

impl PaymentStore {
    pub(crate) fn new() -> Self {
        Self {
            payments: EntityCollection::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a pending payment. `None` if the checkout id is already known.
    pub fn insert_pending(&self, new: NewPayment, now: DateTime<Utc>) -> Option<PaymentRecord> {
        let id = PaymentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = PaymentRecord {
            id,
            amount: new.amount,
            phone: new.phone,
            gateway: new.gateway,
            checkout_id: new.checkout_id,
            account_reference: new.account_reference,
            receipt: None,
            status: PaymentStatus::Pending,
            tariff_id: new.tariff_id,
            created_at: now,
        };
        self.payments
            .insert_new(record.checkout_id.clone(), id, record.clone())
            .then_some(record)
    }

    /// Move a pending payment to `to`. Returns the updated record, or the
    /// status it already had if it was not pending. `None` if unknown.
    pub fn settle(
        &self,
        checkout_id: &str,
        to: PaymentStatus,
        receipt: Option<String>,
    ) -> Option<Result<PaymentRecord, PaymentStatus>> {
        let outcome = self.payments.update_if(checkout_id, |current| {
            if current.status.is_terminal() {
                return Err(current.status);
            }
            Ok(PaymentRecord {
                status: to,
                receipt: receipt.or_else(|| current.receipt.clone()),
                ..current.clone()
            })
        })?;
        Some(outcome.map(Arc::unwrap_or_clone))
    }

    pub fn get_by_checkout(&self, checkout_id: &str) -> Option<Arc<PaymentRecord>> {
        self.payments.get_by_key(checkout_id)
    }

    pub fn get(&self, id: PaymentId) -> Option<Arc<PaymentRecord>> {
        self.payments.get_by_id(&id)
    }

    /// All payments, oldest first.
    pub fn list(&self) -> Vec<Arc<PaymentRecord>> {
        let mut all = self.payments.values();
        all.sort_by_key(|p| p.id);
        all
    }

    pub(crate) fn restore(&self, payments: Vec<PaymentRecord>) {
        self.payments.clear();
        for payment in payments {
            self.next_id.fetch_max(payment.id.0 + 1, Ordering::Relaxed);
            self.payments
                .upsert(payment.checkout_id.clone(), payment.id, payment);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pending(checkout: &str) -> NewPayment {
        NewPayment {
            amount: 50,
            phone: "254712345678".into(),
            gateway: "mpesa".into(),
            checkout_id: checkout.into(),
            account_reference: "HOTSPOT-ABCDEFGHJK".into(),
            tariff_id: TariffId(1),
        }
    }

    #[test]
    fn checkout_ids_are_unique() {
        let store = PaymentStore::new();
        let now = Utc::now();
        assert!(store.insert_pending(pending("ws_CO_1"), now).is_some());
        assert!(store.insert_pending(pending("ws_CO_1"), now).is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn settle_is_one_way() {
        let store = PaymentStore::new();
        store.insert_pending(pending("ws_CO_1"), Utc::now()).unwrap();

        let paid = store
            .settle("ws_CO_1", PaymentStatus::Paid, Some("NLJ7RT61SV".into()))
            .unwrap()
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.receipt.as_deref(), Some("NLJ7RT61SV"));

        let again = store.settle("ws_CO_1", PaymentStatus::Failed, None).unwrap();
        assert_eq!(again.unwrap_err(), PaymentStatus::Paid);
        assert!(store.settle("ws_CO_404", PaymentStatus::Paid, None).is_none());
    }
}
