// ── Voucher store ──
//
// Sole owner of voucher state transitions. Every transition is a
// compare-and-swap on one entry of the code-keyed collection, so two
// redemptions of the same code can never both observe `Unused`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use super::collection::EntityCollection;
use crate::config::VoucherPolicy;
use crate::error::VoucherError;
use crate::model::{
    MIN_CODE_LENGTH, PaymentId, Tariff, Voucher, VoucherCode, VoucherId, VoucherState,
};

/// Upper bound for one bulk generation request.
pub const MAX_BATCH: usize = 100;

pub struct VoucherStore {
    vouchers: EntityCollection<VoucherId, Voucher>,
    /// At most one voucher per payment.
    by_payment: DashMap<PaymentId, VoucherId>,
    next_id: AtomicU64,
}

impl VoucherStore {
    pub(crate) fn new() -> Self {
        Self {
            vouchers: EntityCollection::new(),
            by_payment: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Issuance ─────────────────────────────────────────────────────

    /// Mint one voucher for `tariff`.
    ///
    /// Expiry is `now + tariff.duration` for timed tariffs and
    /// `now + policy.default_validity_days` otherwise.
    pub fn issue(
        &self,
        tariff: &Tariff,
        payment_id: Option<PaymentId>,
        policy: &VoucherPolicy,
        now: DateTime<Utc>,
    ) -> Result<Voucher, VoucherError> {
        if policy.code_length < MIN_CODE_LENGTH {
            return Err(VoucherError::CodeTooShort {
                length: policy.code_length,
                minimum: MIN_CODE_LENGTH,
            });
        }

        let expires_at = match tariff.duration_minutes {
            Some(minutes) => now + TimeDelta::minutes(i64::from(minutes)),
            None => now + TimeDelta::days(i64::from(policy.default_validity_days)),
        };

        for attempt in 1..=policy.max_code_attempts {
            let code = VoucherCode::generate(policy.code_length);
            let id = VoucherId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let voucher = Voucher {
                id,
                code: code.clone(),
                tariff_id: tariff.id,
                payment_id,
                created_at: now,
                expires_at,
                state: VoucherState::Unused,
                used_at: None,
            };
            if self
                .vouchers
                .insert_new(code.as_str().to_owned(), id, voucher.clone())
            {
                info!(
                    voucher_id = %id,
                    code = %code.redacted(),
                    tariff_id = %tariff.id,
                    expires_at = %expires_at,
                    "voucher issued"
                );
                return Ok(voucher);
            }
            debug!(attempt, "voucher code collision, retrying");
        }

        warn!(attempts = policy.max_code_attempts, "voucher code space exhausted");
        Err(VoucherError::CodeSpaceExhausted {
            attempts: policy.max_code_attempts,
        })
    }

    /// Mint the voucher a paid payment is owed, or return the one already
    /// minted (with `false`). The payment's index slot stays locked while
    /// minting, so concurrent calls for one payment mint at most once.
    pub fn issue_for_payment(
        &self,
        tariff: &Tariff,
        payment_id: PaymentId,
        policy: &VoucherPolicy,
        now: DateTime<Utc>,
    ) -> Result<(Voucher, bool), VoucherError> {
        let entry = self.by_payment.entry(payment_id);
        let existing = match &entry {
            Entry::Occupied(slot) => self.get(*slot.get()),
            Entry::Vacant(_) => None,
        };
        if let Some(existing) = existing {
            return Ok((Arc::unwrap_or_clone(existing), false));
        }

        let voucher = self.issue(tariff, Some(payment_id), policy, now)?;
        entry.insert(voucher.id);
        Ok((voucher, true))
    }

    /// Mint `count` vouchers (1..=100) for an operator print run.
    pub fn issue_batch(
        &self,
        tariff: &Tariff,
        count: usize,
        policy: &VoucherPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<Voucher>, VoucherError> {
        if !(1..=MAX_BATCH).contains(&count) {
            return Err(VoucherError::InvalidBatchSize {
                count,
                max: MAX_BATCH,
            });
        }
        (0..count)
            .map(|_| self.issue(tariff, None, policy, now))
            .collect()
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Consume a voucher: `Unused -> Used`, atomically.
    ///
    /// This is the linearization point for redemption. Of any number of
    /// concurrent calls for one code, at most one returns `Ok`.
    pub fn redeem_atomic(
        &self,
        code: &VoucherCode,
        now: DateTime<Utc>,
    ) -> Result<Voucher, VoucherError> {
        let outcome = self
            .vouchers
            .update_if(code.as_str(), |current| match current.state {
                VoucherState::Used => Err(VoucherError::AlreadyUsed),
                VoucherState::Revoked => Err(VoucherError::Revoked),
                _ if current.is_expired_at(now) => Err(VoucherError::Expired),
                VoucherState::Unused | VoucherState::Expired => Ok(Voucher {
                    state: VoucherState::Used,
                    used_at: Some(now),
                    ..current.clone()
                }),
            })
            .ok_or(VoucherError::NotFound)?;

        let voucher = outcome?;
        debug!(voucher_id = %voucher.id, code = %code.redacted(), "voucher reserved");
        Ok(Arc::unwrap_or_clone(voucher))
    }

    /// Compensate a failed redemption: `Used -> Unused`.
    ///
    /// Any other starting state is an anomaly; it is logged and left
    /// untouched. Returns whether the voucher was reverted.
    pub fn revert_to_unused(&self, id: VoucherId) -> bool {
        let Some(key) = self.vouchers.key_for(&id) else {
            warn!(voucher_id = %id, "revert requested for unknown voucher");
            return false;
        };
        let outcome = self.vouchers.update_if(&key, |current| {
            if current.state == VoucherState::Used {
                Ok(Voucher {
                    state: VoucherState::Unused,
                    used_at: None,
                    ..current.clone()
                })
            } else {
                Err(current.state)
            }
        });
        match outcome {
            Some(Ok(_)) => {
                info!(voucher_id = %id, "voucher returned to unused");
                true
            }
            Some(Err(state)) => {
                warn!(voucher_id = %id, %state, "revert requested from non-used state, ignoring");
                false
            }
            None => false,
        }
    }

    /// Withdraw a voucher for good. `Unused`/`Used -> Revoked`.
    pub fn revoke(&self, code: &VoucherCode) -> Result<Voucher, VoucherError> {
        let voucher = self
            .vouchers
            .update_if(code.as_str(), |current| {
                if current.state == VoucherState::Revoked {
                    Err(VoucherError::Revoked)
                } else {
                    Ok(Voucher {
                        state: VoucherState::Revoked,
                        ..current.clone()
                    })
                }
            })
            .ok_or(VoucherError::NotFound)??;
        info!(voucher_id = %voucher.id, code = %code.redacted(), "voucher revoked");
        Ok(Arc::unwrap_or_clone(voucher))
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get_by_code(&self, code: &VoucherCode) -> Option<Arc<Voucher>> {
        self.vouchers.get_by_key(code.as_str())
    }

    pub fn get(&self, id: VoucherId) -> Option<Arc<Voucher>> {
        self.vouchers.get_by_id(&id)
    }

    /// The voucher minted for a payment, if any.
    pub fn for_payment(&self, payment_id: PaymentId) -> Option<Arc<Voucher>> {
        let id = *self.by_payment.get(&payment_id)?;
        self.get(id)
    }

    /// All vouchers, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Voucher>> {
        let mut all = self.vouchers.values();
        all.sort_by_key(|v| v.id);
        all
    }

    pub fn len(&self) -> usize {
        self.vouchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Persistence ──────────────────────────────────────────────────

    pub(crate) fn restore(&self, vouchers: Vec<Voucher>) {
        self.vouchers.clear();
        self.by_payment.clear();
        for voucher in vouchers {
            self.next_id.fetch_max(voucher.id.0 + 1, Ordering::Relaxed);
            if let Some(payment_id) = voucher.payment_id {
                self.by_payment.insert(payment_id, voucher.id);
            }
            let key = voucher.code.as_str().to_owned();
            self.vouchers.upsert(key, voucher.id, voucher);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::TariffId;

    fn tariff(duration_minutes: Option<u32>) -> Tariff {
        Tariff {
            id: TariffId(1),
            name: "1hr".into(),
            price: 20,
            duration_minutes,
            data_limit_bytes: None,
            upload_kbps: 1024,
            download_kbps: 2048,
        }
    }

    fn policy() -> VoucherPolicy {
        VoucherPolicy::default()
    }

    #[test]
    fn expiry_uses_tariff_duration_exactly() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(Some(60)), None, &policy(), now).unwrap();
        assert_eq!(v.expires_at, now + TimeDelta::minutes(60));
        assert_eq!(v.state, VoucherState::Unused);
        assert_eq!(v.code.as_str().len(), 12);
    }

    #[test]
    fn expiry_defaults_to_thirty_days() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(None), None, &policy(), now).unwrap();
        assert_eq!(v.expires_at, now + TimeDelta::days(30));
    }

    #[test]
    fn short_code_policy_is_refused() {
        let store = VoucherStore::new();
        let short = VoucherPolicy {
            code_length: 6,
            ..policy()
        };
        let err = store.issue(&tariff(None), None, &short, Utc::now()).unwrap_err();
        assert!(matches!(err, VoucherError::CodeTooShort { length: 6, .. }));
    }

    #[test]
    fn batch_bounds() {
        let store = VoucherStore::new();
        let now = Utc::now();
        assert!(matches!(
            store.issue_batch(&tariff(None), 0, &policy(), now),
            Err(VoucherError::InvalidBatchSize { count: 0, .. })
        ));
        assert!(store.issue_batch(&tariff(None), 101, &policy(), now).is_err());

        let batch = store.issue_batch(&tariff(None), 100, &policy(), now).unwrap();
        assert_eq!(batch.len(), 100);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn redeem_then_second_redeem_is_already_used() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(Some(60)), None, &policy(), now).unwrap();

        let used = store.redeem_atomic(&v.code, now).unwrap();
        assert_eq!(used.state, VoucherState::Used);
        assert_eq!(used.used_at, Some(now));
        assert_eq!(
            store.redeem_atomic(&v.code, now).unwrap_err(),
            VoucherError::AlreadyUsed
        );
    }

    #[test]
    fn redeem_past_expiry_leaves_voucher_unused() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(Some(60)), None, &policy(), now).unwrap();

        let later = now + TimeDelta::minutes(61);
        assert_eq!(store.redeem_atomic(&v.code, later).unwrap_err(), VoucherError::Expired);
        assert_eq!(store.get(v.id).unwrap().state, VoucherState::Unused);
    }

    #[test]
    fn unknown_code_is_not_found() {
        let store = VoucherStore::new();
        let code = VoucherCode::normalize("NOPE23456789");
        assert_eq!(
            store.redeem_atomic(&code, Utc::now()).unwrap_err(),
            VoucherError::NotFound
        );
    }

    #[test]
    fn revert_only_from_used() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(None), None, &policy(), now).unwrap();

        assert!(!store.revert_to_unused(v.id));
        store.redeem_atomic(&v.code, now).unwrap();
        assert!(store.revert_to_unused(v.id));
        let back = store.get(v.id).unwrap();
        assert_eq!(back.state, VoucherState::Unused);
        assert!(back.used_at.is_none());
        assert!(!store.revert_to_unused(VoucherId(999)));
    }

    #[test]
    fn revoked_is_terminal() {
        let store = VoucherStore::new();
        let now = Utc::now();
        let v = store.issue(&tariff(None), None, &policy(), now).unwrap();

        store.revoke(&v.code).unwrap();
        assert_eq!(store.revoke(&v.code).unwrap_err(), VoucherError::Revoked);
        assert_eq!(store.redeem_atomic(&v.code, now).unwrap_err(), VoucherError::Revoked);
        assert!(!store.revert_to_unused(v.id));
    }

    #[test]
    fn for_payment_finds_linked_voucher() {
        let store = VoucherStore::new();
        let now = Utc::now();
        store.issue(&tariff(None), None, &policy(), now).unwrap();
        let paid = store
            .issue(&tariff(None), Some(PaymentId(9)), &policy(), now)
            .unwrap();
        assert_eq!(store.for_payment(PaymentId(9)).unwrap().id, paid.id);
        assert!(store.for_payment(PaymentId(10)).is_none());
    }

    #[test]
    fn concurrent_redemptions_have_one_winner() {
        let store = Arc::new(VoucherStore::new());
        let now = Utc::now();
        let v = store.issue(&tariff(None), None, &policy(), now).unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                let code = v.code.clone();
                std::thread::spawn(move || store.redeem_atomic(&code, now).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn one_voucher_per_payment_under_contention() {
        let store = VoucherStore::new();
        let t = tariff(Some(60));
        let now = Utc::now();

        let results: Vec<(Voucher, bool)> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        store
                            .issue_for_payment(&t, PaymentId(7), &VoucherPolicy::default(), now)
                            .unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|(_, minted)| *minted).count(), 1);
        assert!(results.windows(2).all(|w| w[0].0.code == w[1].0.code));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.for_payment(PaymentId(7)).unwrap().code,
            results[0].0.code
        );
    }

    #[test]
    fn payment_index_survives_restore() {
        let store = VoucherStore::new();
        let (voucher, _) = store
            .issue_for_payment(&tariff(None), PaymentId(3), &VoucherPolicy::default(), Utc::now())
            .unwrap();

        let restored = VoucherStore::new();
        restored.restore(vec![voucher.clone()]);
        let (again, minted) = restored
            .issue_for_payment(&tariff(None), PaymentId(3), &VoucherPolicy::default(), Utc::now())
            .unwrap();
        assert!(!minted);
        assert_eq!(again.id, voucher.id);
    }
}
