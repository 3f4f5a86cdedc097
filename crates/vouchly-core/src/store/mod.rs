// ── Local data store ──
//
// The four tables (tariffs, payments, vouchers, sessions), each a
// sharded concurrent collection. Services share one `Arc<DataStore>`.

mod collection;
mod payments;
mod persist;
mod sessions;
mod tariffs;
mod vouchers;

pub use payments::{NewPayment, PaymentStore};
pub use persist::StateLock;
pub use sessions::{SessionObservation, SessionStore};
pub use tariffs::TariffStore;
pub use vouchers::{MAX_BATCH, VoucherStore};

/// Central store for all local records.
pub struct DataStore {
    pub(crate) tariffs: TariffStore,
    pub(crate) payments: PaymentStore,
    pub(crate) vouchers: VoucherStore,
    pub(crate) sessions: SessionStore,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            tariffs: TariffStore::new(),
            payments: PaymentStore::new(),
            vouchers: VoucherStore::new(),
            sessions: SessionStore::new(),
        }
    }

    pub fn tariffs(&self) -> &TariffStore {
        &self.tariffs
    }

    pub fn payments(&self) -> &PaymentStore {
        &self.payments
    }

    pub fn vouchers(&self) -> &VoucherStore {
        &self.vouchers
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
