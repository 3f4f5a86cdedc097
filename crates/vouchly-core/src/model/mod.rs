// ── Canonical domain model ──
//
// Tariffs, vouchers, payments and sessions as the core sees them.
// Router and gateway wire types are converted into these in `convert`.

pub mod entity_id;
pub mod payment;
pub mod session;
pub mod tariff;
pub mod voucher;

pub use entity_id::{MacAddress, PaymentId, SessionId, TariffId, VoucherId};
pub use payment::{PaymentRecord, PaymentStatus};
pub use session::{Session, session_key};
pub use tariff::{Tariff, TariffDraft, profile_name};
pub use voucher::{
    CODE_ALPHABET, DEFAULT_CODE_LENGTH, MIN_CODE_LENGTH, Voucher, VoucherCode, VoucherState,
};
