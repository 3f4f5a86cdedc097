// ── Voucher domain types ──
//
// A voucher code doubles as the hotspot username and password, so codes
// come from the OS CSPRNG and are only ever logged in redacted form.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entity_id::{PaymentId, TariffId, VoucherId};

/// Code alphabet: uppercase alphanumerics minus the look-alikes `0 O 1 I`.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const MIN_CODE_LENGTH: usize = 10;
pub const DEFAULT_CODE_LENGTH: usize = 12;

// ── VoucherCode ─────────────────────────────────────────────────────

/// Opaque voucher token, stored uppercase.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherCode(String);

impl VoucherCode {
    /// Normalize user or router input: trimmed and uppercased.
    pub fn normalize(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Draw a fresh code of `len` symbols from the OS CSPRNG.
    pub fn generate(len: usize) -> Self {
        Self::generate_with(&mut OsRng, len)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let code = (0..len)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First three symbols, the rest masked. Safe for logs.
    pub fn redacted(&self) -> String {
        let shown: String = self.0.chars().take(3).collect();
        let hidden = self.0.chars().count().saturating_sub(3);
        format!("{shown}{}", "*".repeat(hidden))
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoucherCode({})", self.redacted())
    }
}

// ── VoucherState ────────────────────────────────────────────────────

/// Stored lifecycle state. `Expired` is never stored; it is derived at
/// read time from `expires_at` (see [`Voucher::effective_state`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VoucherState {
    Unused,
    Used,
    Expired,
    Revoked,
}

// ── Voucher ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub code: VoucherCode,
    pub tariff_id: TariffId,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: VoucherState,
    pub used_at: Option<DateTime<Utc>>,
}

impl Voucher {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// State as an operator would see it at `now`: an unused voucher past
    /// its expiry reads as `Expired`.
    pub fn effective_state(&self, now: DateTime<Utc>) -> VoucherState {
        match self.state {
            VoucherState::Unused if self.is_expired_at(now) => VoucherState::Expired,
            other => other,
        }
    }
}
