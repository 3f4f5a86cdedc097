// ── Hotspot session domain type ──

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::{MacAddress, SessionId};
use super::voucher::VoucherCode;

/// A device's use of a voucher. Identity is `(voucher_code, mac)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub voucher_code: VoucherCode,
    pub mac: MacAddress,
    pub ip: Option<IpAddr>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl Session {
    pub fn key(&self) -> String {
        session_key(&self.voucher_code, &self.mac)
    }
}

/// Store key for the `(code, mac)` natural key.
pub fn session_key(code: &VoucherCode, mac: &MacAddress) -> String {
    format!("{code}|{mac}")
}
