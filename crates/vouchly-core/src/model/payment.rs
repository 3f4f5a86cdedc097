// ── Payment domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entity_id::{PaymentId, TariffId};

/// Payment lifecycle. Only `Pending` ever transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub amount: u64,
    pub phone: String,
    pub gateway: String,
    /// Gateway transaction reference (Daraja `CheckoutRequestID`). Unique.
    pub checkout_id: String,
    /// Our `AccountReference`, shown on the payer's statement.
    pub account_reference: String,
    pub receipt: Option<String>,
    pub status: PaymentStatus,
    pub tariff_id: TariffId,
    pub created_at: DateTime<Utc>,
}
