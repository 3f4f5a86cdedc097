// ── Wire type -> domain type conversions ──
//
// RouterOS hands back strings for everything; these impls do the
// parsing once so the rest of the core deals in typed values.

use secrecy::ExposeSecret;
use vouchly_api::StkCallback;
use vouchly_api::routeros::{ActiveSession, HotspotUser, NewHotspotUser, parse_duration};

use crate::gateway::{HotspotUserSpec, RawSession, UserRecord};
use crate::model::MacAddress;
use crate::settlement::SettlementEvent;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn counter(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

// ── RouterOS ─────────────────────────────────────────────────────────

impl From<HotspotUser> for UserRecord {
    fn from(u: HotspotUser) -> Self {
        let disabled = u.is_disabled();
        Self {
            router_id: u.id,
            name: u.name,
            profile: non_empty(u.profile),
            disabled,
        }
    }
}

impl From<ActiveSession> for RawSession {
    fn from(s: ActiveSession) -> Self {
        Self {
            bytes_in: counter(s.bytes_in.as_deref()),
            bytes_out: counter(s.bytes_out.as_deref()),
            uptime: s.uptime.as_deref().and_then(parse_duration),
            address: s.address.as_deref().and_then(|a| a.trim().parse().ok()),
            mac: non_empty(s.mac_address).map(MacAddress::new),
            user: non_empty(s.user),
            router_id: s.id,
        }
    }
}

impl From<&HotspotUserSpec> for NewHotspotUser {
    fn from(spec: &HotspotUserSpec) -> Self {
        Self {
            name: spec.name.clone(),
            password: spec.password.expose_secret().to_owned(),
            profile: spec.profile.clone(),
            limit_uptime: spec.limit_uptime.clone(),
            limit_bytes_total: spec.limit_bytes_total.clone(),
        }
    }
}

// ── Daraja ───────────────────────────────────────────────────────────

impl From<&StkCallback> for SettlementEvent {
    fn from(cb: &StkCallback) -> Self {
        Self {
            checkout_id: cb.checkout_request_id.clone(),
            result_code: cb.result_code,
            receipt: cb.receipt_number(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn active_session_strings_are_parsed() {
        let wire: ActiveSession = serde_json::from_value(json!({
            ".id": "*A1",
            "user": "ABCD2345EFGH",
            "mac-address": "AA:BB:CC:DD:EE:FF",
            "address": "10.5.50.12",
            "uptime": "1h2m3s",
            "bytes-in": "1048576",
            "bytes-out": "garbage"
        }))
        .unwrap();
        let raw = RawSession::from(wire);
        assert_eq!(raw.user.as_deref(), Some("ABCD2345EFGH"));
        assert_eq!(raw.mac.unwrap().as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(raw.address, "10.5.50.12".parse().ok());
        assert_eq!(raw.uptime, Some(Duration::from_secs(3723)));
        assert_eq!(raw.bytes_in, 1_048_576);
        assert_eq!(raw.bytes_out, 0);
    }

    #[test]
    fn blank_fields_become_none() {
        let wire: ActiveSession = serde_json::from_value(json!({
            ".id": "*A2",
            "user": "",
            "mac-address": " "
        }))
        .unwrap();
        let raw = RawSession::from(wire);
        assert!(raw.user.is_none());
        assert!(raw.mac.is_none());
        assert!(raw.uptime.is_none());
    }

    #[test]
    fn callback_converts_to_event() {
        let envelope: vouchly_api::StkCallbackEnvelope = serde_json::from_value(json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 0,
                "CallbackMetadata": { "Item": [
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                ]}
            }}
        }))
        .unwrap();
        let event = SettlementEvent::from(envelope.body.stk_callback.as_ref().unwrap());
        assert_eq!(event.checkout_id, "ws_CO_1");
        assert_eq!(event.result_code, 0);
        assert_eq!(event.receipt.as_deref(), Some("NLJ7RT61SV"));
    }
}
