// RouterOS REST wire types
//
// RouterOS renders every attribute as a string (`"bytes-in": "1024"`),
// uses kebab-case names and addresses items by a `.id` such as `*1A`.
// Readers accept numbers too, since some firmware builds emit them.

use serde::{Deserialize, Deserializer, Serialize};

/// Accept `"123"`, `123`, `true` or a missing field as `Option<String>`.
fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// `/ip/hotspot/user` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HotspotUser {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub disabled: Option<String>,
    #[serde(default, rename = "limit-uptime", deserialize_with = "flexible_string")]
    pub limit_uptime: Option<String>,
    #[serde(
        default,
        rename = "limit-bytes-total",
        deserialize_with = "flexible_string"
    )]
    pub limit_bytes_total: Option<String>,
}

impl HotspotUser {
    pub fn is_disabled(&self) -> bool {
        self.disabled.as_deref() == Some("true")
    }
}

/// Body for `PUT /rest/ip/hotspot/user`.
#[derive(Debug, Clone, Serialize)]
pub struct NewHotspotUser {
    pub name: String,
    pub password: String,
    pub profile: String,
    #[serde(rename = "limit-uptime", skip_serializing_if = "Option::is_none")]
    pub limit_uptime: Option<String>,
    #[serde(rename = "limit-bytes-total", skip_serializing_if = "Option::is_none")]
    pub limit_bytes_total: Option<String>,
}

/// `/ip/hotspot/user/profile` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HotspotProfile {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "rate-limit", deserialize_with = "flexible_string")]
    pub rate_limit: Option<String>,
    #[serde(
        default,
        rename = "session-timeout",
        deserialize_with = "flexible_string"
    )]
    pub session_timeout: Option<String>,
}

/// Body for creating (`PUT`) or updating (`PATCH`) a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSpec {
    pub name: String,
    #[serde(rename = "rate-limit")]
    pub rate_limit: String,
    #[serde(rename = "session-timeout", skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<String>,
}

/// `/ip/hotspot/active` entry: one logged-in client.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveSession {
    #[serde(rename = ".id")]
    pub id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub user: Option<String>,
    #[serde(default, rename = "mac-address", deserialize_with = "flexible_string")]
    pub mac_address: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub uptime: Option<String>,
    #[serde(default, rename = "bytes-in", deserialize_with = "flexible_string")]
    pub bytes_in: Option<String>,
    #[serde(default, rename = "bytes-out", deserialize_with = "flexible_string")]
    pub bytes_out: Option<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub server: Option<String>,
}

/// Body for `POST /rest/ip/hotspot/active/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub user: String,
    pub password: String,
    #[serde(rename = "mac-address", skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn active_session_accepts_string_counters() {
        let raw = json!({
            ".id": "*5",
            "user": "ABCD2345EFGH",
            "mac-address": "AA:BB:CC:DD:EE:FF",
            "address": "10.5.50.12",
            "uptime": "1h2m3s",
            "bytes-in": "1048576",
            "bytes-out": 2048
        });
        let session: ActiveSession = serde_json::from_value(raw).unwrap();
        assert_eq!(session.bytes_in.as_deref(), Some("1048576"));
        assert_eq!(session.bytes_out.as_deref(), Some("2048"));
        assert_eq!(session.server, None);
    }

    #[test]
    fn new_user_omits_absent_limits() {
        let user = NewHotspotUser {
            name: "ABCD2345EFGH".into(),
            password: "ABCD2345EFGH".into(),
            profile: "profile-7".into(),
            limit_uptime: None,
            limit_bytes_total: Some("500M".into()),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "ABCD2345EFGH",
                "password": "ABCD2345EFGH",
                "profile": "profile-7",
                "limit-bytes-total": "500M"
            })
        );
    }

    #[test]
    fn disabled_flag_reads_routeros_boolean() {
        let user: HotspotUser = serde_json::from_value(json!({
            ".id": "*1",
            "name": "X",
            "disabled": "true"
        }))
        .unwrap();
        assert!(user.is_disabled());
    }
}
