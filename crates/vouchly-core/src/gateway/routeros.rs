// ── RouterOS-backed RouterGateway ──

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use vouchly_api::routeros::{LoginRequest, ProfileSpec, parse_duration};
use vouchly_api::transport::{TlsMode, TransportConfig};
use vouchly_api::{Error as ApiError, RouterOsClient};

use super::{HotspotUserSpec, ProfileChange, ProfileRequest, RawSession, RouterGateway, UserRecord};
use crate::config::{RouterConfig, TlsVerification};
use crate::error::{GatewayError, classify};
use crate::model::MacAddress;

/// [`RouterGateway`] over the RouterOS v7 REST API.
pub struct RouterOsGateway {
    client: RouterOsClient,
}

impl RouterOsGateway {
    pub fn new(config: &RouterConfig) -> Result<Self, ApiError> {
        let client = RouterOsClient::new(
            config.url.clone(),
            config.username.clone(),
            config.password.clone(),
            &build_transport(&config.tls, config.timeout),
        )?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: RouterOsClient) -> Self {
        Self { client }
    }
}

pub(crate) fn build_transport(tls: &TlsVerification, timeout: Duration) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(tls),
        timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

/// Does the router's copy of a profile already match the request?
fn profile_matches(
    existing_rate: Option<&str>,
    existing_timeout: Option<&str>,
    wanted: &ProfileRequest,
) -> bool {
    let rate_ok = existing_rate.map(str::trim) == Some(wanted.rate_limit().as_str());
    // RouterOS re-renders durations (`1440m` comes back as `1d`), so
    // compare parsed values. An unset timeout reads back as `0s` or absent.
    let have = existing_timeout
        .and_then(parse_duration)
        .filter(|d| !d.is_zero());
    let want = wanted
        .session_timeout_minutes
        .map(|m| Duration::from_secs(u64::from(m) * 60));
    rate_ok && have == want
}

#[async_trait]
impl RouterGateway for RouterOsGateway {
    async fn authorize_client(
        &self,
        identity: &str,
        secret: &SecretString,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
    ) -> Result<(), GatewayError> {
        let request = LoginRequest {
            user: identity.to_owned(),
            password: secret.expose_secret().to_owned(),
            mac_address: (!device_mac.is_empty()).then(|| device_mac.to_string()),
            ip: client_ip.map(|ip| ip.to_string()),
        };
        self.client
            .login(&request)
            .await
            .map_err(classify("authorize_client"))
    }

    async fn deauthorize_client(&self, identity: &str) -> Result<(), GatewayError> {
        let sessions = self
            .client
            .find_active(identity)
            .await
            .map_err(classify("deauthorize_client"))?;
        for session in sessions {
            match self.client.remove_active(&session.id).await {
                Ok(()) => debug!(router_id = %session.id, "active session removed"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(GatewayError::from_api("deauthorize_client", &e)),
            }
        }
        Ok(())
    }

    async fn ensure_profile(&self, profile: &ProfileRequest) -> Result<ProfileChange, GatewayError> {
        let existing = self
            .client
            .find_profiles(&profile.name)
            .await
            .map_err(classify("ensure_profile"))?;

        let mut spec = ProfileSpec {
            name: profile.name.clone(),
            rate_limit: profile.rate_limit(),
            session_timeout: profile.session_timeout(),
        };

        let Some(current) = existing.into_iter().next() else {
            self.client
                .add_profile(&spec)
                .await
                .map_err(classify("ensure_profile"))?;
            info!(profile = %profile.name, "hotspot profile created");
            return Ok(ProfileChange::Created);
        };

        if profile_matches(
            current.rate_limit.as_deref(),
            current.session_timeout.as_deref(),
            profile,
        ) {
            return Ok(ProfileChange::Unchanged);
        }

        // Clearing a timeout needs an explicit zero; omitting it keeps the old one.
        if spec.session_timeout.is_none() {
            spec.session_timeout = Some("0s".into());
        }
        self.client
            .update_profile(&current.id, &spec)
            .await
            .map_err(classify("ensure_profile"))?;
        info!(profile = %profile.name, "hotspot profile updated");
        Ok(ProfileChange::Updated)
    }

    async fn list_active_sessions(&self) -> Result<Vec<RawSession>, GatewayError> {
        let sessions = self
            .client
            .list_active()
            .await
            .map_err(classify("list_active_sessions"))?;
        Ok(sessions.into_iter().map(RawSession::from).collect())
    }

    async fn find_user(&self, identity: &str) -> Result<Option<UserRecord>, GatewayError> {
        let users = self
            .client
            .find_users(identity)
            .await
            .map_err(classify("find_user"))?;
        Ok(users.into_iter().next().map(UserRecord::from))
    }

    async fn add_user(&self, user: &HotspotUserSpec) -> Result<(), GatewayError> {
        self.client
            .add_user(&user.into())
            .await
            .map_err(classify("add_user"))?;
        Ok(())
    }

    async fn remove_user(&self, identity: &str) -> Result<(), GatewayError> {
        let users = self
            .client
            .find_users(identity)
            .await
            .map_err(classify("remove_user"))?;
        for user in users {
            match self.client.remove_user_by_id(&user.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(GatewayError::from_api("remove_user", &e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily() -> ProfileRequest {
        ProfileRequest {
            name: "profile-3".into(),
            upload_kbps: 512,
            download_kbps: 1024,
            session_timeout_minutes: Some(1440),
        }
    }

    #[test]
    fn rerendered_timeout_still_matches() {
        assert!(profile_matches(Some("512k/1024k"), Some("1d"), &daily()));
        assert!(profile_matches(Some("512k/1024k"), Some("1440m"), &daily()));
    }

    #[test]
    fn drift_is_detected() {
        assert!(!profile_matches(Some("256k/1024k"), Some("1d"), &daily()));
        assert!(!profile_matches(Some("512k/1024k"), Some("2h"), &daily()));
        assert!(!profile_matches(None, Some("1d"), &daily()));
    }

    #[test]
    fn zero_timeout_means_unset() {
        let unlimited = ProfileRequest {
            session_timeout_minutes: None,
            ..daily()
        };
        assert!(profile_matches(Some("512k/1024k"), Some("0s"), &unlimited));
        assert!(profile_matches(Some("512k/1024k"), None, &unlimited));
    }
}
