// ── Tariff -> router profile provisioning ──

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::gateway::{HotspotUserSpec, ProfileChange, ProfileRequest, RouterGateway};
use crate::model::{Tariff, Voucher};

/// Keeps one router-side user profile per tariff.
pub struct ProfileProvisioner {
    gateway: Arc<dyn RouterGateway>,
}

impl ProfileProvisioner {
    pub fn new(gateway: Arc<dyn RouterGateway>) -> Self {
        Self { gateway }
    }

    /// Make the router's profile for `tariff` exist and match it. Safe to
    /// call any number of times; call after every tariff create or edit.
    pub async fn ensure(&self, tariff: &Tariff) -> Result<ProfileChange, ProvisionError> {
        let request = profile_for(tariff);
        match self.gateway.ensure_profile(&request).await {
            Ok(change) => {
                debug!(profile = %request.name, %change, "profile ensured");
                Ok(change)
            }
            Err(e) => {
                warn!(profile = %request.name, error = %e, "profile provisioning failed");
                Err(e.into())
            }
        }
    }
}

/// Desired router profile for a tariff.
pub fn profile_for(tariff: &Tariff) -> ProfileRequest {
    ProfileRequest {
        name: tariff.profile_name(),
        upload_kbps: tariff.upload_kbps,
        download_kbps: tariff.download_kbps,
        session_timeout_minutes: tariff.duration_minutes,
    }
}

/// Hotspot user for a voucher: the code is both name and password, with
/// the tariff's time and data caps as per-user limits.
pub fn user_for(voucher: &Voucher, tariff: &Tariff) -> HotspotUserSpec {
    HotspotUserSpec {
        name: voucher.code.as_str().to_owned(),
        password: SecretString::from(voucher.code.as_str().to_owned()),
        profile: tariff.profile_name(),
        limit_uptime: tariff.session_timeout(),
        limit_bytes_total: tariff.data_limit(),
    }
}
