// ── Tariff domain type ──

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entity_id::TariffId;

const MIB: u64 = 1_048_576;

/// A priced access plan: speed caps plus optional time and data limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    /// Price in whole currency units (KES).
    pub price: u64,
    pub duration_minutes: Option<u32>,
    pub data_limit_bytes: Option<u64>,
    pub upload_kbps: u32,
    pub download_kbps: u32,
}

impl Tariff {
    /// Router-side user profile name. Stable for the life of the tariff.
    pub fn profile_name(&self) -> String {
        profile_name(self.id)
    }

    /// RouterOS `rate-limit` value, `<up>k/<down>k` (rx/tx from the router's view).
    pub fn rate_limit(&self) -> String {
        format!("{}k/{}k", self.upload_kbps, self.download_kbps)
    }

    /// `<minutes>m` when the tariff is time-limited.
    pub fn session_timeout(&self) -> Option<String> {
        self.duration_minutes.map(|m| format!("{m}m"))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_minutes
            .map(|m| Duration::from_secs(u64::from(m) * 60))
    }

    /// RouterOS `limit-bytes-total` value in whole MiB, rounded to nearest.
    /// Never `0M`, which RouterOS reads as unlimited.
    pub fn data_limit(&self) -> Option<String> {
        self.data_limit_bytes
            .map(|bytes| format!("{}M", (bytes.saturating_add(MIB / 2) / MIB).max(1)))
    }
}

pub fn profile_name(id: TariffId) -> String {
    format!("profile-{id}")
}

/// Fields supplied when an operator creates or edits a tariff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffDraft {
    pub name: String,
    pub price: u64,
    pub duration_minutes: Option<u32>,
    pub data_limit_bytes: Option<u64>,
    pub upload_kbps: u32,
    pub download_kbps: u32,
}

impl TariffDraft {
    /// Reject drafts the router could not turn into a usable profile.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tariff name is required".into());
        }
        if self.name.chars().count() > 255 {
            return Err("tariff name must be at most 255 characters".into());
        }
        if self.upload_kbps == 0 || self.download_kbps == 0 {
            return Err("upload and download rates must be at least 1 kbps".into());
        }
        if self.duration_minutes == Some(0) {
            return Err("duration must be at least one minute".into());
        }
        if self.data_limit_bytes == Some(0) {
            return Err("data limit must be at least one byte".into());
        }
        Ok(())
    }

    pub(crate) fn into_tariff(self, id: TariffId) -> Tariff {
        Tariff {
            id,
            name: self.name,
            price: self.price,
            duration_minutes: self.duration_minutes,
            data_limit_bytes: self.data_limit_bytes,
            upload_kbps: self.upload_kbps,
            download_kbps: self.download_kbps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily() -> Tariff {
        Tariff {
            id: TariffId(3),
            name: "Daily".into(),
            price: 50,
            duration_minutes: Some(1440),
            data_limit_bytes: None,
            upload_kbps: 512,
            download_kbps: 1024,
        }
    }

    #[test]
    fn router_strings_for_daily_plan() {
        let t = daily();
        assert_eq!(t.profile_name(), "profile-3");
        assert_eq!(t.rate_limit(), "512k/1024k");
        assert_eq!(t.session_timeout().as_deref(), Some("1440m"));
    }

    #[test]
    fn unlimited_time_has_no_session_timeout() {
        let t = Tariff {
            duration_minutes: None,
            ..daily()
        };
        assert!(t.session_timeout().is_none());
        assert!(t.duration().is_none());
    }

    #[test]
    fn data_limit_rounds_to_mebibytes() {
        let t = Tariff {
            data_limit_bytes: Some(1_500_000_000),
            ..daily()
        };
        assert_eq!(t.data_limit().as_deref(), Some("1431M"));

        let small = Tariff {
            data_limit_bytes: Some(MIB + MIB / 2),
            ..daily()
        };
        assert_eq!(small.data_limit().as_deref(), Some("2M"));
    }

    #[test]
    fn data_limit_stays_capped_at_the_extremes() {
        let tiny = Tariff {
            data_limit_bytes: Some(1),
            ..daily()
        };
        assert_eq!(tiny.data_limit().as_deref(), Some("1M"));

        let huge = Tariff {
            data_limit_bytes: Some(u64::MAX),
            ..daily()
        };
        assert_eq!(
            huge.data_limit(),
            Some(format!("{}M", u64::MAX / MIB))
        );
    }

    #[test]
    fn draft_validation() {
        let draft = TariffDraft {
            name: "Hourly".into(),
            price: 10,
            duration_minutes: Some(60),
            data_limit_bytes: None,
            upload_kbps: 256,
            download_kbps: 512,
        };
        assert!(draft.validate().is_ok());

        let nameless = TariffDraft {
            name: "  ".into(),
            ..draft.clone()
        };
        assert!(nameless.validate().is_err());

        let zero_rate = TariffDraft {
            upload_kbps: 0,
            ..draft.clone()
        };
        assert!(zero_rate.validate().is_err());

        let zero_duration = TariffDraft {
            duration_minutes: Some(0),
            ..draft
        };
        assert!(zero_duration.validate().is_err());
    }
}
