// ── Session reconciliation ──
//
// Pulls the router's live-session list and upserts it into the local
// session table keyed by `(voucher_code, mac)`. Rows the router no
// longer lists are counted, never closed. With a state file, `run`
// takes the file lock and reloads before every pass, then saves.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CoreError, GatewayError};
use crate::gateway::{RawSession, RouterGateway};
use crate::model::{VoucherCode, session_key};
use crate::store::{DataStore, SessionObservation, StateLock};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries the router listed.
    pub seen: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Entries without a user, a MAC or a usable uptime.
    pub skipped: usize,
    /// Local sessions the router did not list this pass.
    pub unseen: usize,
}

pub struct SessionReconciler {
    store: Arc<DataStore>,
    gateway: Arc<dyn RouterGateway>,
    /// File shared with other processes, checkpointed by `run`.
    state_file: Option<PathBuf>,
}

impl SessionReconciler {
    pub fn new(store: Arc<DataStore>, gateway: Arc<dyn RouterGateway>) -> Self {
        Self {
            store,
            gateway,
            state_file: None,
        }
    }

    #[must_use]
    pub fn with_state_file(mut self, path: Option<PathBuf>) -> Self {
        self.state_file = path;
        self
    }

    /// One pass at the current time.
    pub async fn tick(&self) -> Result<ReconcileReport, GatewayError> {
        self.tick_at(Utc::now()).await
    }

    /// One pass, with `now` used to turn uptimes into start times.
    ///
    /// A gateway failure aborts before anything is written.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, GatewayError> {
        let live = self.gateway.list_active_sessions().await?;
        let sessions = self.store.sessions();

        let mut report = ReconcileReport {
            seen: live.len(),
            ..ReconcileReport::default()
        };
        let mut listed = HashSet::with_capacity(live.len());

        for raw in live {
            let Some(obs) = observation(&raw, now) else {
                debug!(router_id = %raw.router_id, "skipping incomplete session row");
                report.skipped += 1;
                continue;
            };
            listed.insert(session_key(&obs.voucher_code, &obs.mac));
            if sessions.observe(obs) {
                report.inserted += 1;
            } else {
                report.updated += 1;
            }
        }

        report.unseen = sessions
            .keys()
            .iter()
            .filter(|key| !listed.contains(*key))
            .count();

        info!(
            seen = report.seen,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            unseen = report.unseen,
            "sessions reconciled"
        );
        Ok(report)
    }

    /// Tick every `interval` until `cancel` fires. Failed ticks are
    /// logged and the loop carries on. `on_tick` sees each result.
    ///
    /// The caller must not hold the state file lock.
    pub async fn run(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        mut on_tick: impl FnMut(&Result<ReconcileReport, CoreError>) + Send,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let result = self.checkpointed_tick().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "session reconciliation failed");
                    }
                    on_tick(&result);
                }
            }
        }
    }

    /// One pass over the shared state file: lock, reload, tick, save.
    /// Without a state file this is a plain [`tick`](Self::tick).
    async fn checkpointed_tick(&self) -> Result<ReconcileReport, CoreError> {
        let Some(path) = self.state_file.clone() else {
            return Ok(self.tick().await?);
        };

        let lock_path = path.clone();
        let _lock = tokio::task::spawn_blocking(move || StateLock::acquire(&lock_path))
            .await
            .map_err(|e| CoreError::Persistence {
                path: path.clone(),
                message: e.to_string(),
            })??;
        self.store.reload(&path)?;
        let report = self.tick().await?;
        self.store.save(&path)?;
        Ok(report)
    }
}

/// `None` for rows the local table cannot key or date.
fn observation(raw: &RawSession, now: DateTime<Utc>) -> Option<SessionObservation> {
    let user = raw.user.as_deref()?;
    let mac = raw.mac.clone()?;
    let started_at = match raw.uptime {
        Some(uptime) => now.checked_sub_signed(TimeDelta::from_std(uptime).ok()?)?,
        None => now,
    };
    Some(SessionObservation {
        voucher_code: VoucherCode::normalize(user),
        mac,
        ip: raw.address,
        started_at,
        bytes_in: raw.bytes_in,
        bytes_out: raw.bytes_out,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::VoucherPolicy;
    use crate::model::{MacAddress, TariffDraft, VoucherState};
    use crate::testing::FakeRouter;

    fn raw(user: Option<&str>, mac: Option<&str>, uptime_secs: u64, bytes: u64) -> RawSession {
        RawSession {
            router_id: "*A1".into(),
            user: user.map(str::to_owned),
            mac: mac.map(MacAddress::new),
            address: "10.5.50.9".parse().ok(),
            uptime: Some(Duration::from_secs(uptime_secs)),
            bytes_in: bytes,
            bytes_out: bytes / 2,
        }
    }

    fn setup() -> (Arc<DataStore>, Arc<FakeRouter>, SessionReconciler) {
        let store = Arc::new(DataStore::new());
        let router = Arc::new(FakeRouter::default());
        let reconciler = SessionReconciler::new(Arc::clone(&store), router.clone());
        (store, router, reconciler)
    }

    #[tokio::test]
    async fn started_at_is_stable_and_counters_overwrite() {
        let (store, router, reconciler) = setup();
        let t0 = Utc::now();
        router.set_active(vec![raw(Some("ABCD2345EFGH"), Some("AA:BB:CC:DD:EE:FF"), 600, 1000)]);

        let first = reconciler.tick_at(t0).await.unwrap();
        assert_eq!(first.inserted, 1);
        let started = store.sessions().list()[0].started_at;
        assert_eq!(started, t0 - TimeDelta::seconds(600));

        router.set_active(vec![raw(Some("ABCD2345EFGH"), Some("AA:BB:CC:DD:EE:FF"), 660, 5000)]);
        let second = reconciler.tick_at(t0 + TimeDelta::seconds(61)).await.unwrap();
        assert_eq!(second.updated, 1);

        let session = &store.sessions().list()[0];
        assert_eq!(session.started_at, started);
        assert_eq!((session.bytes_in, session.bytes_out), (5000, 2500));
    }

    #[tokio::test]
    async fn incomplete_rows_are_skipped() {
        let (store, router, reconciler) = setup();
        router.set_active(vec![
            raw(None, Some("aa:bb:cc:dd:ee:ff"), 1, 1),
            raw(Some("ABCD2345EFGH"), None, 1, 1),
            raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:ff"), 1, 1),
        ]);
        let report = reconciler.tick_at(Utc::now()).await.unwrap();
        assert_eq!(report.seen, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.sessions().list().len(), 1);
    }

    #[tokio::test]
    async fn vanished_sessions_are_counted_not_closed() {
        let (store, router, reconciler) = setup();
        router.set_active(vec![raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:ff"), 1, 1)]);
        reconciler.tick_at(Utc::now()).await.unwrap();

        router.set_active(Vec::new());
        let report = reconciler.tick_at(Utc::now()).await.unwrap();
        assert_eq!(report.unseen, 1);
        assert!(store.sessions().list()[0].ended_at.is_none());
    }

    #[tokio::test]
    async fn gateway_failure_aborts_without_writes() {
        let (store, router, reconciler) = setup();
        router.set_active(vec![raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:ff"), 1, 1)]);
        router.fail_next_transient("list_active_sessions");

        assert!(reconciler.tick_at(Utc::now()).await.unwrap_err().is_transient());
        assert!(store.sessions().list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_cancelled() {
        let (_store, router, reconciler) = setup();
        let cancel = CancellationToken::new();
        let mut ticks = 0;

        let stopper = cancel.clone();
        let driver = reconciler.run(Duration::from_secs(30), cancel, |result| {
            assert!(result.is_ok());
            ticks += 1;
            if ticks == 3 {
                stopper.cancel();
            }
        });
        driver.await;

        assert_eq!(ticks, 3);
        assert_eq!(router.list_calls(), 3);
    }

    #[tokio::test]
    async fn absurd_uptime_is_skipped() {
        let (store, router, reconciler) = setup();
        router.set_active(vec![
            raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:ff"), 10_000_000_000_000, 1),
            raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:01"), u64::MAX, 1),
            raw(Some("ABCD2345EFGH"), Some("aa:bb:cc:dd:ee:02"), 60, 1),
        ]);

        let report = reconciler.tick_at(Utc::now()).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.sessions().list().len(), 1);
    }

    #[tokio::test]
    async fn checkpointed_pass_keeps_other_writers_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let seed = DataStore::new();
        let tariff = seed.tariffs().add(TariffDraft {
            name: "1hr".into(),
            price: 20,
            duration_minutes: Some(60),
            data_limit_bytes: None,
            upload_kbps: 512,
            download_kbps: 1024,
        });
        let voucher = seed
            .vouchers()
            .issue(&tariff, None, &VoucherPolicy::default(), Utc::now())
            .unwrap();
        seed.save(&path).unwrap();

        // The watcher loads first, then another process redeems.
        let store = Arc::new(DataStore::load(&path).unwrap());
        let router = Arc::new(FakeRouter::default());
        let reconciler = SessionReconciler::new(Arc::clone(&store), router.clone())
            .with_state_file(Some(path.clone()));

        let other = DataStore::load(&path).unwrap();
        other.vouchers().redeem_atomic(&voucher.code, Utc::now()).unwrap();
        other.save(&path).unwrap();

        router.set_active(vec![raw(Some(voucher.code.as_str()), Some("aa:bb:cc:dd:ee:ff"), 60, 1)]);
        let report = reconciler.checkpointed_tick().await.unwrap();
        assert_eq!(report.inserted, 1);

        let stored = DataStore::load(&path).unwrap();
        let redeemed = stored.vouchers().get_by_code(&voucher.code).unwrap();
        assert_eq!(redeemed.state, VoucherState::Used);
        assert_eq!(stored.sessions().list().len(), 1);
        assert!(StateLock::try_acquire(&path).unwrap().is_some());
    }
}
