// ── Session store ──
//
// Sessions are keyed by `(voucher_code, mac)`. Both the redemption path
// and the reconciler write here; each write is a per-key atomic upsert.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::collection::EntityCollection;
use crate::model::{MacAddress, Session, SessionId, VoucherCode, session_key};

/// One live-session observation from the router, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionObservation {
    pub voucher_code: VoucherCode,
    pub mac: MacAddress,
    pub ip: Option<IpAddr>,
    /// `now - uptime` at observation time. Only used for new rows.
    pub started_at: DateTime<Utc>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

pub struct SessionStore {
    sessions: EntityCollection<SessionId, Session>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        Self {
            sessions: EntityCollection::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Record the session created by a successful redemption. If the
    /// reconciler already saw this device, its row is kept and the IP
    /// refreshed.
    pub fn open(
        &self,
        code: &VoucherCode,
        mac: &MacAddress,
        ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Session {
        let (session, _) = self.sessions.upsert_with(
            session_key(code, mac),
            || {
                let id = self.allocate();
                let session = Session {
                    id,
                    voucher_code: code.clone(),
                    mac: mac.clone(),
                    ip,
                    started_at: now,
                    ended_at: None,
                    bytes_in: 0,
                    bytes_out: 0,
                };
                (id, session)
            },
            |current| Session {
                ip: ip.or(current.ip),
                ..current.clone()
            },
        );
        Arc::unwrap_or_clone(session)
    }

    /// Apply one reconciler observation. Existing rows get IP and counters
    /// overwritten and keep `started_at`; new rows take the observed
    /// start. Returns whether the row was new.
    pub fn observe(&self, obs: SessionObservation) -> bool {
        let key = session_key(&obs.voucher_code, &obs.mac);
        let (_, is_new) = self.sessions.upsert_with(
            key,
            || {
                let id = self.allocate();
                let session = Session {
                    id,
                    voucher_code: obs.voucher_code.clone(),
                    mac: obs.mac.clone(),
                    ip: obs.ip,
                    started_at: obs.started_at,
                    ended_at: None,
                    bytes_in: obs.bytes_in,
                    bytes_out: obs.bytes_out,
                };
                (id, session)
            },
            |current| Session {
                ip: obs.ip.or(current.ip),
                bytes_in: obs.bytes_in,
                bytes_out: obs.bytes_out,
                ..current.clone()
            },
        );
        is_new
    }

    pub fn get(&self, code: &VoucherCode, mac: &MacAddress) -> Option<Arc<Session>> {
        self.sessions.get_by_key(&session_key(code, mac))
    }

    pub fn for_voucher(&self, code: &VoucherCode) -> Vec<Arc<Session>> {
        self.list()
            .into_iter()
            .filter(|s| &s.voucher_code == code)
            .collect()
    }

    /// All sessions, by id.
    pub fn list(&self) -> Vec<Arc<Session>> {
        let mut all = self.sessions.values();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn keys(&self) -> Vec<String> {
        self.sessions.keys()
    }

    pub(crate) fn restore(&self, sessions: Vec<Session>) {
        self.sessions.clear();
        for session in sessions {
            self.next_id.fetch_max(session.id.0 + 1, Ordering::Relaxed);
            self.sessions.upsert(session.key(), session.id, session);
        }
    }
}
