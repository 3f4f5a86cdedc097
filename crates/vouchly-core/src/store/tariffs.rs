// ── Tariff store ──

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::collection::EntityCollection;
use crate::model::{Tariff, TariffDraft, TariffId};

pub struct TariffStore {
    tariffs: EntityCollection<TariffId, Tariff>,
    next_id: AtomicU64,
}

impl TariffStore {
    pub(crate) fn new() -> Self {
        Self {
            tariffs: EntityCollection::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, draft: TariffDraft) -> Tariff {
        let id = TariffId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tariff = draft.into_tariff(id);
        self.tariffs.upsert(key(id), id, tariff.clone());
        tariff
    }

    /// Replace a tariff's fields, keeping its id (and so its profile name).
    pub fn update(&self, id: TariffId, draft: TariffDraft) -> Option<Tariff> {
        self.tariffs
            .update_if::<()>(&key(id), |_| Ok(draft.into_tariff(id)))?
            .ok()
            .map(Arc::unwrap_or_clone)
    }

    pub fn get(&self, id: TariffId) -> Option<Arc<Tariff>> {
        self.tariffs.get_by_key(&key(id))
    }

    /// All tariffs, by id.
    pub fn list(&self) -> Vec<Arc<Tariff>> {
        let mut all = self.tariffs.values();
        all.sort_by_key(|t| t.id);
        all
    }

    pub(crate) fn restore(&self, tariffs: Vec<Tariff>) {
        self.tariffs.clear();
        for tariff in tariffs {
            self.next_id.fetch_max(tariff.id.0 + 1, Ordering::Relaxed);
            self.tariffs.upsert(key(tariff.id), tariff.id, tariff);
        }
    }
}

fn key(id: TariffId) -> String {
    format!("tariff:{id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft(name: &str) -> TariffDraft {
        TariffDraft {
            name: name.into(),
            price: 10,
            duration_minutes: Some(30),
            data_limit_bytes: None,
            upload_kbps: 256,
            download_kbps: 512,
        }
    }

    #[test]
    fn ids_are_sequential_and_survive_restore() {
        let store = TariffStore::new();
        let a = store.add(draft("a"));
        let b = store.add(draft("b"));
        assert_eq!((a.id, b.id), (TariffId(1), TariffId(2)));

        let restored = TariffStore::new();
        restored.restore(vec![b]);
        assert_eq!(restored.add(draft("c")).id, TariffId(3));
    }

    #[test]
    fn update_keeps_id() {
        let store = TariffStore::new();
        let t = store.add(draft("a"));
        let updated = store
            .update(
                t.id,
                TariffDraft {
                    upload_kbps: 1024,
                    ..draft("a")
                },
            )
            .unwrap();
        assert_eq!(updated.id, t.id);
        assert_eq!(updated.rate_limit(), "1024k/512k");
        assert!(store.update(TariffId(99), draft("x")).is_none());
    }
}
