// ── Generic concurrent entity collection ──
//
// Sharded concurrent storage with O(1) lookups by natural key and by
// row id. Conditional updates run under the entry's shard lock, which
// is what makes voucher and payment transitions compare-and-swap.
// Lists are read straight from the shards, never from a cached copy
// that a slower writer could publish over a newer one.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A concurrent collection for a single entity type.
///
/// Uses `DashMap` for per-shard locking plus a row-id index.
pub(crate) struct EntityCollection<I, T>
where
    I: Copy + Eq + Hash + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Primary storage: natural key -> entity.
    /// Voucher codes, payment checkout ids, `code|mac` for sessions.
    by_key: DashMap<String, Arc<T>>,

    /// Secondary index: row id -> key.
    id_to_key: DashMap<I, String>,
}

impl<I, T> EntityCollection<I, T>
where
    I: Copy + Eq + Hash + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            id_to_key: DashMap::new(),
        }
    }

    /// Insert only if `key` is vacant. Returns `false` (and drops the
    /// entity) if the key is taken. The vacancy check and the insert are
    /// one atomic step.
    pub(crate) fn insert_new(&self, key: String, id: I, entity: T) -> bool {
        let inserted = match self.by_key.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(entity));
                true
            }
        };
        if inserted {
            self.id_to_key.insert(id, key);
        }
        inserted
    }

    /// Insert or replace unconditionally. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, id: I, entity: T) -> bool {
        let is_new = self.by_key.insert(key.clone(), Arc::new(entity)).is_none();
        self.id_to_key.insert(id, key);
        is_new
    }

    /// Atomic insert-or-update under the shard lock. `on_vacant` builds
    /// the row (and its id) for a new key; `on_occupied` derives the
    /// replacement from the current value. Returns `(entity, was_new)`.
    pub(crate) fn upsert_with(
        &self,
        key: String,
        on_vacant: impl FnOnce() -> (I, T),
        on_occupied: impl FnOnce(&T) -> T,
    ) -> (Arc<T>, bool) {
        let (stored, new_id) = match self.by_key.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let next = Arc::new(on_occupied(slot.get().as_ref()));
                slot.insert(Arc::clone(&next));
                (next, None)
            }
            Entry::Vacant(slot) => {
                let (id, entity) = on_vacant();
                let next = Arc::new(entity);
                slot.insert(Arc::clone(&next));
                (next, Some(id))
            }
        };
        let was_new = new_id.is_some();
        if let Some(id) = new_id {
            self.id_to_key.insert(id, key);
        }
        (stored, was_new)
    }

    /// Compare-and-swap on one entry. `f` inspects the current value under
    /// the shard lock and either returns a replacement or refuses with an
    /// error, in which case nothing changes. `None` if the key is absent.
    pub(crate) fn update_if<E>(
        &self,
        key: &str,
        f: impl FnOnce(&T) -> Result<T, E>,
    ) -> Option<Result<Arc<T>, E>> {
        let mut slot = self.by_key.get_mut(key)?;
        let outcome = f(slot.value().as_ref()).map(|next| {
            let next = Arc::new(next);
            *slot.value_mut() = Arc::clone(&next);
            next
        });
        Some(outcome)
    }

    /// Look up an entity by its natural key.
    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Look up an entity by row id (secondary index).
    pub(crate) fn get_by_id(&self, id: &I) -> Option<Arc<T>> {
        let key = self.id_to_key.get(id)?.value().clone();
        self.get_by_key(&key)
    }

    /// Natural key for a row id.
    pub(crate) fn key_for(&self, id: &I) -> Option<String> {
        self.id_to_key.get(id).map(|r| r.value().clone())
    }

    /// Every current value, read shard by shard. Each row is the latest
    /// committed version at the moment its shard is visited.
    pub(crate) fn values(&self) -> Vec<Arc<T>> {
        self.by_key.iter().map(|r| Arc::clone(r.value())).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Drop every row. Used before reloading from disk.
    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.id_to_key.clear();
    }

    /// Return all current natural keys in the collection.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }
}
