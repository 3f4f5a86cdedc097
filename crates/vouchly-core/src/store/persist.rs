// ── JSON state file ──
//
// The four tables are written as one JSON document. Writes go to a
// temp file in the same directory and are renamed over the target, so
// a crash mid-save leaves the previous state intact.
//
// Separate processes share the file under an exclusive advisory lock
// on a sibling `<file>.lock`. A process must hold the lock from load to
// save, otherwise its save overwrites whatever other processes wrote
// in between.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::DataStore;
use crate::error::CoreError;
use crate::model::{PaymentRecord, Session, Tariff, Voucher};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    tariffs: Vec<Tariff>,
    #[serde(default)]
    payments: Vec<PaymentRecord>,
    #[serde(default)]
    vouchers: Vec<Voucher>,
    #[serde(default)]
    sessions: Vec<Session>,
}

fn persistence_error(path: &Path, message: impl ToString) -> CoreError {
    CoreError::Persistence {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// ── Cross-process lock ───────────────────────────────────────────────

/// Exclusive lock over one state file. Released on drop.
///
/// The lock lives on `<state file>.lock` rather than the state file
/// itself, because saves replace the state file's inode.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock on `state_path` is free, then take it.
    pub fn acquire(state_path: &Path) -> Result<Self, CoreError> {
        let lock = Self::open(state_path)?;
        lock.file
            .lock_exclusive()
            .map_err(|e| persistence_error(&lock.path, e))?;
        trace!(path = %lock.path.display(), "state lock acquired");
        Ok(lock)
    }

    /// Take the lock only if no other holder has it.
    pub fn try_acquire(state_path: &Path) -> Result<Option<Self>, CoreError> {
        let lock = Self::open(state_path)?;
        let taken = lock
            .file
            .try_lock_exclusive()
            .map_err(|e| persistence_error(&lock.path, e))?;
        Ok(taken.then_some(lock))
    }

    fn open(state_path: &Path) -> Result<Self, CoreError> {
        let mut name = state_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| persistence_error(&path, e))?;
        Ok(Self { file, path })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        trace!(path = %self.path.display(), "state lock released");
    }
}

fn ensure_parent(path: &Path) -> Result<&Path, CoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| persistence_error(path, e))?;
    Ok(dir)
}

fn read_state(path: &Path) -> Result<Option<StateFile>, CoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence_error(path, e)),
    };

    let state: StateFile = serde_json::from_str(&raw).map_err(|e| persistence_error(path, e))?;
    if state.version > STATE_VERSION {
        return Err(persistence_error(
            path,
            format!("state version {} is newer than supported {STATE_VERSION}", state.version),
        ));
    }
    Ok(Some(state))
}

impl DataStore {
    /// Load a store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let store = Self::new();
        store.reload(path)?;
        Ok(store)
    }

    /// Replace every table with the contents of `path`, in place, so
    /// services sharing this store see the file's current state. A
    /// missing file empties the store.
    pub fn reload(&self, path: &Path) -> Result<(), CoreError> {
        let Some(state) = read_state(path)? else {
            debug!(path = %path.display(), "no state file yet, starting empty");
            self.restore(StateFile::default());
            return Ok(());
        };

        debug!(
            path = %path.display(),
            tariffs = state.tariffs.len(),
            vouchers = state.vouchers.len(),
            payments = state.payments.len(),
            sessions = state.sessions.len(),
            "state loaded"
        );
        self.restore(state);
        Ok(())
    }

    fn restore(&self, state: StateFile) {
        self.tariffs.restore(state.tariffs);
        self.payments.restore(state.payments);
        self.vouchers.restore(state.vouchers);
        self.sessions.restore(state.sessions);
    }

    /// Atomically write the whole store to `path`.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let state = StateFile {
            version: STATE_VERSION,
            tariffs: self.tariffs.list().iter().map(|t| (**t).clone()).collect(),
            payments: self.payments.list().iter().map(|p| (**p).clone()).collect(),
            vouchers: self.vouchers.snapshot().iter().map(|v| (**v).clone()).collect(),
            sessions: self.sessions.list().iter().map(|s| (**s).clone()).collect(),
        };
        let json = serde_json::to_vec_pretty(&state).map_err(|e| persistence_error(path, e))?;

        let dir = ensure_parent(path)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| persistence_error(path, e))?;
        tmp.write_all(&json).map_err(|e| persistence_error(path, e))?;
        tmp.as_file().sync_all().map_err(|e| persistence_error(path, e))?;
        tmp.persist(path).map_err(|e| persistence_error(path, e.error))?;

        debug!(path = %path.display(), bytes = json.len(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::VoucherPolicy;
    use crate::model::{MacAddress, TariffDraft, VoucherCode, VoucherState};

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::load(&dir.path().join("state.json")).unwrap();
        assert!(store.vouchers().is_empty());
    }

    #[test]
    fn save_then_load_preserves_tables_and_id_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let now = Utc::now();

        let store = DataStore::new();
        let tariff = store.tariffs().add(TariffDraft {
            name: "1hr".into(),
            price: 20,
            duration_minutes: Some(60),
            data_limit_bytes: None,
            upload_kbps: 512,
            download_kbps: 1024,
        });
        let voucher = store
            .vouchers()
            .issue(&tariff, None, &VoucherPolicy::default(), now)
            .unwrap();
        store.vouchers().redeem_atomic(&voucher.code, now).unwrap();
        store
            .sessions()
            .open(&voucher.code, &MacAddress::new("aa:bb:cc:dd:ee:ff"), None, now);
        store.save(&path).unwrap();

        let loaded = DataStore::load(&path).unwrap();
        let reloaded = loaded.vouchers().get_by_code(&voucher.code).unwrap();
        assert_eq!(reloaded.state, VoucherState::Used);
        assert_eq!(loaded.sessions().list().len(), 1);
        assert_eq!(*loaded.tariffs().get(tariff.id).unwrap(), tariff);

        let next = loaded
            .vouchers()
            .issue(&tariff, None, &VoucherPolicy::default(), now)
            .unwrap();
        assert!(next.id > voucher.id);
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            DataStore::load(&path),
            Err(CoreError::Persistence { .. })
        ));
    }

    fn saved_voucher(path: &Path) -> VoucherCode {
        let store = DataStore::new();
        let tariff = store.tariffs().add(TariffDraft {
            name: "1hr".into(),
            price: 20,
            duration_minutes: Some(60),
            data_limit_bytes: None,
            upload_kbps: 512,
            download_kbps: 1024,
        });
        let voucher = store
            .vouchers()
            .issue(&tariff, None, &VoucherPolicy::default(), Utc::now())
            .unwrap();
        store.save(path).unwrap();
        voucher.code
    }

    #[test]
    fn state_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let held = StateLock::acquire(&path).unwrap();
        assert!(StateLock::try_acquire(&path).unwrap().is_none());
        drop(held);
        assert!(StateLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn locked_load_to_save_lets_only_one_writer_redeem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let code = saved_voucher(&path);

        // Two processes racing on the same code, each holding the lock
        // from load through save.
        let outcomes: Vec<bool> = std::thread::scope(|scope| {
            let racers: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        let _lock = StateLock::acquire(&path).unwrap();
                        let store = DataStore::load(&path).unwrap();
                        let won = store.vouchers().redeem_atomic(&code, Utc::now()).is_ok();
                        store.save(&path).unwrap();
                        won
                    })
                })
                .collect();
            racers.into_iter().map(|r| r.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);
        let stored = DataStore::load(&path).unwrap();
        assert_eq!(
            stored.vouchers().get_by_code(&code).unwrap().state,
            VoucherState::Used
        );
    }

    #[test]
    fn reload_picks_up_other_writers_before_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let code = saved_voucher(&path);

        // Long-lived holder loaded before another process redeemed.
        let watcher = DataStore::load(&path).unwrap();

        let other = DataStore::load(&path).unwrap();
        other.vouchers().redeem_atomic(&code, Utc::now()).unwrap();
        other.save(&path).unwrap();

        watcher.reload(&path).unwrap();
        watcher.save(&path).unwrap();

        let stored = DataStore::load(&path).unwrap();
        assert_eq!(
            stored.vouchers().get_by_code(&code).unwrap().state,
            VoucherState::Used
        );
        assert!(watcher.vouchers().redeem_atomic(&code, Utc::now()).is_err());
    }

    #[test]
    fn reload_of_missing_file_empties_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        saved_voucher(&path);

        let store = DataStore::load(&path).unwrap();
        assert_eq!(store.vouchers().len(), 1);
        fs::remove_file(&path).unwrap();
        store.reload(&path).unwrap();
        assert!(store.vouchers().is_empty());
        assert!(store.tariffs().list().is_empty());
    }
}
