//! Load/save of the history ring and rollover cursor.
//!
//! Both live in one namespace as two postcard blobs and are always written
//! together in a single commit. Persistence is best effort: when the store
//! cannot be opened or written, the adapter drops to memory-only mode and
//! the monitor carries on with its in-memory state.

use alloc::string::{String, ToString};
use core::fmt::Write;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use super::blob::BlobStore;
use super::{HISTORY_DAYS, HistoryEntry, PersistedState};
use crate::clock::DayKey;

pub const HISTORY_KEY: &str = "history";
pub const CURSOR_KEY: &str = "cursor";

/// Bumped whenever the blob layout changes; older blobs read as cold start.
pub const SCHEMA_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct HistoryBlob {
    version: u8,
    entries: [HistoryEntry; HISTORY_DAYS],
}

#[derive(Serialize, Deserialize)]
struct CursorBlob {
    version: u8,
    day: Option<DayKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Writes reach the blob store
    Backed,
    /// The store failed; state lives in RAM until reboot
    MemoryOnly,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("persistence disabled, running from memory")]
    MemoryOnly,
    #[error("store error: {0}")]
    Store(heapless::String<64>),
    #[error("failed to encode persisted state")]
    Encode,
}

impl PersistError {
    fn store<E: core::fmt::Debug>(error: E) -> Self {
        let mut message = heapless::String::<64>::new();
        let _ = write!(message, "{:?}", error);
        Self::Store(message)
    }
}

/// Persistence adapter over a [`BlobStore`].
pub struct HistoryStore<S> {
    store: S,
    namespace: String,
    mode: PersistMode,
}

impl<S: BlobStore> HistoryStore<S> {
    pub fn new(store: S, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            mode: PersistMode::Backed,
        }
    }

    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Read the persisted state.
    ///
    /// Missing or unreadable blobs are not errors: they yield an all-invalid
    /// history and no cursor, exactly like a first boot.
    pub fn load(&mut self) -> PersistedState {
        let mut handle = match self.store.open(&self.namespace) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "Failed to open blob namespace '{}': {:?}; running in memory-only mode",
                    self.namespace, e
                );
                self.mode = PersistMode::MemoryOnly;
                return PersistedState::default();
            }
        };

        let history = match self.store.get_blob(&mut handle, HISTORY_KEY) {
            Ok(Some(bytes)) => match postcard::from_bytes::<HistoryBlob>(&bytes) {
                Ok(blob) if blob.version == SCHEMA_VERSION => Some(blob.entries),
                Ok(blob) => {
                    warn!("Ignoring history blob with schema version {}", blob.version);
                    None
                }
                Err(e) => {
                    warn!("Ignoring undecodable history blob: {:?}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read history blob: {:?}", e);
                None
            }
        };

        let cursor = match self.store.get_blob(&mut handle, CURSOR_KEY) {
            Ok(Some(bytes)) => match postcard::from_bytes::<CursorBlob>(&bytes) {
                Ok(blob) if blob.version == SCHEMA_VERSION => blob.day,
                Ok(_) | Err(_) => {
                    warn!("Ignoring unreadable rollover cursor");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read rollover cursor: {:?}", e);
                None
            }
        };

        self.store.close(handle);

        match history {
            Some(history) => {
                let valid = history.iter().filter(|entry| entry.valid).count();
                info!("Loaded history: {} valid day(s), cursor {:?}", valid, cursor);
                PersistedState { history, cursor }
            }
            None => {
                info!("No stored history, starting cold");
                PersistedState {
                    cursor,
                    ..PersistedState::default()
                }
            }
        }
    }

    /// Write history and cursor in one commit.
    ///
    /// Any store failure switches the adapter to memory-only mode.
    pub fn save(&mut self, state: &PersistedState) -> Result<(), PersistError> {
        if self.mode == PersistMode::MemoryOnly {
            debug!("Skipping save, persistence is memory-only");
            return Err(PersistError::MemoryOnly);
        }

        let history = postcard::to_allocvec(&HistoryBlob {
            version: SCHEMA_VERSION,
            entries: state.history,
        })
        .map_err(|_| PersistError::Encode)?;
        let cursor = postcard::to_allocvec(&CursorBlob {
            version: SCHEMA_VERSION,
            day: state.cursor,
        })
        .map_err(|_| PersistError::Encode)?;

        let mut handle = self.store.open(&self.namespace).map_err(|e| {
            self.mode = PersistMode::MemoryOnly;
            PersistError::store(e)
        })?;

        let written = self
            .store
            .set_blob(&mut handle, HISTORY_KEY, &history)
            .and_then(|_| self.store.set_blob(&mut handle, CURSOR_KEY, &cursor))
            .and_then(|_| self.store.commit(&mut handle));
        self.store.close(handle);

        written.map_err(|e| {
            self.mode = PersistMode::MemoryOnly;
            PersistError::store(e)
        })?;

        debug!("Persisted history and cursor {:?}", state.cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::MemoryBlobStore;

    fn sample_state() -> PersistedState {
        let mut state = PersistedState::default();
        state.history[0] = HistoryEntry {
            weekday: 3,
            max_temp: 30.0,
            min_temp: 18.5,
            max_hum: 70.0,
            min_hum: 41.0,
            timestamp: 1_706_659_200,
            valid: true,
        };
        state.cursor = Some(738_917);
        state
    }

    #[test]
    fn test_cold_start_is_all_invalid() {
        let mut store = HistoryStore::new(MemoryBlobStore::new(), "dht_hist");
        let state = store.load();

        assert!(state.history.iter().all(|entry| !entry.valid));
        assert_eq!(state.cursor, None);
        assert_eq!(store.mode(), PersistMode::Backed);
    }

    #[test]
    fn test_saved_state_is_loaded_back() {
        let mut store = HistoryStore::new(MemoryBlobStore::new(), "dht_hist");
        store.save(&sample_state()).unwrap();
        assert_eq!(store.store().commits(), 1);

        let mut reopened = HistoryStore::new(store.into_inner(), "dht_hist");
        assert_eq!(reopened.load(), sample_state());
    }

    #[test]
    fn test_corrupt_history_reads_as_cold_start() {
        let mut blobs = MemoryBlobStore::new();
        let mut handle = blobs.open("dht_hist").unwrap();
        blobs.set_blob(&mut handle, HISTORY_KEY, &[0xff, 0x01]).unwrap();
        blobs.commit(&mut handle).unwrap();

        let mut store = HistoryStore::new(blobs, "dht_hist");
        let state = store.load();
        assert!(state.history.iter().all(|entry| !entry.valid));
    }

    #[test]
    fn test_open_failure_degrades_to_memory_only() {
        let mut store = HistoryStore::new(MemoryBlobStore::unavailable(), "dht_hist");
        assert_eq!(store.load(), PersistedState::default());
        assert_eq!(store.mode(), PersistMode::MemoryOnly);
        assert_eq!(store.save(&sample_state()), Err(PersistError::MemoryOnly));
    }

    #[test]
    fn test_commit_failure_degrades_to_memory_only() {
        let mut store = HistoryStore::new(MemoryBlobStore::new(), "dht_hist");
        store.load();
        store.store_mut().faults.fail_commit = true;

        assert!(matches!(
            store.save(&sample_state()),
            Err(PersistError::Store(_))
        ));
        assert_eq!(store.mode(), PersistMode::MemoryOnly);
        assert_eq!(store.store().commits(), 0);
    }
}
