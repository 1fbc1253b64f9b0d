//! Namespaced key-value blob store contract.
//!
//! Mirrors the NVS-style API the history is persisted through: writes are
//! staged on an open handle and become visible atomically on `commit`.
//! Nothing here assumes a particular storage engine.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use thiserror_no_std::Error;

pub trait BlobStore {
    type Handle;
    type Error: core::fmt::Debug;

    fn open(&mut self, namespace: &str) -> Result<Self::Handle, Self::Error>;

    /// `Ok(None)` when the key was never committed
    fn get_blob(&mut self, handle: &mut Self::Handle, key: &str)
    -> Result<Option<Vec<u8>>, Self::Error>;

    fn set_blob(
        &mut self,
        handle: &mut Self::Handle,
        key: &str,
        bytes: &[u8],
    ) -> Result<(), Self::Error>;

    /// Make every blob staged on `handle` durable, all or nothing.
    fn commit(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error>;

    /// Release the handle, discarding uncommitted writes.
    fn close(&mut self, handle: Self::Handle);
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("store unavailable")]
    Unavailable,
    #[error("commit failed")]
    CommitFailed,
}

/// Failures a [`MemoryBlobStore`] can be told to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFaults {
    pub fail_open: bool,
    pub fail_commit: bool,
}

pub struct MemoryHandle {
    namespace: String,
    staged: Vec<(String, Vec<u8>)>,
}

/// RAM-backed [`BlobStore`], used on hosts and as the test double.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    namespaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    commits: u32,
    pub faults: StoreFaults,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `open` always fails
    pub fn unavailable() -> Self {
        Self {
            faults: StoreFaults {
                fail_open: true,
                fail_commit: false,
            },
            ..Self::default()
        }
    }

    /// Number of successful commits so far
    pub fn commits(&self) -> u32 {
        self.commits
    }

    /// Committed contents of `namespace/key`
    pub fn committed(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.namespaces
            .get(namespace)
            .and_then(|blobs| blobs.get(key))
            .map(Vec::as_slice)
    }
}

impl BlobStore for MemoryBlobStore {
    type Handle = MemoryHandle;
    type Error = MemoryStoreError;

    fn open(&mut self, namespace: &str) -> Result<MemoryHandle, MemoryStoreError> {
        if self.faults.fail_open {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(MemoryHandle {
            namespace: namespace.to_string(),
            staged: Vec::new(),
        })
    }

    fn get_blob(
        &mut self,
        handle: &mut MemoryHandle,
        key: &str,
    ) -> Result<Option<Vec<u8>>, MemoryStoreError> {
        if let Some((_, bytes)) = handle.staged.iter().rev().find(|(k, _)| k == key) {
            return Ok(Some(bytes.clone()));
        }
        Ok(self.committed(&handle.namespace, key).map(<[u8]>::to_vec))
    }

    fn set_blob(
        &mut self,
        handle: &mut MemoryHandle,
        key: &str,
        bytes: &[u8],
    ) -> Result<(), MemoryStoreError> {
        handle.staged.push((key.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn commit(&mut self, handle: &mut MemoryHandle) -> Result<(), MemoryStoreError> {
        if self.faults.fail_commit {
            handle.staged.clear();
            return Err(MemoryStoreError::CommitFailed);
        }

        let blobs = self.namespaces.entry(handle.namespace.clone()).or_default();
        for (key, bytes) in handle.staged.drain(..) {
            blobs.insert(key, bytes);
        }
        self.commits += 1;
        Ok(())
    }

    fn close(&mut self, _handle: MemoryHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_visible_to_others_only_after_commit() {
        let mut store = MemoryBlobStore::new();
        let mut handle = store.open("ns").unwrap();

        store.set_blob(&mut handle, "a", &[1, 2]).unwrap();
        store.set_blob(&mut handle, "b", &[3]).unwrap();
        assert_eq!(store.committed("ns", "a"), None);
        assert_eq!(store.get_blob(&mut handle, "a").unwrap(), Some(alloc::vec![1, 2]));

        store.commit(&mut handle).unwrap();
        store.close(handle);

        assert_eq!(store.committed("ns", "a"), Some(&[1u8, 2][..]));
        assert_eq!(store.committed("ns", "b"), Some(&[3u8][..]));
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let mut store = MemoryBlobStore::new();
        let mut first = store.open("one").unwrap();
        store.set_blob(&mut first, "key", &[9]).unwrap();
        store.commit(&mut first).unwrap();

        let mut second = store.open("two").unwrap();
        assert_eq!(store.get_blob(&mut second, "key").unwrap(), None);
    }

    #[test]
    fn test_failed_commit_keeps_previous_contents() {
        let mut store = MemoryBlobStore::new();
        let mut handle = store.open("ns").unwrap();
        store.set_blob(&mut handle, "a", &[1]).unwrap();
        store.commit(&mut handle).unwrap();

        store.faults.fail_commit = true;
        store.set_blob(&mut handle, "a", &[2]).unwrap();
        assert_eq!(store.commit(&mut handle), Err(MemoryStoreError::CommitFailed));
        assert_eq!(store.committed("ns", "a"), Some(&[1u8][..]));
    }

    #[test]
    fn test_unavailable_store() {
        let mut store = MemoryBlobStore::unavailable();
        assert!(matches!(store.open("ns"), Err(MemoryStoreError::Unavailable)));
    }
}
