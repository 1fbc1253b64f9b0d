//! Directory-backed [`BlobStore`] for the simulator.
//!
//! Each namespace is a directory and each key a file. A commit builds the
//! complete next version of the namespace in a `NAME.next` sibling, moves
//! the live directory aside to `NAME.old` and renames `NAME.next` into
//! place. Opening a namespace finishes or discards whatever an interrupted
//! commit left behind, so the blobs of one commit are seen all together or
//! not at all.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hygro_core::storage::BlobStore;
use log::{debug, warn};

pub struct DirHandle {
    dir: PathBuf,
    staged: Vec<(String, Vec<u8>)>,
}

pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for DirBlobStore {
    type Handle = DirHandle;
    type Error = io::Error;

    fn open(&mut self, namespace: &str) -> io::Result<DirHandle> {
        let dir = self.root.join(namespace);
        recover(&dir)?;
        fs::create_dir_all(&dir)?;
        Ok(DirHandle {
            dir,
            staged: Vec::new(),
        })
    }

    fn get_blob(&mut self, handle: &mut DirHandle, key: &str) -> io::Result<Option<Vec<u8>>> {
        if let Some((_, bytes)) = handle.staged.iter().rev().find(|(k, _)| k == key) {
            return Ok(Some(bytes.clone()));
        }

        match fs::read(handle.dir.join(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_blob(&mut self, handle: &mut DirHandle, key: &str, bytes: &[u8]) -> io::Result<()> {
        handle.staged.retain(|(k, _)| k != key);
        handle.staged.push((key.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn commit(&mut self, handle: &mut DirHandle) -> io::Result<()> {
        if handle.staged.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut handle.staged);
        let next = sibling(&handle.dir, "next");
        let old = sibling(&handle.dir, "old");

        remove_if_present(&next)?;
        fs::create_dir_all(&next)?;
        for entry in fs::read_dir(&handle.dir)? {
            let entry = entry?;
            fs::copy(entry.path(), next.join(entry.file_name()))?;
        }
        for (key, bytes) in &staged {
            fs::write(next.join(key), bytes)?;
        }

        remove_if_present(&old)?;
        fs::rename(&handle.dir, &old)?;
        // The commit point: from here on, opening sees the new blobs
        fs::rename(&next, &handle.dir)?;
        fs::remove_dir_all(&old)?;

        debug!("Committed {} blob(s) to {}", staged.len(), handle.dir.display());
        Ok(())
    }

    fn close(&mut self, _handle: DirHandle) {}
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

fn remove_if_present(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Settle a namespace after an interrupted commit.
fn recover(dir: &Path) -> io::Result<()> {
    let next = sibling(dir, "next");
    let old = sibling(dir, "old");

    if dir.exists() {
        // Interrupted before the live directory was moved aside
        remove_if_present(&next)?;
        return remove_if_present(&old);
    }

    if next.exists() {
        // `next` is only complete once the live directory has moved aside
        warn!("Finishing interrupted commit in {}", dir.display());
        fs::rename(&next, dir)?;
        remove_if_present(&old)
    } else if old.exists() {
        fs::rename(&old, dir)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hygro-sim-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_commit_survives_reopen() {
        let root = scratch_dir("reopen");
        let mut store = DirBlobStore::new(&root);
        let mut handle = store.open("dht_hist").unwrap();
        store.set_blob(&mut handle, "history", &[1, 2, 3]).unwrap();
        assert_eq!(store.get_blob(&mut handle, "history").unwrap(), Some(vec![1, 2, 3]));
        store.commit(&mut handle).unwrap();
        store.close(handle);

        let mut reopened = DirBlobStore::new(&root);
        let mut handle = reopened.open("dht_hist").unwrap();
        assert_eq!(reopened.get_blob(&mut handle, "history").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(reopened.get_blob(&mut handle, "cursor").unwrap(), None);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_uncommitted_blobs_are_dropped() {
        let root = scratch_dir("uncommitted");
        let mut store = DirBlobStore::new(&root);
        let mut handle = store.open("dht_hist").unwrap();
        store.set_blob(&mut handle, "cursor", &[7]).unwrap();
        store.close(handle);

        let mut handle = store.open("dht_hist").unwrap();
        assert_eq!(store.get_blob(&mut handle, "cursor").unwrap(), None);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_commit_interrupted_between_renames_is_finished() {
        let root = scratch_dir("between");
        let mut store = DirBlobStore::new(&root);
        let mut handle = store.open("dht_hist").unwrap();
        store.set_blob(&mut handle, "history", &[1]).unwrap();
        store.set_blob(&mut handle, "cursor", &[1]).unwrap();
        store.commit(&mut handle).unwrap();
        store.close(handle);

        // Next version fully built, live directory already moved aside
        let live = root.join("dht_hist");
        let next = root.join("dht_hist.next");
        fs::create_dir_all(&next).unwrap();
        fs::write(next.join("history"), [2]).unwrap();
        fs::write(next.join("cursor"), [2]).unwrap();
        fs::rename(&live, root.join("dht_hist.old")).unwrap();

        let mut handle = store.open("dht_hist").unwrap();
        assert_eq!(store.get_blob(&mut handle, "history").unwrap(), Some(vec![2]));
        assert_eq!(store.get_blob(&mut handle, "cursor").unwrap(), Some(vec![2]));
        assert!(!root.join("dht_hist.old").exists());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_partial_next_version_is_discarded() {
        let root = scratch_dir("partial");
        let mut store = DirBlobStore::new(&root);
        let mut handle = store.open("dht_hist").unwrap();
        store.set_blob(&mut handle, "history", &[1]).unwrap();
        store.set_blob(&mut handle, "cursor", &[1]).unwrap();
        store.commit(&mut handle).unwrap();
        store.close(handle);

        // Crash while writing the next version: only one new blob made it
        let next = root.join("dht_hist.next");
        fs::create_dir_all(&next).unwrap();
        fs::write(next.join("history"), [2]).unwrap();

        let mut handle = store.open("dht_hist").unwrap();
        assert_eq!(store.get_blob(&mut handle, "history").unwrap(), Some(vec![1]));
        assert_eq!(store.get_blob(&mut handle, "cursor").unwrap(), Some(vec![1]));
        assert!(!next.exists());

        fs::remove_dir_all(root).unwrap();
    }
}
